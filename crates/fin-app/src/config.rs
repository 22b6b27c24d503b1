use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

const CONFIG_DIR: &str = "fin";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "tasks.db";
const CONFIG_DIR_ENV: &str = "FIN_CONFIG_DIR";
const DATABASE_ENV: &str = "FIN_DB_PATH";

/// Top-level configuration loaded from `~/fin/config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FinConfig {
    #[serde(default)]
    database: Option<PathBuf>,
    /// Editor settings.
    #[serde(default)]
    pub editor: EditorConfig,
    /// Backup retention.
    #[serde(default)]
    pub backup: BackupConfig,
    /// Editing session defaults.
    #[serde(default)]
    pub session: SessionConfig,
}

impl FinConfig {
    /// Load configuration from `$FIN_CONFIG_DIR` or the home directory.
    pub fn load() -> Result<Self> {
        Self::from_dir(config_dir()?)
    }

    /// Load configuration from a known directory. A missing file yields defaults.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_path = dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        Ok(config)
    }

    /// Resolve the database location: `$FIN_DB_PATH`, then the `database` key,
    /// then `~/fin/tasks.db`.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = env::var_os(DATABASE_ENV).filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = &self.database {
            return Ok(expand_home(path));
        }
        Ok(config_dir()?.join(DATABASE_FILE))
    }

    fn validate(&self) -> Result<()> {
        self.backup.ensure_valid()?;
        self.editor.ensure_valid()
    }
}

fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .ok_or_else(|| anyhow!("failed to resolve home directory; set {CONFIG_DIR_ENV}"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// `[editor]` block.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EditorConfig {
    /// Editor command used when no environment variable selects one.
    #[serde(default)]
    pub command: Option<String>,
}

impl EditorConfig {
    fn ensure_valid(&self) -> Result<()> {
        if self.command.as_deref().is_some_and(|command| command.trim().is_empty()) {
            bail!("editor.command must not be empty");
        }
        Ok(())
    }
}

/// `[backup]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Number of snapshots to keep.
    #[serde(default = "BackupConfig::default_max_backups")]
    pub max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backups: Self::default_max_backups(),
        }
    }
}

impl BackupConfig {
    const fn default_max_backups() -> usize {
        10
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.max_backups == 0 {
            bail!("backup.max_backups must be at least 1");
        }
        Ok(())
    }
}

/// `[session]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How many days of closed tasks an unfiltered session shows.
    #[serde(default = "SessionConfig::default_days")]
    pub default_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_days: Self::default_days(),
        }
    }
}

impl SessionConfig {
    const fn default_days() -> u32 {
        1
    }
}
