use std::collections::BTreeSet;

use fin_core::id::TaskId;
use fin_core::timestamp::{parse_date, parse_minute};
use fin_core::{DISMISSED_LABEL, RESERVED_LABEL_PREFIX, TaskStatus, normalize_content, normalize_labels};
use time::{Date, OffsetDateTime};
use tracing::debug;

use super::{DUE_PREFIX, ParsedLine, REF_PREFIX, TaskLine};

/// Length of `YYYY-MM-DD HH:MM`.
const TIMESTAMP_LEN: usize = 16;

/// A last token starting with this must be a well-formed reference.
const REF_MARKER: &str = "#ref:";

/// Field separator inside a task line.
const FIELD_SEPARATOR: &str = "  ";

/// Parse a whole document, skipping blank lines and `#` comment lines.
#[must_use]
pub fn parse_document(text: &str) -> Vec<ParsedLine> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(parse_line)
        .collect()
}

/// Classify a single line.
///
/// Parsing never fails: lines that do not follow the grammar come back as
/// [`ParsedLine::Unparseable`].
#[must_use]
pub fn parse_line(raw: &str) -> ParsedLine {
    parse_task_line(raw).unwrap_or_else(|| ParsedLine::Unparseable {
        raw_text: raw.to_owned(),
    })
}

fn parse_task_line(raw: &str) -> Option<ParsedLine> {
    let (status, rest) = split_status(raw.trim())?;
    let (timestamp, body) = split_timestamp(rest)?;
    let (body, ref_id) = split_reference(body)?;
    let line = split_fields(body, status, timestamp);

    match ref_id {
        Some(_) if line.content.is_empty() => None,
        Some(ref_id) => Some(ParsedLine::ExistingTask { ref_id, line }),
        None => Some(ParsedLine::NewTask(line)),
    }
}

fn split_status(line: &str) -> Option<(TaskStatus, &str)> {
    if !line.starts_with('[') {
        return None;
    }
    let (checkbox, rest) = line.split_at(line.find(']')? + 1);
    let status = TaskStatus::from_checkbox(checkbox)?;
    if rest.is_empty() {
        return Some((status, rest));
    }
    rest.starts_with(char::is_whitespace)
        .then(|| (status, rest.trim_start()))
}

/// Split an optional leading timestamp. A well-shaped but invalid timestamp
/// makes the whole line unparseable.
fn split_timestamp(rest: &str) -> Option<(Option<OffsetDateTime>, &str)> {
    let Some(candidate) = rest.get(..TIMESTAMP_LEN) else {
        return Some((None, rest));
    };
    if !looks_like_timestamp(candidate) {
        return Some((None, rest));
    }
    let (_, after) = rest.split_at(TIMESTAMP_LEN);
    if !after.is_empty() && !after.starts_with(FIELD_SEPARATOR) {
        return Some((None, rest));
    }
    let timestamp = parse_minute(candidate).ok()?;
    Some((Some(timestamp), after.trim_start()))
}

fn looks_like_timestamp(candidate: &str) -> bool {
    candidate.bytes().enumerate().all(|(idx, byte)| match idx {
        4 | 7 => byte == b'-',
        10 => byte == b' ',
        13 => byte == b':',
        _ => byte.is_ascii_digit(),
    })
}

/// Split the trailing reference token. A reference must be the last token on
/// the line and may appear only once.
fn split_reference(body: &str) -> Option<(&str, Option<TaskId>)> {
    let body = body.trim_end();
    let (before, last) = body.rsplit_once(char::is_whitespace).unwrap_or(("", body));
    let has_stray_reference = |text: &str| text.split_whitespace().any(|token| token.starts_with(REF_PREFIX));

    if last.starts_with(REF_MARKER) {
        let ref_id = parse_reference(last)?;
        if has_stray_reference(before) {
            return None;
        }
        Some((before.trim_end(), Some(ref_id)))
    } else if has_stray_reference(body) {
        None
    } else {
        Some((body, None))
    }
}

fn parse_reference(token: &str) -> Option<TaskId> {
    let digits = token.strip_prefix(REF_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok().map(TaskId)
}

enum MetaToken<'a> {
    Label(&'a str),
    Due(Date),
}

/// Peel metadata segments off the end of the body. The first segment is
/// always content.
fn split_fields(body: &str, status: TaskStatus, timestamp: Option<OffsetDateTime>) -> TaskLine {
    let mut head = body.trim_end();
    let mut labels: Vec<&str> = Vec::new();
    let mut due_date = None;

    while let Some((before, segment)) = head.rsplit_once(FIELD_SEPARATOR) {
        let Some(tokens) = metadata_tokens(segment.trim()) else {
            break;
        };
        // Walking backwards: the first due date seen is the last one written.
        for token in tokens.into_iter().rev() {
            match token {
                MetaToken::Label(label) => labels.push(label),
                MetaToken::Due(date) => {
                    due_date.get_or_insert(date);
                }
            }
        }
        head = before.trim_end();
    }

    let mut labels: BTreeSet<String> = normalize_labels(labels);
    labels.remove(DISMISSED_LABEL);

    TaskLine {
        status,
        timestamp,
        content: normalize_content(head),
        labels,
        due_date,
    }
}

/// Returns `None` when the segment contains anything besides `#tag` and
/// `due:YYYY-MM-DD` tokens.
fn metadata_tokens(segment: &str) -> Option<Vec<MetaToken<'_>>> {
    segment
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(metadata_token)
        .collect()
}

fn metadata_token(token: &str) -> Option<MetaToken<'_>> {
    if let Some(date) = token.strip_prefix(DUE_PREFIX) {
        return parse_date(date).ok().map(MetaToken::Due);
    }
    let label = token.strip_prefix('#')?;
    if label.to_lowercase().starts_with(RESERVED_LABEL_PREFIX) {
        debug!(token, "reserved tag kept as content");
        return None;
    }
    (!label.is_empty() && !label.contains('#')).then_some(MetaToken::Label(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn existing(raw: &str) -> (TaskId, TaskLine) {
        match parse_line(raw) {
            ParsedLine::ExistingTask { ref_id, line } => (ref_id, line),
            other => panic!("expected existing task line, got {other:?}"),
        }
    }

    fn new_task(raw: &str) -> TaskLine {
        match parse_line(raw) {
            ParsedLine::NewTask(line) => line,
            other => panic!("expected new task line, got {other:?}"),
        }
    }

    fn labels(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| (*item).to_owned()).collect()
    }

    #[test]
    fn parses_full_existing_line() {
        let (id, line) = existing("[ ] 2025-06-17 09:30  Buy milk  #home  due:2025-06-20  #ref:task_12");
        assert_eq!(id, TaskId(12));
        assert_eq!(line.status, TaskStatus::Open);
        assert_eq!(line.timestamp, Some(datetime!(2025-06-17 09:30 UTC)));
        assert_eq!(line.content, "Buy milk");
        assert_eq!(line.labels, labels(&["home"]));
        assert_eq!(line.due_date, Some(date!(2025-06-20)));
    }

    #[test]
    fn accepts_every_checkbox_spelling() {
        for (checkbox, status) in [
            ("[ ]", TaskStatus::Open),
            ("[]", TaskStatus::Open),
            ("[x]", TaskStatus::Completed),
            ("[X]", TaskStatus::Completed),
            ("[d]", TaskStatus::Dismissed),
            ("[D]", TaskStatus::Dismissed),
        ] {
            let line = new_task(&format!("{checkbox} Something"));
            assert_eq!(line.status, status, "{checkbox}");
        }
    }

    #[test]
    fn new_line_without_timestamp_keeps_inline_hashes() {
        let line = new_task("[ ] Call #5 back");
        assert_eq!(line.content, "Call #5 back");
        assert!(line.labels.is_empty());
        assert_eq!(line.timestamp, None);
    }

    #[test]
    fn tag_lists_accept_commas_and_spaces() {
        let line = new_task("[ ] New task  #Home,#work #errand");
        assert_eq!(line.content, "New task");
        assert_eq!(line.labels, labels(&["errand", "home", "work"]));
    }

    #[test]
    fn first_segment_is_always_content() {
        let line = new_task("[ ]  #42  #home");
        assert_eq!(line.content, "#42");
        assert_eq!(line.labels, labels(&["home"]));
    }

    #[test]
    fn mixed_segment_stays_in_content() {
        let line = new_task("[ ] Plan  trip to #paris soon  #travel");
        assert_eq!(line.content, "Plan trip to #paris soon");
        assert_eq!(line.labels, labels(&["travel"]));
    }

    #[test]
    fn invalid_due_date_stays_in_content() {
        let line = new_task("[ ] Pay rent  due:2025-13-40");
        assert_eq!(line.content, "Pay rent due:2025-13-40");
        assert_eq!(line.due_date, None);
    }

    #[test]
    fn last_due_token_wins() {
        let line = new_task("[ ] Pay rent  due:2025-01-01  #home  due:2025-02-01");
        assert_eq!(line.due_date, Some(date!(2025-02-01)));
    }

    #[test]
    fn dismissed_tag_is_ignored() {
        let (_, line) = existing("[x] 2025-06-17 09:30  Old  #dismissed #work  #ref:task_4");
        assert_eq!(line.status, TaskStatus::Completed);
        assert_eq!(line.labels, labels(&["work"]));
    }

    #[test]
    fn reference_must_be_well_formed_and_last() {
        for raw in [
            "[ ] 2025-06-17 09:30  Buy milk  #ref:task_abc",
            "[ ] 2025-06-17 09:30  Buy milk  #ref:task_",
            "[ ] 2025-06-17 09:30  Buy milk  #ref:task_1  #home",
            "[ ] 2025-06-17 09:30  Buy milk  #ref:task_1  #ref:task_2",
            "[ ] 2025-06-17 09:30  Buy milk  #ref:note_1",
            "[ ] Buy milk  #ref:task_4 again",
        ] {
            assert!(matches!(parse_line(raw), ParsedLine::Unparseable { .. }), "{raw}");
        }
    }

    #[test]
    fn existing_line_without_content_is_unparseable() {
        assert!(matches!(
            parse_line("[ ] 2025-06-17 09:30  #ref:task_3"),
            ParsedLine::Unparseable { .. }
        ));
        // A lone tag is still the content segment.
        let (_, line) = existing("[x]  #home  #ref:task_3");
        assert_eq!(line.content, "#home");
    }

    #[test]
    fn other_ref_like_words_are_content() {
        let (id, line) = existing("[ ] 2025-06-17 09:30  see #ref:docs  #ref:task_2");
        assert_eq!(id, TaskId(2));
        assert_eq!(line.content, "see #ref:docs");
    }

    #[test]
    fn reserved_tag_segment_stays_in_content() {
        let (_, line) = existing("[ ] 2025-06-17 09:30  Read guide  #ref:docs  #home  #ref:task_2");
        assert_eq!(line.content, "Read guide #ref:docs");
        assert_eq!(line.labels, labels(&["home"]));
    }

    #[test]
    fn reference_may_follow_content_directly() {
        let (id, line) = existing("[x] Buy milk #ref:task_7");
        assert_eq!(id, TaskId(7));
        assert_eq!(line.content, "Buy milk");
    }

    #[test]
    fn garbage_lines_are_unparseable() {
        for raw in [
            "Buy milk",
            "[?] Buy milk",
            "[x]Buy milk",
            "- [ ] Buy milk",
            "[ ] 2025-99-99 99:99  Broken",
        ] {
            assert_eq!(
                parse_line(raw),
                ParsedLine::Unparseable { raw_text: raw.to_owned() },
                "{raw}"
            );
        }
    }

    #[test]
    fn timestamp_needs_field_separator() {
        let line = new_task("[ ] 2025-06-17 09:30 meeting notes");
        assert_eq!(line.timestamp, None);
        assert_eq!(line.content, "2025-06-17 09:30 meeting notes");
    }

    #[test]
    fn document_skips_comments_and_blank_lines() {
        let doc = "# header\n#   more\n\n[ ] One  #ref:task_1\r\n   \n[ ] Two\nnot a task\n";
        let lines = parse_document(doc);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].ref_id(), Some(TaskId(1)));
        assert!(matches!(lines[1], ParsedLine::NewTask(_)));
        assert!(matches!(lines[2], ParsedLine::Unparseable { .. }));
    }
}
