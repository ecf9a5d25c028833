use crate::domain::{EntryKind, LogEntry, SessionFile};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses one JSONL line. Blank lines yield `Ok(None)`.
pub fn parse_log_line(line: &str) -> Result<Option<LogEntry>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Entries of a JSONL chunk in file order, plus the number of lines that were
/// dropped because they were not valid JSON records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedLines {
    pub entries: Vec<LogEntry>,
    pub malformed: usize,
}

pub fn parse_log_lines(text: &str) -> ParsedLines {
    let mut parsed = ParsedLines::default();
    for (idx, line) in text.lines().enumerate() {
        match parse_log_line(line) {
            Ok(Some(entry)) => parsed.entries.push(entry),
            Ok(None) => {}
            Err(error) => {
                parsed.malformed += 1;
                tracing::warn!(line_no = idx + 1, %error, "skipping malformed log line");
            }
        }
    }
    parsed
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedLog {
    pub messages: Vec<LogEntry>,
    pub summaries: Vec<LogEntry>,
    pub malformed: usize,
}

impl ParsedLog {
    pub fn entry_count(&self) -> usize {
        self.messages.len() + self.summaries.len()
    }
}

/// Conversation kinds go to `messages`, summaries to `summaries`. Other
/// record types (snapshots, queue operations) are dropped.
impl From<ParsedLines> for ParsedLog {
    fn from(lines: ParsedLines) -> Self {
        let mut parsed = Self {
            malformed: lines.malformed,
            ..Self::default()
        };
        for entry in lines.entries {
            if entry.kind == EntryKind::Summary {
                parsed.summaries.push(entry);
            } else if entry.kind.is_message() {
                parsed.messages.push(entry);
            }
        }
        parsed
    }
}

pub fn parse_log_text(text: &str) -> ParsedLog {
    ParsedLog::from(parse_log_lines(text))
}

pub fn parse_log_bytes(bytes: &[u8]) -> ParsedLog {
    parse_log_text(&String::from_utf8_lossy(bytes))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RootIdentity {
    pub root_session_id: String,
    pub is_root: bool,
    pub continuation_of: Option<String>,
}

/// A file whose entries carry a `sessionId` other than its own id continues
/// that earlier session. The first differing id is taken as the root.
pub fn detect_root_session(file_id: &str, messages: &[LogEntry]) -> RootIdentity {
    let foreign = messages
        .iter()
        .filter_map(|entry| entry.session_id.as_deref())
        .find(|session_id| !session_id.is_empty() && *session_id != file_id);

    match foreign {
        Some(root) => RootIdentity {
            root_session_id: root.to_string(),
            is_root: false,
            continuation_of: Some(root.to_string()),
        },
        None => RootIdentity {
            root_session_id: file_id.to_string(),
            is_root: true,
            continuation_of: None,
        },
    }
}

pub fn make_session_file(
    id: String,
    project: String,
    path: PathBuf,
    parsed: ParsedLog,
) -> SessionFile {
    let identity = detect_root_session(&id, &parsed.messages);
    SessionFile {
        id,
        project,
        path,
        messages: parsed.messages,
        summaries: parsed.summaries,
        root_session_id: identity.root_session_id,
        is_root: identity.is_root,
        continuation_of: identity.continuation_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentBlock, KnownBlock, MessageContent};

    #[test]
    fn drops_malformed_lines_and_keeps_the_rest() {
        let text = [
            r#"{"type":"user","uuid":"u1","sessionId":"s","timestamp":"2026-01-01T00:00:00Z","message":{"role":"user","content":"hi"}}"#,
            "{not json",
            "",
            r#"{"type":"assistant","uuid":"a1","parentUuid":"u1","sessionId":"s","timestamp":"2026-01-01T00:00:01Z"}"#,
            "   ",
            r#"{"type":"summary","summary":"Greeting","leafUuid":"a1"}"#,
            "[1,2",
        ]
        .join("\n");

        let parsed = parse_log_text(&text);
        assert_eq!(parsed.entry_count(), 3);
        assert_eq!(parsed.malformed, 2);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.summaries.len(), 1);
        assert_eq!(parsed.messages[1].parent_uuid.as_deref(), Some("u1"));
        assert_eq!(parsed.summaries[0].leaf_uuid.as_deref(), Some("a1"));
    }

    #[test]
    fn only_conversation_kinds_become_messages() {
        let text = [
            r#"{"type":"file-history-snapshot","messageId":"m1","snapshot":{}}"#,
            r#"{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z"}"#,
            r#"{"type":"queue-operation","operation":"enqueue"}"#,
            r#"{"type":"assistant","uuid":"a1","timestamp":"2026-01-01T00:00:01Z"}"#,
            r#"{"type":"system","uuid":"s1","timestamp":"2026-01-01T00:00:02Z"}"#,
            r#"{"type":"attachment","uuid":"t1","timestamp":"2026-01-01T00:00:03Z"}"#,
            r#"{"type":"summary","summary":"Done","leafUuid":"a1"}"#,
        ]
        .join("\n");

        let parsed = parse_log_text(&text);
        let kinds: Vec<&EntryKind> = parsed.messages.iter().map(|entry| &entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &EntryKind::User,
                &EntryKind::Assistant,
                &EntryKind::System,
                &EntryKind::Attachment
            ]
        );
        assert_eq!(parsed.summaries.len(), 1);
        assert_eq!(parsed.malformed, 0);
    }

    #[test]
    fn non_object_json_counts_as_malformed() {
        let parsed = parse_log_text("42\n\"text\"\n");
        assert_eq!(parsed.entry_count(), 0);
        assert_eq!(parsed.malformed, 2);
    }

    #[test]
    fn parses_structured_content_blocks() {
        let line = serde_json::json!({
            "type": "assistant",
            "uuid": "a1",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {
                "role": "assistant",
                "content": [
                    { "type": "thinking", "thinking": "hmm" },
                    { "type": "text", "text": "Running it" },
                    { "type": "tool_use", "id": "toolu_1", "name": "Bash", "input": { "cmd": "ls" } }
                ]
            }
        })
        .to_string();

        let entry = parse_log_line(&line).expect("parse").expect("entry");
        assert_eq!(entry.first_text(), Some("Running it"));
        let Some(MessageContent::Blocks(blocks)) =
            entry.message.as_ref().and_then(|m| m.content.as_ref())
        else {
            panic!("expected blocks");
        };
        assert!(matches!(blocks[0], ContentBlock::Other(_)));
        assert!(matches!(
            &blocks[2],
            ContentBlock::Known(KnownBlock::ToolUse { name, .. }) if name == "Bash"
        ));
    }

    #[test]
    fn unknown_record_types_keep_their_name_and_fields() {
        let line = r#"{"type":"file-history-snapshot","messageId":"m1","snapshot":{"a":1}}"#;
        let entry = parse_log_line(line).expect("parse").expect("entry");
        assert_eq!(entry.kind, EntryKind::Other("file-history-snapshot".to_string()));
        assert!(!entry.kind.is_message());

        let value = serde_json::to_value(&entry).expect("encode");
        assert_eq!(value["type"], "file-history-snapshot");
        assert_eq!(value["messageId"], "m1");
        assert_eq!(value["snapshot"]["a"], 1);
    }

    #[test]
    fn detects_continuation_from_foreign_session_id() {
        let parsed = parse_log_text(
            r#"{"type":"user","uuid":"u1","sessionId":"root-1","timestamp":"T1"}
{"type":"user","uuid":"u2","sessionId":"other","timestamp":"T2"}"#,
        );
        let file = make_session_file(
            "child-2".to_string(),
            "-tmp-p".to_string(),
            PathBuf::from("/x/-tmp-p/child-2.jsonl"),
            parsed,
        );
        assert!(!file.is_root);
        assert_eq!(file.root_session_id, "root-1");
        assert_eq!(file.continuation_of.as_deref(), Some("root-1"));
    }

    #[test]
    fn file_is_its_own_root_without_foreign_ids() {
        let identity = detect_root_session("s1", &[]);
        assert_eq!(
            identity,
            RootIdentity {
                root_session_id: "s1".to_string(),
                is_root: true,
                continuation_of: None,
            }
        );
    }
}
