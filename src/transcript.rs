//! Parse Claude Code transcript files from ~/.claude/projects/
//!
//! Claude stores one JSONL file per session. Record types:
//! - "user" / "assistant": Chat turns (message.content is a string or an
//!   array of content blocks)
//! - "summary": Session-level title, not a chat turn
//! - Anything else: tool plumbing and progress markers (dropped from view)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded line from a transcript file.
///
/// Kept as raw JSON so every field survives serialization back to the
/// client unchanged; the typed accessors cover the handful of fields the
/// server itself reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Value);

impl RawRecord {
    pub fn session_id(&self) -> Option<&str> {
        self.0.get("sessionId").and_then(|v| v.as_str())
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.0.get("timestamp").and_then(|v| v.as_str())
    }

    pub fn cwd(&self) -> Option<&str> {
        self.0.get("cwd").and_then(|v| v.as_str())
    }

    pub fn record_type(&self) -> Option<&str> {
        self.0.get("type").and_then(|v| v.as_str())
    }

    /// The nested message object, present only on chat turns.
    pub fn message(&self) -> Option<&Value> {
        self.0.get("message")
    }

    pub fn role(&self) -> Option<&str> {
        self.message()?.get("role").and_then(|v| v.as_str())
    }

    pub fn content(&self) -> Option<&Value> {
        self.message()?.get("content")
    }

    fn summary_text(&self) -> Option<&str> {
        self.0.get("summary").and_then(|v| v.as_str())
    }
}

/// Parse one transcript file's text into records, in line order.
///
/// Each non-empty line decodes independently; lines that fail to decode are
/// skipped. Claude Code appends to these files while they are being read, so
/// a truncated tail line is expected and not an error.
pub fn parse_transcript(text: &str) -> impl Iterator<Item = RawRecord> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok().map(RawRecord))
}

/// Flatten a record's content field to a single string.
///
/// String content is returned unchanged. Block arrays concatenate each
/// block's `text` (missing text reads as empty) in order, with no separator.
/// Any other shape flattens to the empty string.
pub fn normalize_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect(),
        _ => String::new(),
    }
}

/// Whether a record is a renderable chat turn.
///
/// Records with no `message` payload (summary markers, internal events) or
/// whose content flattens to nothing (tool-only turns) are dropped from the
/// session's message list.
pub fn is_chat_turn(record: &RawRecord) -> bool {
    record.message().is_some() && !normalize_content(record.content()).is_empty()
}

/// Find the session-level summary, if any.
///
/// Must run over the unfiltered record sequence: the summary record carries
/// no `message` payload, so the chat-turn filter would remove it before it
/// could be seen.
pub fn extract_summary(records: &[RawRecord]) -> Option<String> {
    records.iter().find_map(|record| {
        if record.record_type() == Some("summary") {
            record.summary_text().map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        RawRecord(value)
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "{\"sessionId\": \"a\"}\nnot json at all\n\n{\"sessionId\": \"b\"}\n{\"truncat";
        let records: Vec<RawRecord> = parse_transcript(text).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_id(), Some("a"));
        assert_eq!(records[1].session_id(), Some("b"));
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(parse_transcript("").count(), 0);
        assert_eq!(parse_transcript("\n\n  \n").count(), 0);
    }

    #[test]
    fn test_normalize_string_content_unchanged() {
        let content = json!("hello there");
        assert_eq!(normalize_content(Some(&content)), "hello there");
        // Idempotent: flattening an already-flat string is a no-op
        let again = json!(normalize_content(Some(&content)));
        assert_eq!(normalize_content(Some(&again)), "hello there");
    }

    #[test]
    fn test_normalize_block_array() {
        let content = json!([
            {"type": "text", "text": "first"},
            {"type": "tool_use", "id": "t1", "name": "Bash"},
            {"type": "text", "text": " second"}
        ]);
        assert_eq!(normalize_content(Some(&content)), "first second");
    }

    #[test]
    fn test_normalize_unexpected_shapes() {
        assert_eq!(normalize_content(None), "");
        assert_eq!(normalize_content(Some(&Value::Null)), "");
        assert_eq!(normalize_content(Some(&json!(42))), "");
        assert_eq!(normalize_content(Some(&json!({"text": "x"}))), "");
    }

    #[test]
    fn test_chat_turn_filter() {
        // No message payload at all
        assert!(!is_chat_turn(&record(json!({"type": "summary", "summary": "t"}))));
        // Message with empty content
        assert!(!is_chat_turn(&record(
            json!({"message": {"role": "user", "content": ""}})
        )));
        // Tool-only content flattens to nothing
        assert!(!is_chat_turn(&record(json!({"message": {
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "t1", "name": "Read"}]
        }}))));
        // Ordinary turns are kept
        assert!(is_chat_turn(&record(
            json!({"message": {"role": "user", "content": "hi there"}})
        )));
        // Non-user/assistant roles with renderable text are kept too
        assert!(is_chat_turn(&record(
            json!({"message": {"role": "system", "content": "note"}})
        )));
    }

    #[test]
    fn test_extract_summary() {
        let records: Vec<RawRecord> = parse_transcript(concat!(
            "{\"type\": \"summary\", \"summary\": \"Fixing the build\"}\n",
            "{\"type\": \"user\", \"message\": {\"role\": \"user\", \"content\": \"hello\"}}\n",
        ))
        .collect();
        assert_eq!(extract_summary(&records), Some("Fixing the build".to_string()));
    }

    #[test]
    fn test_extract_summary_absent() {
        let records: Vec<RawRecord> = parse_transcript(
            "{\"type\": \"user\", \"message\": {\"role\": \"user\", \"content\": \"hello\"}}",
        )
        .collect();
        assert_eq!(extract_summary(&records), None);
    }

    #[test]
    fn test_summary_survives_position_the_filter_would_remove() {
        // The summary record itself is not a chat turn; extraction runs on
        // the unfiltered sequence so it is still found.
        let records: Vec<RawRecord> = parse_transcript(concat!(
            "{\"type\": \"user\", \"message\": {\"role\": \"user\", \"content\": \"hi\"}}\n",
            "{\"type\": \"summary\", \"summary\": \"Mid-file title\"}\n",
        ))
        .collect();
        let summary = extract_summary(&records);
        let filtered: Vec<&RawRecord> = records.iter().filter(|r| is_chat_turn(r)).collect();
        assert_eq!(summary, Some("Mid-file title".to_string()));
        assert_eq!(filtered.len(), 1);
    }
}
