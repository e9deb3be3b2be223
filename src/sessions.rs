//! Chat session aggregation over the Claude projects directory.
//!
//! Turns one transcript file into one `ChatSession` summary and walks
//! ~/.claude/projects/ (one subdirectory per project, one JSONL file per
//! session) to build the `/api/chats` payload. Everything here recomputes
//! from disk on every call; there is no cache and no shared state.

use crate::transcript::{self, RawRecord};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// How many leading records to scan when picking the preview message.
pub const PREVIEW_SCAN_LIMIT: usize = 20;

/// Minimum flattened length for a preview message; anything at or below this
/// is treated as technical noise ("ok", "y", interrupted turns).
pub const PREVIEW_MIN_CHARS: usize = 5;

/// Sentinel for fields the transcript never recorded.
pub const UNKNOWN: &str = "Unknown";

/// Substring of the flattened directory name that precedes the project name.
const PROJECT_ROOT_MARKER: &str = "Projects-";

const NO_MESSAGE_FALLBACK: &str = "No message content";

/// One chat session, derived fresh from a transcript file.
///
/// `messages` holds the filtered raw records verbatim; the client renders
/// them with the same content-flattening rule the server uses for previews.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub file_name: String,
    pub project: String,
    pub start_time: String,
    pub end_time: String,
    pub message_count: usize,
    pub first_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub messages: Vec<RawRecord>,
    pub cwd: String,
}

/// Payload for `GET /api/chats`.
#[derive(Debug, Default, Serialize)]
pub struct ChatIndex {
    pub chats: Vec<ChatSession>,
    pub projects: Vec<String>,
}

/// Derive a project name from Claude's flattened directory naming,
/// e.g. "-Users-nik-Projects-claude-resume" -> "claude-resume".
///
/// The convention is ambiguous (the directory name is an absolute path with
/// `/` replaced by `-`), so the rules chain: prefer the substring after the
/// `Projects-` marker, then drop the `Users-<name>-` prefix, then give up
/// and use the directory name itself.
pub fn project_name_from_dir(dir_name: &str) -> String {
    let name = dir_name.strip_prefix('-').unwrap_or(dir_name);

    if let Some((_, project)) = name.split_once(PROJECT_ROOT_MARKER) {
        return project.to_string();
    }

    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() > 2 && parts[0] == "Users" {
        return parts[2..].join("-");
    }

    name.to_string()
}

/// Whether a session belongs to the caller's directory context.
///
/// A session matches when its recorded cwd equals the current directory or
/// is a path-component ancestor or descendant of it. Sessions whose cwd was
/// never recorded are always included. Note this is a silent scoping filter:
/// non-matching sessions are hidden, not reported.
pub fn matches_directory_context(session_cwd: &str, current_dir: &Path) -> bool {
    if session_cwd == UNKNOWN {
        return true;
    }
    let session_dir = Path::new(session_cwd);
    session_dir.starts_with(current_dir) || current_dir.starts_with(session_dir)
}

/// First user or assistant turn with enough flattened text to make a useful
/// preview. Scans only the leading records so a noisy session can't push the
/// search through thousands of lines.
fn first_meaningful_message(messages: &[RawRecord]) -> String {
    for record in messages.iter().take(PREVIEW_SCAN_LIMIT) {
        if matches!(record.role(), Some("user") | Some("assistant")) {
            let text = transcript::normalize_content(record.content());
            if text.chars().count() > PREVIEW_MIN_CHARS {
                return text;
            }
        }
    }
    NO_MESSAGE_FALLBACK.to_string()
}

/// Turn one transcript file's text into a chat session summary.
///
/// Returns `None` when nothing in the file survives the chat-turn filter.
/// Order matters: the summary is extracted from the unfiltered records, then
/// every derived field (id, timestamps, cwd, count, preview) comes from the
/// filtered sequence.
pub fn aggregate_session(text: &str, file_name: &str, project: &str) -> Option<ChatSession> {
    let records: Vec<RawRecord> = transcript::parse_transcript(text).collect();
    if records.is_empty() {
        return None;
    }

    let summary = transcript::extract_summary(&records);

    let messages: Vec<RawRecord> = records
        .into_iter()
        .filter(transcript::is_chat_turn)
        .collect();
    let (first, last) = match (messages.first(), messages.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return None,
    };

    let file_stem = file_name.strip_suffix(".jsonl").unwrap_or(file_name);
    let id = first.session_id().unwrap_or(file_stem).to_string();
    let start_time = first.timestamp().unwrap_or(UNKNOWN).to_string();
    let end_time = last.timestamp().unwrap_or(UNKNOWN).to_string();
    let cwd = first.cwd().unwrap_or(UNKNOWN).to_string();
    let first_message = first_meaningful_message(&messages);

    Some(ChatSession {
        id,
        file_name: file_name.to_string(),
        project: project.to_string(),
        start_time,
        end_time,
        message_count: messages.len(),
        first_message,
        summary,
        messages,
        cwd,
    })
}

/// Walk the projects directory and aggregate every transcript that matches
/// the caller's directory context.
///
/// Unreadable directories and files are skipped with a warning; a missing
/// projects directory yields an empty index rather than an error.
pub fn scan_chats(projects_dir: &Path, current_dir: &Path) -> ChatIndex {
    let mut chats = Vec::new();
    let mut projects: BTreeSet<String> = BTreeSet::new();

    let project_entries = match fs::read_dir(projects_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read projects directory {}: {}", projects_dir.display(), e);
            return ChatIndex::default();
        }
    };

    for project_entry in project_entries.flatten() {
        let project_path = project_entry.path();
        if !project_path.is_dir() {
            continue;
        }
        let dir_name = match project_path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let project_name = project_name_from_dir(&dir_name);

        let file_entries = match fs::read_dir(&project_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping project directory {}: {}", project_path.display(), e);
                continue;
            }
        };

        for file_entry in file_entries.flatten() {
            let path = file_entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping transcript {}: {}", path.display(), e);
                    continue;
                }
            };

            if let Some(session) = aggregate_session(&text, &file_name, &project_name) {
                if matches_directory_context(&session.cwd, current_dir) {
                    projects.insert(session.project.clone());
                    chats.push(session);
                } else {
                    debug!("Session {} outside directory context, hidden", session.id);
                }
            }
        }
    }

    // Newest first; ISO 8601 timestamps compare lexically
    chats.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    ChatIndex {
        chats,
        projects: projects.into_iter().collect(),
    }
}
