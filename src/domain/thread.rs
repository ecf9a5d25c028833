use crate::domain::{EntryKind, LogEntry, ProjectListing, SessionFile, SessionThread};
use std::collections::BTreeMap;

pub const UNTITLED_SESSION: &str = "Untitled Session";

const TITLE_MAX_CHARS: usize = 100;

/// Groups files by root session and assembles one thread per group, most
/// recently active first.
pub fn assemble_threads(files: Vec<SessionFile>) -> Vec<SessionThread> {
    let mut groups: BTreeMap<String, Vec<SessionFile>> = BTreeMap::new();
    for file in files {
        groups
            .entry(file.root_session_id.clone())
            .or_default()
            .push(file);
    }

    let mut threads: Vec<SessionThread> = groups
        .into_iter()
        .map(|(root_session_id, files)| merge_thread(root_session_id, files))
        .collect();
    sort_threads_by_recency(&mut threads);
    threads
}

/// Assembles the thread rooted at `root_session_id` from a pre-scanned file
/// list. An id that matches nothing yields an empty thread.
pub fn build_thread(root_session_id: &str, all_files: &[SessionFile]) -> SessionThread {
    let files = all_files
        .iter()
        .filter(|file| file.root_session_id == root_session_id || file.id == root_session_id)
        .cloned()
        .collect();
    merge_thread(root_session_id.to_string(), files)
}

fn merge_thread(root_session_id: String, mut files: Vec<SessionFile>) -> SessionThread {
    files.sort_by(|a, b| {
        a.first_timestamp()
            .cmp(b.first_timestamp())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut messages: Vec<LogEntry> = Vec::new();
    let mut summaries: Vec<LogEntry> = Vec::new();
    for file in &files {
        messages.extend(file.messages.iter().cloned());
        summaries.extend(file.summaries.iter().cloned());
    }
    // Stable: equal timestamps keep file order.
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let title = derive_title(&summaries, &messages);
    SessionThread {
        root_session_id,
        files,
        messages,
        summaries,
        title,
    }
}

/// First summary text, else the opening of the first user message, else
/// [`UNTITLED_SESSION`].
pub fn derive_title(summaries: &[LogEntry], messages: &[LogEntry]) -> String {
    if let Some(summary) = summaries
        .first()
        .and_then(|entry| entry.summary.as_deref())
        .filter(|text| !text.is_empty())
    {
        return summary.to_string();
    }

    messages
        .iter()
        .find(|entry| entry.kind == EntryKind::User)
        .and_then(LogEntry::first_text)
        .filter(|text| !text.is_empty())
        .map(|text| truncate_title(text, TITLE_MAX_CHARS))
        .unwrap_or_else(|| UNTITLED_SESSION.to_string())
}

fn truncate_title(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn sort_threads_by_recency(threads: &mut [SessionThread]) {
    threads.sort_by(|a, b| {
        b.last_timestamp()
            .unwrap_or("")
            .cmp(a.last_timestamp().unwrap_or(""))
    });
}

/// Flat grouping of threads by the project directory of their first file.
pub fn index_projects(threads: &[SessionThread]) -> Vec<ProjectListing> {
    let mut grouped: BTreeMap<String, ProjectListing> = BTreeMap::new();
    for thread in threads {
        grouped
            .entry(thread.project().to_string())
            .or_insert_with(|| ProjectListing {
                name: thread.project().to_string(),
                sessions: Vec::new(),
            })
            .sessions
            .push(thread.digest());
    }

    grouped
        .into_values()
        .map(|mut project| {
            project
                .sessions
                .sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
            project
        })
        .collect()
}
