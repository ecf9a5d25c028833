use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Value of the `type` field. Record types the viewer does not model keep
/// their original name so they serialize back unchanged.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryKind {
    User,
    Assistant,
    System,
    Attachment,
    Summary,
    Other(String),
}

impl Default for EntryKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for EntryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "attachment" => Self::Attachment,
            "summary" => Self::Summary,
            _ => Self::Other(value),
        }
    }
}

impl From<EntryKind> for String {
    fn from(value: EntryKind) -> Self {
        value.as_str().to_string()
    }
}

impl EntryKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Attachment => "attachment",
            Self::Summary => "summary",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Kinds that take part in a conversation and own a `uuid`.
    pub fn is_message(&self) -> bool {
        matches!(
            self,
            Self::User | Self::Assistant | Self::System | Self::Attachment
        )
    }
}

/// One parsed JSONL line. Fields the viewer does not interpret are kept in
/// `extra` so entries serialize back without loss.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type", default)]
    pub kind: EntryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default)]
    pub parent_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_uuid: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    /// Text of a message: the whole string, or the first text block when the
    /// content is structured.
    pub fn first_text(&self) -> Option<&str> {
        let content = self.message.as_ref()?.content.as_ref()?;
        match content {
            MessageContent::Text(text) => Some(text.as_str()),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(ContentBlock::text),
        }
    }

    pub fn non_empty_cwd(&self) -> Option<&str> {
        self.cwd.as_deref().filter(|cwd| !cwd.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Structured content block. Block types the viewer does not model are kept
/// verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Known(KnownBlock),
    Other(Value),
}

impl ContentBlock {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Known(KnownBlock::Text { text }) => Some(text.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// One physical session file, parsed once and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub id: String,
    pub project: String,
    #[serde(rename = "filepath")]
    pub path: PathBuf,
    pub messages: Vec<LogEntry>,
    pub summaries: Vec<LogEntry>,
    pub root_session_id: String,
    pub is_root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_of: Option<String>,
}

impl SessionFile {
    pub fn first_timestamp(&self) -> &str {
        self.messages
            .first()
            .map(|entry| entry.timestamp.as_str())
            .unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionThread {
    pub root_session_id: String,
    pub files: Vec<SessionFile>,
    pub messages: Vec<LogEntry>,
    pub summaries: Vec<LogEntry>,
    pub title: String,
}

impl SessionThread {
    pub fn first_timestamp(&self) -> Option<&str> {
        self.messages.first().map(|entry| entry.timestamp.as_str())
    }

    pub fn last_timestamp(&self) -> Option<&str> {
        self.messages.last().map(|entry| entry.timestamp.as_str())
    }

    /// Directory name of the project the thread was first recorded under.
    pub fn project(&self) -> &str {
        self.files
            .first()
            .map(|file| file.project.as_str())
            .unwrap_or("unknown")
    }

    pub fn digest(&self) -> ThreadDigest {
        ThreadDigest {
            id: self.root_session_id.clone(),
            title: self.title.clone(),
            message_count: self.messages.len(),
            file_count: self.files.len(),
            last_updated: self.last_timestamp().map(str::to_string),
            first_message: self.first_timestamp().map(str::to_string),
            summaries: self
                .summaries
                .iter()
                .filter_map(|entry| entry.summary.clone())
                .filter(|text| !text.is_empty())
                .collect(),
        }
    }
}

/// Row describing one thread inside a tree node or project listing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDigest {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub file_count: usize,
    pub last_updated: Option<String>,
    pub first_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Project,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub children: Vec<FileTreeNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<ThreadDigest>,
    pub session_count: usize,
}

/// Tree view of all threads, as handed to the boundary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTree {
    pub file_tree: Vec<FileTreeNode>,
    pub total_sessions: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    pub name: String,
    pub sessions: Vec<ThreadDigest>,
}
