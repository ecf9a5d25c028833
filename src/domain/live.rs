use crate::domain::LogEntry;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub const LOG_EXTENSION: &str = "jsonl";

/// Event published on the live feed, serialized as one JSON object with a
/// `type` discriminator.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LiveEvent {
    Heartbeat {
        timestamp: String,
    },
    NewMessages {
        session_id: String,
        full_session_id: String,
        project: String,
        messages: Vec<LogEntry>,
        message_count: usize,
        timestamp: String,
    },
    NewSession {
        session_id: String,
        project: String,
        timestamp: String,
    },
}

impl LiveEvent {
    pub fn new_messages(identity: &LogFileIdentity, messages: Vec<LogEntry>, timestamp: String) -> Self {
        Self::NewMessages {
            session_id: identity.session_id.clone(),
            full_session_id: format!("{}/{}", identity.project, identity.session_id),
            project: identity.project.clone(),
            message_count: messages.len(),
            messages,
            timestamp,
        }
    }

    pub fn new_session(identity: &LogFileIdentity, timestamp: String) -> Self {
        Self::NewSession {
            session_id: identity.session_id.clone(),
            project: identity.project.clone(),
            timestamp,
        }
    }
}

/// Project and session a log file belongs to, taken from its location:
/// `<root>/<project>/<session>.jsonl`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogFileIdentity {
    pub project: String,
    pub session_id: String,
}

impl LogFileIdentity {
    pub fn from_path(path: &Path) -> Option<Self> {
        if !is_log_file(path) {
            return None;
        }
        let session_id = path.file_stem()?.to_str()?.to_string();
        let project = path.parent()?.file_name()?.to_str()?.to_string();
        Some(Self {
            project,
            session_id,
        })
    }
}

pub fn is_log_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(LOG_EXTENSION)
}

/// Delay schedule for re-establishing a dropped feed: doubles per
/// consecutive failure up to `max`, and starts over after `reset`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempts.min(31);
        self.attempts = self.attempts.saturating_add(1);
        self.base
            .checked_mul(1u32 << exponent)
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);
        assert_eq!(backoff.attempts(), 5);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn backoff_survives_many_failures() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }

    #[test]
    fn identity_comes_from_directory_and_stem() {
        let identity =
            LogFileIdentity::from_path(&PathBuf::from("/root/-Users-alice-proj/sess-1.jsonl"))
                .expect("identity");
        assert_eq!(identity.project, "-Users-alice-proj");
        assert_eq!(identity.session_id, "sess-1");
        assert!(LogFileIdentity::from_path(&PathBuf::from("/root/p/notes.txt")).is_none());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let identity = LogFileIdentity {
            project: "p".to_string(),
            session_id: "s".to_string(),
        };
        let event = LiveEvent::new_messages(&identity, Vec::new(), "2026-01-01T00:00:00Z".to_string());
        let value = serde_json::to_value(&event).expect("encode");
        assert_eq!(value["type"], "new_messages");
        assert_eq!(value["fullSessionId"], "p/s");
        assert_eq!(value["messageCount"], 0);

        let heartbeat = LiveEvent::Heartbeat {
            timestamp: "t".to_string(),
        };
        let value = serde_json::to_value(&heartbeat).expect("encode");
        assert_eq!(value["type"], "heartbeat");
    }
}
