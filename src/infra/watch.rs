use crate::domain::{LiveEvent, LogFileIdentity, is_log_file};
use crate::infra::{FailureKind, Settings, TailRead, TailState};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{
    Receiver, RecvTimeoutError, Sender, SyncSender, channel, sync_channel,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchOptions {
    pub heartbeat: Duration,
    pub replay_existing: bool,
    pub channel_capacity: usize,
}

impl From<&Settings> for WatchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            heartbeat: settings.heartbeat(),
            replay_existing: settings.replay_existing,
            channel_capacity: settings.channel_capacity.max(1),
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("projects directory does not exist: {0}")]
    RootMissing(String),

    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to start watch worker: {0}")]
    Spawn(#[from] io::Error),
}

impl WatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RootMissing(_) => FailureKind::Setup,
            Self::Notify(_) | Self::Spawn(_) => FailureKind::Transient,
        }
    }
}

/// What a filesystem notification means for a session log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileChange {
    Created(PathBuf),
    Grown(PathBuf),
    Removed(PathBuf),
}

#[derive(Debug)]
enum RawSignal {
    Event(notify::Event),
    Error(String),
    Stop,
}

/// A running live feed. Events arrive in notification order; the worker
/// blocks once `channel_capacity` events are pending.
///
/// Dropping the feed stops the worker, releases the OS watch handle and
/// joins the worker thread.
#[derive(Debug)]
pub struct LiveFeed {
    watcher: Option<RecommendedWatcher>,
    control: Sender<RawSignal>,
    events: Option<Receiver<LiveEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Blocks for the next event. `None` once the feed has stopped.
    pub fn recv(&self) -> Option<LiveEvent> {
        self.events.as_ref()?.recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = LiveEvent> + '_ {
        std::iter::from_fn(|| self.recv())
    }

    fn shutdown(&mut self) {
        let _ = self.control.send(RawSignal::Stop);
        self.events.take();
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("live feed worker panicked");
            }
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts watching `root` (`<root>/<project>/<session>.jsonl`) and returns
/// the feed of live events.
pub fn watch_live_feed(root: &Path, options: WatchOptions) -> Result<LiveFeed, WatchError> {
    if !root.is_dir() {
        return Err(WatchError::RootMissing(root.display().to_string()));
    }
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let mut tail = TailState::default();
    if !options.replay_existing {
        tail.seed_existing(&root);
    }

    let (raw_tx, raw_rx) = channel::<RawSignal>();
    let control = raw_tx.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let signal = match res {
                Ok(event) => RawSignal::Event(event),
                Err(error) => RawSignal::Error(error.to_string()),
            };
            let _ = raw_tx.send(signal);
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    let (events_tx, events_rx) = sync_channel::<LiveEvent>(options.channel_capacity.max(1));
    let worker = thread::Builder::new()
        .name("ccthreads-live-feed".to_string())
        .spawn(move || run_feed(root, tail, raw_rx, events_tx, options.heartbeat))?;

    Ok(LiveFeed {
        watcher: Some(watcher),
        control,
        events: Some(events_rx),
        worker: Some(worker),
    })
}

fn run_feed(
    root: PathBuf,
    mut tail: TailState,
    raw_rx: Receiver<RawSignal>,
    events_tx: SyncSender<LiveEvent>,
    heartbeat: Duration,
) {
    let _span = tracing::debug_span!("live_feed", root = %root.display()).entered();
    let mut next_heartbeat = Instant::now() + heartbeat;

    loop {
        let wait = next_heartbeat.saturating_duration_since(Instant::now());
        let signal = match raw_rx.recv_timeout(wait) {
            Ok(signal) => Some(signal),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut outgoing = Vec::new();
        match signal {
            Some(RawSignal::Stop) => break,
            Some(RawSignal::Error(error)) => {
                tracing::warn!(%error, "filesystem watch error");
            }
            Some(RawSignal::Event(event)) => {
                for change in classify_event(&event) {
                    outgoing.extend(apply_change(&root, &mut tail, change));
                }
            }
            None => {}
        }

        if Instant::now() >= next_heartbeat {
            outgoing.push(LiveEvent::Heartbeat {
                timestamp: now_rfc3339(),
            });
            next_heartbeat = Instant::now() + heartbeat;
        }

        for event in outgoing {
            if events_tx.send(event).is_err() {
                tracing::debug!("live feed consumer went away");
                return;
            }
        }
    }
}

fn apply_change(root: &Path, tail: &mut TailState, change: FileChange) -> Option<LiveEvent> {
    match change {
        FileChange::Created(path) => {
            let identity = session_identity(root, &path)?;
            Some(LiveEvent::new_session(&identity, now_rfc3339()))
        }
        FileChange::Grown(path) => {
            let identity = session_identity(root, &path)?;
            match tail.read_new(&path) {
                Ok(TailRead::Appended { lines, .. }) if !lines.entries.is_empty() => Some(
                    LiveEvent::new_messages(&identity, lines.entries, now_rfc3339()),
                ),
                Ok(_) => None,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to read appended log data");
                    None
                }
            }
        }
        FileChange::Removed(path) => {
            tail.forget(&path);
            None
        }
    }
}

/// Identity of a session log directly inside a project directory of `root`.
fn session_identity(root: &Path, path: &Path) -> Option<LogFileIdentity> {
    if let Ok(relative) = path.strip_prefix(root) {
        if relative.components().count() != 2 {
            return None;
        }
    }
    LogFileIdentity::from_path(path)
}

pub fn classify_event(event: &notify::Event) -> Vec<FileChange> {
    let log_paths = event.paths.iter().filter(|path| is_log_file(path));
    match event.kind {
        EventKind::Create(_) => log_paths.cloned().map(FileChange::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            log_paths.cloned().map(FileChange::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            log_paths.cloned().map(FileChange::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let [from, to] = event.paths.as_slice() {
                if is_log_file(from) {
                    changes.push(FileChange::Removed(from.clone()));
                }
                if is_log_file(to) {
                    changes.push(FileChange::Created(to.clone()));
                }
            }
            changes
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => log_paths.cloned().map(FileChange::Grown).collect(),
        EventKind::Remove(_) => log_paths.cloned().map(FileChange::Removed).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "".to_string())
}
