use crate::domain::{
    EntryKind, LogFileIdentity, MessageContent, ProjectListing, SessionFile, SessionThread,
    assemble_threads, build_thread, index_projects, is_log_file, make_session_file,
    parse_log_bytes,
};
use dirs::home_dir;
use serde::Serialize;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;

/// How the boundary should treat a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// No corpus at all; the user has to set something up.
    Setup,
    /// The corpus exists but the requested thread or session does not.
    MissingData,
    /// A read failed; retrying may help.
    Transient,
}

#[derive(Debug, Error)]
pub enum ResolveProjectsDirError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

impl ResolveProjectsDirError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Setup
    }
}

pub fn resolve_projects_dir() -> Result<PathBuf, ResolveProjectsDirError> {
    if let Some(override_dir) = std::env::var_os("CLAUDE_PROJECTS_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let Some(home) = home_dir() else {
        return Err(ResolveProjectsDirError::HomeDirNotFound);
    };

    Ok(home.join(".claude").join("projects"))
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("projects directory does not exist: {0}")]
    ProjectsDirMissing(String),

    #[error("failed to read projects directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ProjectsDirMissing(_) => FailureKind::Setup,
            Self::ReadDir { .. } => FailureKind::Transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadSessionError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("failed to read session file: {0}")]
    Read(#[from] io::Error),
}

impl LoadSessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Scan(error) => error.kind(),
            Self::NotFound(_) => FailureKind::MissingData,
            Self::Read(_) => FailureKind::Transient,
        }
    }
}

/// Project directories under `root`, skipping hidden entries and plain files.
pub fn list_project_dirs(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::ProjectsDirMissing(root.display().to_string()));
    }

    let entries = fs::read_dir(root).map_err(|source| ScanError::ReadDir {
        path: root.display().to_string(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub fn list_log_files(project_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(project_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_log_file(path) && path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

pub fn parse_session_file(path: &Path) -> io::Result<SessionFile> {
    let _span = tracing::debug_span!("parse_session_file", path = %path.display()).entered();
    let bytes = fs::read(path)?;
    let parsed = parse_log_bytes(&bytes);
    tracing::debug!(
        entries = parsed.entry_count(),
        malformed = parsed.malformed,
        "parsed session file"
    );

    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let project = path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(make_session_file(id, project, path.to_path_buf(), parsed))
}

struct ProjectScan {
    files: Vec<SessionFile>,
    warnings: usize,
}

fn scan_project_dir(project_dir: &Path) -> ProjectScan {
    let paths = match list_log_files(project_dir) {
        Ok(paths) => paths,
        Err(error) => {
            tracing::warn!(path = %project_dir.display(), %error, "failed to list project directory");
            return ProjectScan {
                files: Vec::new(),
                warnings: 1,
            };
        }
    };

    let mut scan = ProjectScan {
        files: Vec::with_capacity(paths.len()),
        warnings: 0,
    };
    for path in paths {
        match parse_session_file(&path) {
            Ok(file) => scan.files.push(file),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to read session file");
                scan.warnings += 1;
            }
        }
    }
    scan
}

/// Parses every session file under `root`. Project directories are spread
/// over worker threads; each parse only touches its own file. Files that
/// cannot be read are logged and left out.
pub fn scan_session_files(root: &Path) -> Result<Vec<SessionFile>, ScanError> {
    let project_dirs = list_project_dirs(root)?;
    if project_dirs.is_empty() {
        return Ok(Vec::new());
    }

    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(project_dirs.len());
    let chunk_size = project_dirs.len().div_ceil(workers);

    let scans: Vec<ProjectScan> = thread::scope(|scope| {
        let handles: Vec<_> = project_dirs
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || chunk.iter().map(|dir| scan_project_dir(dir)).collect::<Vec<_>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    vec![ProjectScan {
                        files: Vec::new(),
                        warnings: 1,
                    }]
                })
            })
            .collect()
    });

    let mut files: Vec<SessionFile> = Vec::new();
    let mut warnings = 0usize;
    for scan in scans {
        files.extend(scan.files);
        warnings += scan.warnings;
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    if warnings > 0 {
        tracing::warn!(warnings, "some session files could not be read");
    }

    Ok(files)
}

/// All threads under `root`, most recently active first.
pub fn list_threads(root: &Path) -> Result<Vec<SessionThread>, ScanError> {
    Ok(assemble_threads(scan_session_files(root)?))
}

/// One thread by root session id. An unknown id yields an empty thread.
pub fn get_thread(root: &Path, root_session_id: &str) -> Result<SessionThread, ScanError> {
    let files = scan_session_files(root)?;
    Ok(build_thread(root_session_id, &files))
}

pub fn list_projects(root: &Path) -> Result<Vec<ProjectListing>, ScanError> {
    Ok(index_projects(&list_threads(root)?))
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLocation {
    pub project_name: String,
    pub session_id: String,
    pub path: PathBuf,
}

/// Looks for `<session_id>.jsonl` in every project directory.
pub fn find_session(root: &Path, session_id: &str) -> Result<Option<SessionLocation>, ScanError> {
    if !is_plain_name(session_id) {
        return Ok(None);
    }

    for project_dir in list_project_dirs(root)? {
        let candidate = project_dir.join(format!("{session_id}.jsonl"));
        if !candidate.is_file() {
            continue;
        }
        if let Some(identity) = LogFileIdentity::from_path(&candidate) {
            return Ok(Some(SessionLocation {
                project_name: identity.project,
                session_id: identity.session_id,
                path: candidate,
            }));
        }
    }
    Ok(None)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionMessageView {
    pub role: String,
    pub content: Option<MessageContent>,
    pub timestamp: String,
}

/// User and assistant messages of a single session file, in file order.
pub fn load_session_messages(
    root: &Path,
    project: &str,
    session_id: &str,
) -> Result<Vec<SessionMessageView>, LoadSessionError> {
    if !root.is_dir() {
        return Err(ScanError::ProjectsDirMissing(root.display().to_string()).into());
    }
    let label = format!("{project}/{session_id}");
    if !is_plain_name(project) || !is_plain_name(session_id) {
        return Err(LoadSessionError::NotFound(label));
    }

    let path = root.join(project).join(format!("{session_id}.jsonl"));
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(LoadSessionError::NotFound(label));
        }
        Err(error) => return Err(error.into()),
    };

    let parsed = parse_log_bytes(&bytes);
    Ok(parsed
        .messages
        .into_iter()
        .filter(|entry| matches!(entry.kind, EntryKind::User | EntryKind::Assistant))
        .filter_map(|entry| {
            let message = entry.message?;
            Some(SessionMessageView {
                role: entry.kind.as_str().to_string(),
                content: message.content,
                timestamp: entry.timestamp,
            })
        })
        .collect())
}

fn is_plain_name(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains('/')
        && !value.contains('\\')
}
