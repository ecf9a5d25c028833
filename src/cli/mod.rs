use crate::domain::{ReconnectBackoff, SessionThread, ThreadDigest, project_tree};
use crate::infra::{
    FailureKind, LoadSessionError, ReconcileError, ScanError, Settings, WatchError, WatchOptions,
    find_session, get_thread, list_projects, list_threads, load_session_messages,
    reconcile_summaries, watch_live_feed,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Command(CliRequest),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CliRequest {
    pub root: Option<PathBuf>,
    pub command: CliCommand,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Threads,
    Thread { root_session_id: String },
    Tree,
    Projects,
    Find { session_id: String },
    Session { project: String, session_id: String },
    Watch { replay: bool },
    Reconcile { apply: bool },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("missing subcommand")]
    MissingSubcommand,

    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1).peekable();
    let mut root: Option<PathBuf> = None;
    while let Some(arg) = iter.peek() {
        match arg.as_str() {
            "--root" | "-r" => {
                let _ = iter.next();
                let value = iter
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--root".to_string()))?;
                root = Some(PathBuf::from(value));
            }
            "--" => {
                let _ = iter.next();
                break;
            }
            _ => break,
        }
    }

    let Some(subcommand) = iter.next() else {
        return Err(CliParseError::MissingSubcommand);
    };

    let mut flags: Vec<&str> = Vec::new();
    let mut positionals: Vec<&str> = Vec::new();
    for arg in iter {
        if arg.starts_with('-') && arg.len() > 1 {
            flags.push(arg.as_str());
        } else {
            positionals.push(arg.as_str());
        }
    }

    let command = match subcommand.as_str() {
        "threads" => {
            expect_no_flags(&flags, &[])?;
            expect_positionals(&positionals, 0)?;
            CliCommand::Threads
        }
        "thread" => {
            expect_no_flags(&flags, &[])?;
            let [root_session_id] = take_positionals(&positionals, ["root-session-id"])?;
            CliCommand::Thread { root_session_id }
        }
        "tree" => {
            expect_no_flags(&flags, &[])?;
            expect_positionals(&positionals, 0)?;
            CliCommand::Tree
        }
        "projects" => {
            expect_no_flags(&flags, &[])?;
            expect_positionals(&positionals, 0)?;
            CliCommand::Projects
        }
        "find" => {
            expect_no_flags(&flags, &[])?;
            let [session_id] = take_positionals(&positionals, ["session-id"])?;
            CliCommand::Find { session_id }
        }
        "session" => {
            expect_no_flags(&flags, &[])?;
            let [project, session_id] = take_positionals(&positionals, ["project", "session-id"])?;
            CliCommand::Session {
                project,
                session_id,
            }
        }
        "watch" => {
            expect_no_flags(&flags, &["--replay"])?;
            expect_positionals(&positionals, 0)?;
            CliCommand::Watch {
                replay: flags.contains(&"--replay"),
            }
        }
        "reconcile" => {
            expect_no_flags(&flags, &["--apply"])?;
            expect_positionals(&positionals, 0)?;
            CliCommand::Reconcile {
                apply: flags.contains(&"--apply"),
            }
        }
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    Ok(CliInvocation::Command(CliRequest { root, command }))
}

fn expect_no_flags(flags: &[&str], allowed: &[&str]) -> Result<(), CliParseError> {
    match flags.iter().find(|flag| !allowed.contains(flag)) {
        Some(flag) => Err(CliParseError::UnknownFlag((*flag).to_string())),
        None => Ok(()),
    }
}

fn expect_positionals(positionals: &[&str], count: usize) -> Result<(), CliParseError> {
    match positionals.get(count) {
        Some(extra) => Err(CliParseError::UnexpectedArgument((*extra).to_string())),
        None => Ok(()),
    }
}

fn take_positionals<const N: usize>(
    positionals: &[&str],
    names: [&'static str; N],
) -> Result<[String; N], CliParseError> {
    expect_positionals(positionals, N)?;
    let mut values: [String; N] = std::array::from_fn(|_| String::new());
    for (idx, name) in names.into_iter().enumerate() {
        let value = positionals
            .get(idx)
            .ok_or(CliParseError::MissingArgument(name))?;
        values[idx] = (*value).to_string();
    }
    Ok(values)
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    LoadSession(#[from] LoadSessionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(
        "session not found: {0}\nHint: run `ccthreads projects` and copy a session id from the output."
    )]
    SessionNotFound(String),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    WriteOutput(#[from] io::Error),
}

impl CliRunError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Scan(error) => error.kind(),
            Self::LoadSession(error) => error.kind(),
            Self::Reconcile(error) => error.kind(),
            Self::Watch(error) => error.kind(),
            Self::SessionNotFound(_) => FailureKind::MissingData,
            Self::Encode(_) | Self::WriteOutput(_) => FailureKind::Transient,
        }
    }
}

pub fn run(command: CliCommand, projects_dir: &Path, settings: &Settings) -> Result<(), CliRunError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    match command {
        CliCommand::Threads => {
            let threads = list_threads(projects_dir)?;
            let digests: Vec<ThreadDigest> = threads.iter().map(SessionThread::digest).collect();
            write_json(&mut out, &digests)?;
        }
        CliCommand::Thread { root_session_id } => {
            let thread = get_thread(projects_dir, &root_session_id)?;
            write_json(&mut out, &thread)?;
        }
        CliCommand::Tree => {
            let threads = list_threads(projects_dir)?;
            let tree = project_tree(&threads, &settings.path_rules());
            write_json(&mut out, &tree)?;
        }
        CliCommand::Projects => {
            write_json(&mut out, &list_projects(projects_dir)?)?;
        }
        CliCommand::Find { session_id } => {
            let Some(location) = find_session(projects_dir, &session_id)? else {
                return Err(CliRunError::SessionNotFound(session_id));
            };
            write_json(&mut out, &location)?;
        }
        CliCommand::Session {
            project,
            session_id,
        } => {
            let messages = load_session_messages(projects_dir, &project, &session_id)?;
            write_json(&mut out, &messages)?;
        }
        CliCommand::Watch { replay } => {
            let mut options = WatchOptions::from(settings);
            options.replay_existing |= replay;
            run_watch(&mut out, projects_dir, options)?;
        }
        CliCommand::Reconcile { apply } => {
            let report = reconcile_summaries(projects_dir, apply)?;
            write_json(&mut out, &report)?;
        }
    }
    Ok(())
}

/// Streams live events as JSON lines until stdout goes away. A feed that
/// fails to start or stops is re-established with backoff.
fn run_watch(
    out: &mut impl Write,
    projects_dir: &Path,
    mut options: WatchOptions,
) -> Result<(), CliRunError> {
    let mut backoff = ReconnectBackoff::default();
    loop {
        match watch_live_feed(projects_dir, options.clone()) {
            Ok(feed) => {
                backoff.reset();
                for event in feed.iter() {
                    let line = serde_json::to_string(&event)?;
                    if !write_line(out, &line)? || !flush_output(out)? {
                        return Ok(());
                    }
                }
                tracing::warn!("live feed stopped");
            }
            Err(error) => {
                tracing::warn!(%error, "failed to start live feed");
            }
        }

        options.replay_existing = false;
        let delay = backoff.next_delay();
        tracing::info!(
            attempt = backoff.attempts(),
            delay_secs = delay.as_secs(),
            "reconnecting live feed"
        );
        thread::sleep(delay);
    }
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<bool, CliRunError> {
    let text = serde_json::to_string_pretty(value)?;
    if !write_line(out, &text)? {
        return Ok(false);
    }
    Ok(flush_output(out)?)
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

fn flush_output(out: &mut impl Write) -> io::Result<bool> {
    match out.flush() {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn command(values: &[&str]) -> CliRequest {
        match parse_invocation(&args(values)).expect("parse") {
            CliInvocation::Command(request) => request,
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn parse_requires_a_subcommand() {
        let error = parse_invocation(&args(&["ccthreads"])).expect_err("missing");
        assert!(matches!(error, CliParseError::MissingSubcommand));
    }

    #[test]
    fn parse_help_flag_wins() {
        let parsed = parse_invocation(&args(&["ccthreads", "tree", "--help"])).expect("parse");
        assert_eq!(parsed, CliInvocation::PrintHelp);
        let parsed = parse_invocation(&args(&["ccthreads", "-V"])).expect("parse");
        assert_eq!(parsed, CliInvocation::PrintVersion);
    }

    #[test]
    fn parse_root_flag_before_subcommand() {
        let request = command(&["ccthreads", "--root", "/data/projects", "threads"]);
        assert_eq!(request.root, Some(PathBuf::from("/data/projects")));
        assert_eq!(request.command, CliCommand::Threads);

        let error = parse_invocation(&args(&["ccthreads", "--root"])).expect_err("missing value");
        assert!(matches!(error, CliParseError::MissingFlagValue(_)));
    }

    #[test]
    fn parse_commands_with_positionals() {
        assert_eq!(
            command(&["ccthreads", "thread", "sess-1"]).command,
            CliCommand::Thread {
                root_session_id: "sess-1".to_string()
            }
        );
        assert_eq!(
            command(&["ccthreads", "session", "-Users-alice-proj", "sess-2"]).command,
            CliCommand::Session {
                project: "-Users-alice-proj".to_string(),
                session_id: "sess-2".to_string(),
            }
        );
        assert_eq!(
            command(&["ccthreads", "find", "abc"]).command,
            CliCommand::Find {
                session_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_missing_and_extra_positionals() {
        let error = parse_invocation(&args(&["ccthreads", "session", "p"])).expect_err("missing");
        assert!(matches!(error, CliParseError::MissingArgument("session-id")));

        let error = parse_invocation(&args(&["ccthreads", "tree", "x"])).expect_err("extra");
        assert!(matches!(error, CliParseError::UnexpectedArgument(_)));
    }

    #[test]
    fn parse_command_flags() {
        assert_eq!(
            command(&["ccthreads", "watch", "--replay"]).command,
            CliCommand::Watch { replay: true }
        );
        assert_eq!(
            command(&["ccthreads", "reconcile"]).command,
            CliCommand::Reconcile { apply: false }
        );
        assert_eq!(
            command(&["ccthreads", "reconcile", "--apply"]).command,
            CliCommand::Reconcile { apply: true }
        );

        let error = parse_invocation(&args(&["ccthreads", "tree", "--apply"])).expect_err("flag");
        assert!(matches!(error, CliParseError::UnknownFlag(_)));
    }

    #[test]
    fn parse_unknown_subcommand() {
        let error = parse_invocation(&args(&["ccthreads", "nope"])).expect_err("unknown");
        assert!(matches!(error, CliParseError::UnknownSubcommand(_)));
    }

    #[test]
    fn missing_session_maps_to_data_failure() {
        assert_eq!(
            CliRunError::SessionNotFound("x".to_string()).kind(),
            FailureKind::MissingData
        );
        let scan = CliRunError::from(ScanError::ProjectsDirMissing("/x".to_string()));
        assert_eq!(scan.kind(), FailureKind::Setup);
    }

    #[test]
    fn write_line_reports_broken_pipe_as_end_of_output() {
        struct BrokenPipe;
        impl Write for BrokenPipe {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut out = BrokenPipe;
        assert!(!write_line(&mut out, "x").expect("write"));

        let mut buf = Vec::new();
        assert!(write_json(&mut buf, &vec![1, 2]).expect("write"));
        let parsed: Vec<u32> = serde_json::from_slice(&buf).expect("json");
        assert_eq!(parsed, vec![1, 2]);
    }
}
