mod cli;
mod domain;
mod infra;

use crate::cli::{CliInvocation, CliRequest};
use crate::infra::{FailureKind, LoadConfigError, ResolveProjectsDirError, load_default_settings};
use std::io::{self, Write};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] LoadConfigError),

    #[error(transparent)]
    ProjectsDir(#[from] ResolveProjectsDirError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),
}

impl MainError {
    fn exit_code(&self) -> i32 {
        let kind = match self {
            Self::Config(error) => error.kind(),
            Self::ProjectsDir(error) => error.kind(),
            Self::Cli(error) => error.kind(),
        };
        match kind {
            FailureKind::Setup => 3,
            FailureKind::MissingData => 4,
            FailureKind::Transient => 1,
        }
    }
}

fn main() {
    init_tracing();
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(error.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Command(CliRequest { root, command }) => {
            let settings = load_default_settings()?;
            let projects_dir = match root {
                Some(root) => root,
                None => settings.resolve_projects_dir()?,
            };
            tracing::debug!(projects_dir = %projects_dir.display(), "resolved projects dir");
            crate::cli::run(command, &projects_dir, &settings)?;
            Ok(())
        }
    }
}

fn print_help() {
    let text = format!(
        "{name} - browse conversation threads stored as JSONL session logs\n\nUSAGE:\n  {name} [--root DIR] threads                      List threads, most recent first\n  {name} [--root DIR] thread <root-session-id>     Print one assembled thread\n  {name} [--root DIR] tree                         Print the collapsed project folder tree\n  {name} [--root DIR] projects                     List threads grouped by project directory\n  {name} [--root DIR] find <session-id>            Locate a session file in any project\n  {name} [--root DIR] session <project> <session-id>  Print user/assistant messages of one file\n  {name} [--root DIR] watch [--replay]             Stream live events as JSON lines\n  {name} [--root DIR] reconcile [--apply]          Report (or fix) misplaced summaries\n  {name} --help | --version\n\nOUTPUT:\n  JSON on stdout; diagnostics on stderr.\n\nEXIT CODES:\n  1 read error   2 usage error   3 no corpus / setup   4 thread or session not found\n\nENV:\n  CLAUDE_PROJECTS_DIR   Override projects dir (default: ~/.claude/projects)\n  CCTHREADS_STATE_DIR   Override settings dir (default: ~/.ccthreads, reads config.json)\n  RUST_LOG              Log filter (default: warn)\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}
