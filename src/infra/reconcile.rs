use crate::domain::{CorpusFile, FileRewrite, OrphanedSummary, SummaryMove, plan_summary_moves};
use crate::infra::{FailureKind, ScanError, list_log_files, list_project_dirs};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rewrite {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Scan(error) => error.kind(),
            Self::Read { .. } | Self::Write { .. } => FailureKind::Transient,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub misplaced: usize,
    pub fixes_by_file: BTreeMap<String, Vec<String>>,
    pub moves: Vec<SummaryMove>,
    pub orphaned: Vec<OrphanedSummary>,
    pub total_messages: usize,
    pub total_summaries: usize,
    pub files_scanned: usize,
    pub applied: bool,
    pub files_rewritten: usize,
}

/// Reads every session log under `root`, keeping raw lines.
pub fn load_corpus(root: &Path) -> Result<Vec<CorpusFile>, ReconcileError> {
    let mut files = Vec::new();
    for project_dir in list_project_dirs(root)? {
        let paths = list_log_files(&project_dir).map_err(|source| ReconcileError::Read {
            path: project_dir.clone(),
            source,
        })?;
        for path in paths {
            let bytes = fs::read(&path).map_err(|source| ReconcileError::Read {
                path: path.clone(),
                source,
            })?;
            let text = String::from_utf8_lossy(&bytes);
            files.push(CorpusFile::from_text(path, &text));
        }
    }
    Ok(files)
}

/// Finds misplaced summaries under `root`. With `apply`, each affected file
/// is rewritten through a temp file and rename; files are not updated as a
/// group.
pub fn reconcile_summaries(root: &Path, apply: bool) -> Result<ReconcileReport, ReconcileError> {
    let corpus = load_corpus(root)?;
    let plan = plan_summary_moves(&corpus);

    for orphan in &plan.orphaned {
        tracing::warn!(
            path = %orphan.file.display(),
            leaf_uuid = %orphan.leaf_uuid,
            "summary refers to a message that exists in no file"
        );
    }

    let mut files_rewritten = 0usize;
    if apply {
        for rewrite in plan.rewrites(&corpus) {
            write_rewrite(&rewrite)?;
            files_rewritten += 1;
        }
    }

    Ok(ReconcileReport {
        misplaced: plan.misplaced(),
        fixes_by_file: plan.fixes_by_file(),
        files_scanned: corpus.len(),
        total_messages: plan.total_messages,
        total_summaries: plan.total_summaries,
        moves: plan.moves,
        orphaned: plan.orphaned,
        applied: apply,
        files_rewritten,
    })
}

fn write_rewrite(rewrite: &FileRewrite) -> Result<(), ReconcileError> {
    let write_error = |source| ReconcileError::Write {
        path: rewrite.path.clone(),
        source,
    };
    let tmp = rewrite.path.with_extension("jsonl.tmp");
    fs::write(&tmp, &rewrite.content).map_err(write_error)?;
    fs::rename(&tmp, &rewrite.path).map_err(write_error)?;
    tracing::info!(
        path = %rewrite.path.display(),
        removed = rewrite.removed,
        added = rewrite.added,
        "rewrote session file"
    );
    Ok(())
}
