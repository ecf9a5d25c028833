use crate::domain::{EntryKind, LogEntry, parse_log_line};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// One non-blank line of a session file. Lines that do not parse keep their
/// text so a rewrite never loses them.
#[derive(Clone, Debug, PartialEq)]
pub struct CorpusLine {
    pub raw: String,
    pub entry: Option<LogEntry>,
}

impl CorpusLine {
    fn is_summary(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.kind == EntryKind::Summary)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub lines: Vec<CorpusLine>,
}

impl CorpusFile {
    pub fn from_text(path: PathBuf, text: &str) -> Self {
        let lines = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| CorpusLine {
                raw: line.to_string(),
                entry: parse_log_line(line).ok().flatten(),
            })
            .collect();
        Self { path, lines }
    }

    fn message_uuids(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter_map(|line| line.entry.as_ref())
            .filter(|entry| entry.kind.is_message())
            .filter_map(|entry| entry.uuid.as_deref())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMove {
    pub from: PathBuf,
    pub to: PathBuf,
    #[serde(skip)]
    line_index: usize,
    pub leaf_uuid: String,
    pub summary: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedSummary {
    pub file: PathBuf,
    pub leaf_uuid: String,
    pub summary: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReconcilePlan {
    pub moves: Vec<SummaryMove>,
    pub orphaned: Vec<OrphanedSummary>,
    pub total_messages: usize,
    pub total_summaries: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileRewrite {
    pub path: PathBuf,
    pub content: String,
    pub removed: usize,
    pub added: usize,
}

/// Finds summaries whose `leafUuid` is not a message of their own file and
/// locates the file that does own it.
pub fn plan_summary_moves(files: &[CorpusFile]) -> ReconcilePlan {
    let mut owners: HashMap<&str, &Path> = HashMap::new();
    let mut total_messages = 0usize;
    for file in files {
        for uuid in file.message_uuids() {
            total_messages += 1;
            owners.entry(uuid).or_insert(file.path.as_path());
        }
    }

    let mut plan = ReconcilePlan {
        total_messages,
        ..ReconcilePlan::default()
    };

    for file in files {
        let own: HashSet<&str> = file.message_uuids().collect();
        for (line_index, line) in file.lines.iter().enumerate() {
            let Some(entry) = line.entry.as_ref().filter(|_| line.is_summary()) else {
                continue;
            };
            plan.total_summaries += 1;

            let Some(leaf_uuid) = entry.leaf_uuid.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            if own.contains(leaf_uuid) {
                continue;
            }

            let summary = entry.summary.clone().unwrap_or_default();
            match owners.get(leaf_uuid) {
                Some(owner) => plan.moves.push(SummaryMove {
                    from: file.path.clone(),
                    to: owner.to_path_buf(),
                    line_index,
                    leaf_uuid: leaf_uuid.to_string(),
                    summary,
                }),
                None => plan.orphaned.push(OrphanedSummary {
                    file: file.path.clone(),
                    leaf_uuid: leaf_uuid.to_string(),
                    summary,
                }),
            }
        }
    }

    plan
}

impl ReconcilePlan {
    pub fn misplaced(&self) -> usize {
        self.moves.len()
    }

    /// Moved summary texts grouped by `"<from> → <to>"` file names.
    pub fn fixes_by_file(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for fix in &self.moves {
            let key = format!("{} → {}", file_label(&fix.from), file_label(&fix.to));
            grouped.entry(key).or_default().push(fix.summary.clone());
        }
        grouped
    }

    /// New contents for every file the plan touches. Relocated summaries are
    /// removed from their source; a destination gets its summaries first
    /// (existing, then incoming without duplicates) followed by all other
    /// lines in their original order.
    pub fn rewrites(&self, files: &[CorpusFile]) -> Vec<FileRewrite> {
        let mut removals: HashMap<&Path, BTreeSet<usize>> = HashMap::new();
        let mut incoming: HashMap<&Path, Vec<&SummaryMove>> = HashMap::new();
        for fix in &self.moves {
            removals
                .entry(fix.from.as_path())
                .or_default()
                .insert(fix.line_index);
            incoming.entry(fix.to.as_path()).or_default().push(fix);
        }

        let by_path: HashMap<&Path, &CorpusFile> =
            files.iter().map(|file| (file.path.as_path(), file)).collect();

        let touched: BTreeSet<&Path> = removals.keys().chain(incoming.keys()).copied().collect();
        touched
            .into_iter()
            .filter_map(|path| {
                let file = by_path.get(path)?;
                let removed = removals.get(path);
                let kept: Vec<&CorpusLine> = file
                    .lines
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| !removed.is_some_and(|set| set.contains(idx)))
                    .map(|(_, line)| line)
                    .collect();

                let arrivals = incoming
                    .get(path)
                    .map(|fixes| fresh_arrivals(&kept, fixes, &by_path))
                    .unwrap_or_default();

                let lines: Vec<&str> = if arrivals.is_empty() {
                    kept.iter().map(|line| line.raw.as_str()).collect()
                } else {
                    let summaries = kept.iter().filter(|line| line.is_summary());
                    let others = kept.iter().filter(|line| !line.is_summary());
                    summaries
                        .map(|line| line.raw.as_str())
                        .chain(arrivals.iter().copied())
                        .chain(others.map(|line| line.raw.as_str()))
                        .collect()
                };

                let mut content = lines.join("\n");
                if !content.is_empty() {
                    content.push('\n');
                }
                Some(FileRewrite {
                    path: path.to_path_buf(),
                    content,
                    removed: removed.map(BTreeSet::len).unwrap_or(0),
                    added: arrivals.len(),
                })
            })
            .collect()
    }
}

/// Raw lines of incoming summaries that the destination does not already
/// hold, compared by leaf and text.
fn fresh_arrivals<'a>(
    kept: &[&CorpusLine],
    fixes: &[&SummaryMove],
    by_path: &HashMap<&Path, &'a CorpusFile>,
) -> Vec<&'a str> {
    let mut seen: HashSet<(String, String)> = kept
        .iter()
        .filter_map(|line| line.entry.as_ref().filter(|_| line.is_summary()))
        .map(summary_key)
        .collect();

    let mut out = Vec::new();
    for fix in fixes {
        let Some(line) = by_path
            .get(fix.from.as_path())
            .copied()
            .and_then(|source: &'a CorpusFile| source.lines.get(fix.line_index))
        else {
            continue;
        };
        if seen.insert((fix.leaf_uuid.clone(), fix.summary.clone())) {
            out.push(line.raw.as_str());
        }
    }
    out
}

fn summary_key(entry: &LogEntry) -> (String, String) {
    (
        entry.leaf_uuid.clone().unwrap_or_default(),
        entry.summary.clone().unwrap_or_default(),
    )
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(path: &str, lines: &[&str]) -> CorpusFile {
        CorpusFile::from_text(PathBuf::from(path), &lines.join("\n"))
    }

    const MSG_A1: &str = r#"{"type":"user","uuid":"a1","sessionId":"a","timestamp":"T1"}"#;
    const MSG_A2: &str = r#"{"type":"assistant","uuid":"a2","sessionId":"a","timestamp":"T2"}"#;
    const MSG_B1: &str = r#"{"type":"user","uuid":"b1","sessionId":"b","timestamp":"T3"}"#;
    const SUM_FOR_A: &str = r#"{"type":"summary","summary":"About A","leafUuid":"a2"}"#;
    const SUM_FOR_B: &str = r#"{"type":"summary","summary":"About B","leafUuid":"b1"}"#;
    const SUM_ORPHAN: &str = r#"{"type":"summary","summary":"Lost","leafUuid":"zz"}"#;

    #[test]
    fn classifies_misplaced_and_orphaned_summaries() {
        let files = vec![
            corpus("/p/x/a.jsonl", &[SUM_FOR_B, SUM_FOR_A, MSG_A1, MSG_A2]),
            corpus("/p/x/b.jsonl", &[SUM_ORPHAN, MSG_B1]),
        ];
        let plan = plan_summary_moves(&files);

        assert_eq!(plan.total_messages, 3);
        assert_eq!(plan.total_summaries, 3);
        assert_eq!(plan.misplaced(), 1);
        assert_eq!(plan.moves[0].from, PathBuf::from("/p/x/a.jsonl"));
        assert_eq!(plan.moves[0].to, PathBuf::from("/p/x/b.jsonl"));
        assert_eq!(plan.orphaned.len(), 1);
        assert_eq!(plan.orphaned[0].leaf_uuid, "zz");

        let fixes = plan.fixes_by_file();
        assert_eq!(
            fixes.get("a.jsonl → b.jsonl"),
            Some(&vec!["About B".to_string()])
        );
    }

    #[test]
    fn rewrites_move_summary_and_keep_message_order() {
        let files = vec![
            corpus("/p/x/a.jsonl", &[SUM_FOR_B, SUM_FOR_A, MSG_A1, "{broken", MSG_A2]),
            corpus("/p/x/b.jsonl", &[MSG_B1]),
        ];
        let plan = plan_summary_moves(&files);
        let rewrites = plan.rewrites(&files);
        assert_eq!(rewrites.len(), 2);

        let a = &rewrites[0];
        assert_eq!(a.path, PathBuf::from("/p/x/a.jsonl"));
        assert_eq!(a.removed, 1);
        assert_eq!(a.content, format!("{SUM_FOR_A}\n{MSG_A1}\n{{broken\n{MSG_A2}\n"));

        let b = &rewrites[1];
        assert_eq!(b.added, 1);
        assert_eq!(b.content, format!("{SUM_FOR_B}\n{MSG_B1}\n"));
    }

    #[test]
    fn incoming_duplicates_are_not_appended_twice() {
        let files = vec![
            corpus("/p/x/a.jsonl", &[SUM_FOR_B, MSG_A1]),
            corpus("/p/x/c.jsonl", &[SUM_FOR_B]),
            corpus("/p/x/b.jsonl", &[SUM_FOR_B, MSG_B1]),
        ];
        let plan = plan_summary_moves(&files);
        assert_eq!(plan.misplaced(), 2);

        let rewrites = plan.rewrites(&files);
        let b = rewrites
            .iter()
            .find(|r| r.path == PathBuf::from("/p/x/b.jsonl"))
            .expect("b rewrite");
        assert_eq!(b.added, 0);
        assert_eq!(b.content, format!("{SUM_FOR_B}\n{MSG_B1}\n"));

        let c = rewrites
            .iter()
            .find(|r| r.path == PathBuf::from("/p/x/c.jsonl"))
            .expect("c rewrite");
        assert!(c.content.is_empty());
    }

    #[test]
    fn correctly_placed_summaries_produce_no_plan() {
        let files = vec![corpus("/p/x/a.jsonl", &[SUM_FOR_A, MSG_A1, MSG_A2])];
        let plan = plan_summary_moves(&files);
        assert_eq!(plan.misplaced(), 0);
        assert!(plan.orphaned.is_empty());
        assert!(plan.rewrites(&files).is_empty());
    }
}
