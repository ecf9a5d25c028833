//! Folder tree over project paths.
//!
//! Nodes live in an arena and refer to each other by index. Collapsing
//! chains of single-child folders copies the tree into a fresh arena, so a
//! merged node is a new node rather than an edited one.

use crate::domain::{
    FileTreeNode, NodeKind, PathRules, ProjectTree, SessionThread, ThreadDigest,
    resolve_project_segments,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const COLLAPSED_NAME_SEPARATOR: &str = "/";

const ROOT_NAME: &str = "root";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct NodeId(usize);

#[derive(Clone, Debug)]
struct Node {
    name: String,
    path: String,
    kind: NodeKind,
    children: Vec<NodeId>,
    sessions: Vec<ThreadDigest>,
}

#[derive(Clone, Debug)]
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn with_root() -> (Self, NodeId) {
        let mut arena = Self { nodes: Vec::new() };
        let root = arena.push(Node {
            name: ROOT_NAME.to_string(),
            path: String::new(),
            kind: NodeKind::Folder,
            children: Vec::new(),
            sessions: Vec::new(),
        });
        (arena, root)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).name == name)
    }

    /// Walks `segments` from `root`, creating folders as needed, and returns
    /// the deepest node.
    fn ensure_path(&mut self, root: NodeId, segments: &[String]) -> NodeId {
        let mut current = root;
        for (depth, segment) in segments.iter().enumerate() {
            current = match self.child_named(current, segment) {
                Some(existing) => existing,
                None => {
                    let child = self.push(Node {
                        name: segment.clone(),
                        path: format!("/{}", segments[..=depth].join("/")),
                        kind: NodeKind::Folder,
                        children: Vec::new(),
                        sessions: Vec::new(),
                    });
                    self.node_mut(current).children.push(child);
                    child
                }
            };
        }
        current
    }

    fn is_collapsible(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.kind == NodeKind::Folder
            && node.sessions.is_empty()
            && node.children.len() == 1
            && self.node(node.children[0]).kind == NodeKind::Folder
    }

    /// Copies the subtree at `id` into `out`, merging every single-child
    /// folder chain into one node.
    fn collapse_into(&self, id: NodeId, out: &mut Arena) -> NodeId {
        let mut name = self.node(id).name.clone();
        let mut current = id;
        while self.is_collapsible(current) {
            current = self.node(current).children[0];
            name.push_str(COLLAPSED_NAME_SEPARATOR);
            name.push_str(&self.node(current).name);
        }

        let source = self.node(current);
        let children = source
            .children
            .iter()
            .map(|child| self.collapse_into(*child, out))
            .collect();
        out.push(Node {
            name,
            path: source.path.clone(),
            kind: source.kind,
            children,
            sessions: source.sessions.clone(),
        })
    }

    /// Root is never merged; its children are collapsed independently.
    fn collapsed(&self, root: NodeId) -> (Arena, NodeId) {
        let (mut out, new_root) = Arena::with_root();
        let children: Vec<NodeId> = self
            .node(root)
            .children
            .iter()
            .map(|child| self.collapse_into(*child, &mut out))
            .collect();
        out.node_mut(new_root).children = children;
        (out, new_root)
    }

    fn classify(&mut self) {
        for node in &mut self.nodes {
            if node.children.is_empty() && !node.sessions.is_empty() {
                node.kind = NodeKind::Project;
            }
        }
    }

    fn sort(&mut self, id: NodeId) {
        let mut children = std::mem::take(&mut self.node_mut(id).children);
        children.sort_by(|a, b| {
            let (a, b) = (self.node(*a), self.node(*b));
            a.kind.cmp(&b.kind).then_with(|| compare_names(&a.name, &b.name))
        });
        for child in &children {
            self.sort(*child);
        }

        let node = self.node_mut(id);
        node.children = children;
        node.sessions
            .sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    }

    /// Post-order export; each node's count is its own sessions plus all of
    /// its descendants'.
    fn export(&self, id: NodeId) -> FileTreeNode {
        let node = self.node(id);
        let children: Vec<FileTreeNode> =
            node.children.iter().map(|child| self.export(*child)).collect();
        let session_count =
            node.sessions.len() + children.iter().map(|c| c.session_count).sum::<usize>();
        FileTreeNode {
            name: node.name.clone(),
            path: node.path.clone(),
            kind: node.kind,
            children,
            sessions: node.sessions.clone(),
            session_count,
        }
    }
}

/// Case-insensitive order; on a case-only tie lowercase sorts first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| b.cmp(a))
}

/// Builds the collapsed, sorted and counted tree and returns the root's
/// children.
pub fn build_tree(entries: Vec<(Vec<String>, Vec<ThreadDigest>)>) -> Vec<FileTreeNode> {
    let (mut arena, root) = Arena::with_root();
    for (segments, sessions) in entries {
        let terminal = arena.ensure_path(root, &segments);
        arena.node_mut(terminal).sessions.extend(sessions);
    }

    let (mut collapsed, root) = arena.collapsed(root);
    collapsed.classify();
    collapsed.sort(root);
    collapsed.export(root).children
}

/// Places every thread under the path of its project directory. Threads of
/// one project share a location, resolved from the first recorded `cwd`
/// among them.
pub fn build_project_tree(threads: &[SessionThread], rules: &PathRules) -> Vec<FileTreeNode> {
    let mut by_project: BTreeMap<&str, Vec<&SessionThread>> = BTreeMap::new();
    for thread in threads {
        by_project.entry(thread.project()).or_default().push(thread);
    }

    let entries = by_project
        .into_iter()
        .map(|(project, threads)| {
            let sample = threads.iter().flat_map(|thread| thread.messages.iter());
            let mut segments = resolve_project_segments(project, sample, rules);
            if segments.is_empty() {
                segments.push(project.to_string());
            }
            let sessions = threads.iter().map(|thread| thread.digest()).collect();
            (segments, sessions)
        })
        .collect();
    build_tree(entries)
}

pub fn project_tree(threads: &[SessionThread], rules: &PathRules) -> ProjectTree {
    ProjectTree {
        file_tree: build_project_tree(threads, rules),
        total_sessions: threads.len(),
    }
}
