use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::NoteError;
use crate::paths::{is_note, to_relative};

/// Optional ordering file at the notes root.
pub const SIDECAR_NAME: &str = ".metadata.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	File,
	Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeNode {
	pub name: String,
	pub path: String,
	#[serde(rename = "type")]
	pub kind: NodeKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
	pub fn is_dir(&self) -> bool { self.kind == NodeKind::Directory }
}

#[derive(Deserialize)]
struct SidecarFile { order: Vec<String> }

/// Explicit display order read from `.metadata.json`: relative path -> rank.
#[derive(Debug, Default, Clone)]
pub struct OrderingSidecar {
	index: HashMap<String, usize>,
}

impl OrderingSidecar {
	/// `None` when the sidecar is absent or cannot be parsed; the listing then
	/// falls back to the default order.
	pub fn load(root: &Path) -> Option<Self> {
		let raw = match std::fs::read_to_string(root.join(SIDECAR_NAME)) {
			Ok(raw) => raw,
			Err(err) => {
				debug!(%err, "no ordering sidecar");
				return None;
			}
		};
		match serde_json::from_str::<SidecarFile>(&raw) {
			Ok(file) => Some(Self::from_paths(file.order)),
			Err(err) => {
				warn!(%err, "ignoring malformed ordering sidecar");
				None
			}
		}
	}

	pub fn from_paths<I, S>(paths: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut index = HashMap::new();
		for (i, p) in paths.into_iter().enumerate() {
			let key = p.as_ref().replace('\\', "/").trim_start_matches("./").trim_matches('/').to_string();
			// first mention wins
			index.entry(key).or_insert(i);
		}
		Self { index }
	}

	pub fn position(&self, relative: &str) -> Option<usize> {
		self.index.get(relative).copied()
	}
}

/// Full directory walk of the notes root. Any read error aborts the listing.
pub fn build_tree(root: &Path) -> Result<Vec<TreeNode>, NoteError> {
	let sidecar = OrderingSidecar::load(root);
	walk(root, root, sidecar.as_ref())
}

// Symlinks are neither files nor directories here and are left out of the listing.
fn walk(root: &Path, dir: &Path, sidecar: Option<&OrderingSidecar>) -> Result<Vec<TreeNode>, NoteError> {
	let mut nodes = Vec::new();
	for entry in std::fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();
		let file_type = entry.file_type()?;
		let name = entry.file_name().to_string_lossy().into_owned();
		if file_type.is_dir() {
			let children = walk(root, &path, sidecar)?;
			nodes.push(TreeNode { name, path: to_relative(root, &path), kind: NodeKind::Directory, children: Some(children) });
		} else if file_type.is_file() && is_note(&path) {
			nodes.push(TreeNode { name, path: to_relative(root, &path), kind: NodeKind::File, children: None });
		}
	}
	sort_nodes(&mut nodes, sidecar);
	Ok(nodes)
}

fn sort_nodes(nodes: &mut [TreeNode], sidecar: Option<&OrderingSidecar>) {
	nodes.sort_by(|a, b| {
		let rank = |n: &TreeNode| sidecar.and_then(|s| s.position(&n.path));
		match (rank(a), rank(b)) {
			(Some(x), Some(y)) => x.cmp(&y),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => default_order(a, b),
		}
	});
}

fn default_order(a: &TreeNode, b: &TreeNode) -> Ordering {
	b.is_dir()
		.cmp(&a.is_dir())
		.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
		.then_with(|| a.name.cmp(&b.name))
}

pub fn count_notes(nodes: &[TreeNode]) -> usize {
	nodes.iter().map(|n| match &n.children {
		Some(children) => count_notes(children),
		None => 1,
	}).sum()
}

/// Depth-first lookup by relative path.
pub fn find<'a>(nodes: &'a [TreeNode], relative: &str) -> Option<&'a TreeNode> {
	for n in nodes {
		if n.path == relative { return Some(n); }
		if let Some(children) = &n.children {
			if let Some(hit) = find(children, relative) { return Some(hit); }
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn names(nodes: &[TreeNode]) -> Vec<&str> { nodes.iter().map(|n| n.name.as_str()).collect() }

	fn seed(root: &Path) {
		fs::create_dir_all(root.join("zeta")).unwrap();
		fs::create_dir_all(root.join("Alpha/inner")).unwrap();
		fs::write(root.join("b.md"), "b").unwrap();
		fs::write(root.join("A.md"), "a").unwrap();
		fs::write(root.join("image.png"), [0u8]).unwrap();
		fs::write(root.join("Alpha/note.md"), "n").unwrap();
		fs::write(root.join("Alpha/inner/deep.md"), "d").unwrap();
	}

	#[test]
	fn lists_directories_first_then_alphabetical() {
		let dir = tempfile::tempdir().unwrap();
		seed(dir.path());
		let tree = build_tree(dir.path()).unwrap();
		assert_eq!(names(&tree), vec!["Alpha", "zeta", "A.md", "b.md"]);
		let alpha = &tree[0];
		assert_eq!(alpha.kind, NodeKind::Directory);
		assert_eq!(names(alpha.children.as_ref().unwrap()), vec!["inner", "note.md"]);
		assert!(tree[1].children.as_ref().unwrap().is_empty());
		assert_eq!(find(&tree, "Alpha/inner/deep.md").unwrap().kind, NodeKind::File);
		assert_eq!(count_notes(&tree), 4);
	}

	#[test]
	fn sidecar_orders_listed_paths_first() {
		let dir = tempfile::tempdir().unwrap();
		seed(dir.path());
		fs::write(dir.path().join(SIDECAR_NAME), r#"{"order": ["b.md", "./zeta", "Alpha/note.md"]}"#).unwrap();
		let tree = build_tree(dir.path()).unwrap();
		assert_eq!(names(&tree), vec!["b.md", "zeta", "Alpha", "A.md"]);
		assert_eq!(names(tree[2].children.as_ref().unwrap()), vec!["note.md", "inner"]);
	}

	#[test]
	fn malformed_sidecar_is_ignored() {
		let dir = tempfile::tempdir().unwrap();
		seed(dir.path());
		fs::write(dir.path().join(SIDECAR_NAME), r#"{"order": "not-a-list"}"#).unwrap();
		let tree = build_tree(dir.path()).unwrap();
		assert_eq!(names(&tree), vec!["Alpha", "zeta", "A.md", "b.md"]);
		fs::write(dir.path().join(SIDECAR_NAME), "{broken").unwrap();
		assert!(OrderingSidecar::load(dir.path()).is_none());
	}

	#[test]
	fn missing_root_is_an_io_failure() {
		let dir = tempfile::tempdir().unwrap();
		let err = build_tree(&dir.path().join("nope")).unwrap_err();
		assert!(matches!(err, NoteError::Io(_)));
	}

	#[test]
	fn serializes_with_type_tag() {
		let node = TreeNode { name: "a.md".into(), path: "x/a.md".into(), kind: NodeKind::File, children: None };
		let v = serde_json::to_value(&node).unwrap();
		assert_eq!(v, serde_json::json!({"name": "a.md", "path": "x/a.md", "type": "file"}));
	}
}
