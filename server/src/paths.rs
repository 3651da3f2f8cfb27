//! Client-supplied path handling: every relative path the API receives goes
//! through `validate` before it is allowed near the filesystem.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::NoteError;

pub const NOTE_EXT: &str = "md";

// Characters that are never legal inside a path component on any target we serve.
static ILLEGAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"|?*\x00-\x1F]"#).unwrap());

/// Resolves `relative` against `root`, rejecting anything that would land outside it.
/// Empty input resolves to the root itself.
pub fn validate(root: &Path, relative: &str) -> Result<PathBuf, NoteError> {
	let cleaned = ILLEGAL.replace_all(relative, "").replace('\\', "/");
	if cleaned.starts_with('/') {
		return Err(NoteError::InvalidPath(relative.to_string()));
	}
	let mut resolved = root.to_path_buf();
	for part in cleaned.split('/') {
		match part {
			"" | "." => continue,
			".." => return Err(NoteError::InvalidPath(relative.to_string())),
			p => resolved.push(p),
		}
	}
	// push() replaces the buffer when handed an absolute or prefixed component
	if !resolved.starts_with(root) || resolved.components().any(|c| matches!(c, Component::ParentDir)) {
		return Err(NoteError::InvalidPath(relative.to_string()));
	}
	ensure_not_linked_out(root, &resolved, relative)?;
	Ok(resolved)
}

// Symlinks inside the root may still point elsewhere; check the nearest existing ancestor.
// An existing entry that cannot be canonicalised is a dangling link and is refused.
fn ensure_not_linked_out(root: &Path, resolved: &Path, relative: &str) -> Result<(), NoteError> {
	let mut existing = resolved;
	while std::fs::symlink_metadata(existing).is_err() {
		match existing.parent() {
			Some(parent) => existing = parent,
			None => return Ok(()),
		}
	}
	let canon_root = root.canonicalize()?;
	let canon = existing.canonicalize().map_err(|_| NoteError::InvalidPath(relative.to_string()))?;
	if canon.starts_with(&canon_root) { Ok(()) } else { Err(NoteError::InvalidPath(relative.to_string())) }
}

/// Turns a requested note name into a relative `.md` path. Folder segments
/// are kept; an empty stem is rejected.
pub fn sanitize_note_name(requested: &str) -> Result<String, NoteError> {
	let parts: Vec<String> = requested
		.split(['/', '\\'])
		.map(|p| ILLEGAL.replace_all(p, "").trim().to_string())
		.filter(|p| !p.is_empty())
		.collect();
	let Some((last, dirs)) = parts.split_last() else {
		return Err(NoteError::InvalidInput("filename is empty".to_string()));
	};
	let suffix_len = NOTE_EXT.len() + 1;
	let stem = if last.len() >= suffix_len && last.to_ascii_lowercase().ends_with(".md") { &last[..last.len() - suffix_len] } else { last.as_str() };
	let stem = stem.trim_end_matches(['.', ' ']);
	if stem.is_empty() {
		return Err(NoteError::InvalidInput(format!("filename {:?} has no usable characters", requested)));
	}
	let mut out: Vec<String> = dirs.to_vec();
	out.push(format!("{}.{}", stem, NOTE_EXT));
	Ok(out.join("/"))
}

/// Forward-slash path of `absolute` relative to `root`; empty for the root itself.
pub fn to_relative(root: &Path, absolute: &Path) -> String {
	let rel = absolute.strip_prefix(root).unwrap_or(absolute);
	rel.components()
		.filter_map(|c| match c { Component::Normal(s) => Some(s.to_string_lossy().into_owned()), _ => None })
		.collect::<Vec<_>>()
		.join("/")
}

pub fn is_note(path: &Path) -> bool {
	path.extension().map(|e| e.eq_ignore_ascii_case(NOTE_EXT)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{distributions::Alphanumeric, Rng};

	#[test]
	fn resolves_nested_paths_inside_root() {
		let dir = tempfile::tempdir().unwrap();
		let p = validate(dir.path(), "projects/rust/ideas.md").unwrap();
		assert_eq!(p, dir.path().join("projects").join("rust").join("ideas.md"));
		assert_eq!(validate(dir.path(), "").unwrap(), dir.path());
		assert_eq!(validate(dir.path(), "./a/./b.md").unwrap(), dir.path().join("a").join("b.md"));
	}

	#[test]
	fn rejects_traversal_and_absolute_paths() {
		let dir = tempfile::tempdir().unwrap();
		for bad in ["../etc/passwd", "a/../../b.md", "a/..", "..", "/etc/passwd", "\\windows\\system32", "a\\..\\..\\b"] {
			assert!(matches!(validate(dir.path(), bad), Err(NoteError::InvalidPath(_))), "accepted {bad}");
		}
	}

	#[test]
	fn strips_illegal_characters() {
		let dir = tempfile::tempdir().unwrap();
		let p = validate(dir.path(), "we|ird?na*me.md").unwrap();
		assert_eq!(p, dir.path().join("weirdname.md"));
	}

	#[cfg(unix)]
	#[test]
	fn rejects_symlink_out_of_root() {
		let root = tempfile::tempdir().unwrap();
		let outside = tempfile::tempdir().unwrap();
		std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();
		assert!(matches!(validate(root.path(), "escape/secret.md"), Err(NoteError::InvalidPath(_))));
	}

	#[cfg(unix)]
	#[test]
	fn rejects_dangling_symlink_to_outside_target() {
		let root = tempfile::tempdir().unwrap();
		let outside = tempfile::tempdir().unwrap();
		let target = outside.path().join("pwned.md");
		std::os::unix::fs::symlink(&target, root.path().join("escape.md")).unwrap();
		std::os::unix::fs::symlink(outside.path().join("nodir"), root.path().join("gone")).unwrap();
		assert!(matches!(validate(root.path(), "escape.md"), Err(NoteError::InvalidPath(_))));
		assert!(matches!(validate(root.path(), "gone/x.md"), Err(NoteError::InvalidPath(_))));
		assert!(!target.exists());
	}

	#[test]
	fn fuzz_parent_segments_always_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let mut rng = rand::thread_rng();
		for _ in 0..200 {
			let segs: Vec<String> = (0..rng.gen_range(0..4)).map(|_| {
				let len = rng.gen_range(1..8);
				(0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
			}).collect();
			let at = rng.gen_range(0..=segs.len());
			let mut with_parent = segs.clone();
			with_parent.insert(at, "..".to_string());
			let p = with_parent.join("/");
			assert!(matches!(validate(dir.path(), &p), Err(NoteError::InvalidPath(_))), "accepted {p}");
			let ok = segs.join("/");
			assert!(validate(dir.path(), &ok).unwrap().starts_with(dir.path()));
		}
	}

	#[test]
	fn sanitizes_note_names() {
		assert_eq!(sanitize_note_name("draft").unwrap(), "draft.md");
		assert_eq!(sanitize_note_name("draft.md").unwrap(), "draft.md");
		assert_eq!(sanitize_note_name(" ideas/ to*do? ").unwrap(), "ideas/todo.md");
		assert_eq!(sanitize_note_name("notes.txt").unwrap(), "notes.txt.md");
		assert!(matches!(sanitize_note_name("  "), Err(NoteError::InvalidInput(_))));
		assert!(matches!(sanitize_note_name("???"), Err(NoteError::InvalidInput(_))));
		assert!(matches!(sanitize_note_name(".md"), Err(NoteError::InvalidInput(_))));
	}

	#[test]
	fn relative_paths_use_forward_slashes() {
		let root = Path::new("/notes");
		assert_eq!(to_relative(root, &root.join("a").join("b.md")), "a/b.md");
		assert_eq!(to_relative(root, root), "");
		assert!(is_note(Path::new("x/y.MD")));
		assert!(!is_note(Path::new(".metadata.json")));
	}
}
