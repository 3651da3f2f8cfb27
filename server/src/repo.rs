use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use walkdir::WalkDir;

use crate::error::NoteError;
use crate::paths::{self, is_note, sanitize_note_name, to_relative};
use crate::tree::{build_tree, TreeNode, SIDECAR_NAME};

// Relative paths that delete, rename and move refuse to touch.
const PROTECTED: &[&str] = &["", SIDECAR_NAME];

const EVENT_CAPACITY: usize = 256;

/// Published after every successful mutation, carrying root-relative paths.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeEvent {
	Created { path: String },
	Updated { path: String },
	Renamed { from: String, to: String },
	Moved { from: String, to: String },
	Deleted { path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
	pub path: String,
	pub tree: Vec<TreeNode>,
}

/// Storage seam for notes. Every method takes client-relative paths and
/// validates them itself, so callers never touch an unchecked path.
pub trait NoteRepository: Send + Sync {
	fn root(&self) -> &Path;
	fn list(&self) -> Result<Vec<TreeNode>, NoteError>;
	fn get(&self, path: &str) -> Result<String, NoteError>;
	/// Exclusive create of an empty note; returns the stored relative path.
	fn create(&self, filename: &str) -> Result<String, NoteError>;
	fn put(&self, path: &str, content: &str) -> Result<(), NoteError>;
	fn append(&self, path: &str, content: &str) -> Result<(), NoteError>;
	fn rename(&self, old_path: &str, new_path: &str) -> Result<(), NoteError>;
	fn move_note(&self, source: &str, target_folder: &str) -> Result<MoveOutcome, NoteError>;
	/// Returns how many filesystem entries were removed.
	fn delete(&self, path: &str) -> Result<usize, NoteError>;
	fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

pub struct FsRepository {
	root: PathBuf,
	events: broadcast::Sender<ChangeEvent>,
}

impl FsRepository {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self { root: root.into(), events }
	}

	fn resolve(&self, relative: &str) -> Result<PathBuf, NoteError> {
		paths::validate(&self.root, relative)
	}

	fn rel(&self, abs: &Path) -> String {
		to_relative(&self.root, abs)
	}

	fn publish(&self, event: ChangeEvent) {
		// no subscribers is fine
		let _ = self.events.send(event);
	}

	fn ensure_unprotected(&self, abs: &Path) -> Result<(), NoteError> {
		let rel = self.rel(abs);
		if PROTECTED.contains(&rel.as_str()) {
			return Err(NoteError::ProtectedResource(if rel.is_empty() { "notes root".to_string() } else { rel }));
		}
		Ok(())
	}

	fn note_path(&self, relative: &str) -> Result<PathBuf, NoteError> {
		let abs = self.resolve(relative)?;
		if !is_note(&abs) {
			return Err(NoteError::InvalidInput(format!("{} is not a markdown note", relative)));
		}
		Ok(abs)
	}
}

fn require_file(abs: &Path, relative: &str) -> Result<(), NoteError> {
	match fs::metadata(abs) {
		Ok(m) if m.is_file() => Ok(()),
		Ok(_) => Err(NoteError::NotFound(relative.to_string())),
		Err(e) => Err(NoteError::from_io(e, relative)),
	}
}

fn remove_tree(dir: &Path) -> Result<usize, NoteError> {
	let mut removed = 0usize;
	for entry in WalkDir::new(dir).follow_links(false).contents_first(true) {
		let entry = entry.map_err(|e| NoteError::Io(e.into()))?;
		if entry.file_type().is_dir() {
			fs::remove_dir(entry.path())?;
		} else {
			fs::remove_file(entry.path())?;
		}
		removed += 1;
	}
	Ok(removed)
}

impl NoteRepository for FsRepository {
	fn root(&self) -> &Path { &self.root }

	fn list(&self) -> Result<Vec<TreeNode>, NoteError> {
		build_tree(&self.root)
	}

	fn get(&self, path: &str) -> Result<String, NoteError> {
		let abs = self.note_path(path)?;
		require_file(&abs, path)?;
		fs::read_to_string(&abs).map_err(|e| NoteError::from_io(e, path))
	}

	fn create(&self, filename: &str) -> Result<String, NoteError> {
		let rel = sanitize_note_name(filename)?;
		let abs = self.resolve(&rel)?;
		if let Some(parent) = abs.parent() {
			fs::create_dir_all(parent).map_err(|e| NoteError::from_io(e, &rel))?;
		}
		OpenOptions::new().write(true).create_new(true).open(&abs).map_err(|e| NoteError::from_io(e, &rel))?;
		info!(path = %rel, "note created");
		self.publish(ChangeEvent::Created { path: rel.clone() });
		Ok(rel)
	}

	fn put(&self, path: &str, content: &str) -> Result<(), NoteError> {
		let abs = self.note_path(path)?;
		if abs.is_dir() {
			return Err(NoteError::InvalidInput(format!("{} is a folder", path)));
		}
		// intermediate folders are not created on overwrite
		match abs.parent() {
			Some(parent) if parent.is_dir() => {}
			_ => return Err(NoteError::NotFound(format!("parent folder of {}", path))),
		}
		let existed = abs.is_file();
		fs::write(&abs, content).map_err(|e| NoteError::from_io(e, path))?;
		let rel = self.rel(&abs);
		info!(path = %rel, bytes = content.len(), "note written");
		self.publish(if existed { ChangeEvent::Updated { path: rel } } else { ChangeEvent::Created { path: rel } });
		Ok(())
	}

	fn append(&self, path: &str, content: &str) -> Result<(), NoteError> {
		let abs = self.note_path(path)?;
		require_file(&abs, path)?;
		let mut file = OpenOptions::new().append(true).open(&abs).map_err(|e| NoteError::from_io(e, path))?;
		file.write_all(format!("\n{}", content).as_bytes())?;
		let rel = self.rel(&abs);
		info!(path = %rel, bytes = content.len(), "note appended");
		self.publish(ChangeEvent::Updated { path: rel });
		Ok(())
	}

	fn rename(&self, old_path: &str, new_path: &str) -> Result<(), NoteError> {
		let from = self.resolve(old_path)?;
		let to = self.resolve(new_path)?;
		self.ensure_unprotected(&from)?;
		self.ensure_unprotected(&to)?;
		let meta = fs::symlink_metadata(&from).map_err(|e| NoteError::from_io(e, old_path))?;
		if fs::symlink_metadata(&to).is_ok() {
			return Err(NoteError::AlreadyExists(new_path.to_string()));
		}
		if meta.is_file() && is_note(&from) && !is_note(&to) {
			return Err(NoteError::InvalidInput(format!("{} must keep the .md extension", new_path)));
		}
		if meta.is_dir() && to.starts_with(&from) {
			return Err(NoteError::InvalidInput("cannot move a folder inside itself".to_string()));
		}
		fs::rename(&from, &to).map_err(|e| NoteError::from_io(e, new_path))?;
		let (from, to) = (self.rel(&from), self.rel(&to));
		info!(%from, %to, "renamed");
		self.publish(ChangeEvent::Renamed { from, to });
		Ok(())
	}

	fn move_note(&self, source: &str, target_folder: &str) -> Result<MoveOutcome, NoteError> {
		let src = self.resolve(source)?;
		let dest_dir = self.resolve(target_folder)?;
		self.ensure_unprotected(&src)?;
		let meta = fs::metadata(&src).map_err(|e| NoteError::from_io(e, source))?;
		if !meta.is_file() {
			return Err(NoteError::InvalidInput(format!("{} is not a file", source)));
		}
		let dest_meta = fs::metadata(&dest_dir).map_err(|e| NoteError::from_io(e, target_folder))?;
		if !dest_meta.is_dir() {
			return Err(NoteError::InvalidInput(format!("{} is not a folder", target_folder)));
		}
		if src.parent() == Some(dest_dir.as_path()) {
			return Err(NoteError::InvalidInput(format!("{} is already in that folder", source)));
		}
		let Some(name) = src.file_name() else {
			return Err(NoteError::InvalidInput(format!("{} has no file name", source)));
		};
		let dest = dest_dir.join(name);
		if fs::symlink_metadata(&dest).is_ok() {
			return Err(NoteError::AlreadyExists(self.rel(&dest)));
		}
		fs::rename(&src, &dest).map_err(|e| NoteError::from_io(e, source))?;
		let (from, to) = (self.rel(&src), self.rel(&dest));
		info!(%from, %to, "note moved");
		self.publish(ChangeEvent::Moved { from, to: to.clone() });
		Ok(MoveOutcome { path: to, tree: self.list()? })
	}

	fn delete(&self, path: &str) -> Result<usize, NoteError> {
		let abs = self.resolve(path)?;
		self.ensure_unprotected(&abs)?;
		let rel = self.rel(&abs);
		let meta = fs::symlink_metadata(&abs).map_err(|e| NoteError::from_io(e, path))?;
		let removed = if meta.is_dir() {
			remove_tree(&abs)?
		} else {
			fs::remove_file(&abs).map_err(|e| NoteError::from_io(e, path))?;
			1
		};
		info!(path = %rel, removed, "deleted");
		self.publish(ChangeEvent::Deleted { path: rel });
		Ok(removed)
	}

	fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
		self.events.subscribe()
	}
}
