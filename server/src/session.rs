//! Client-side state: the open editor buffer and the cached tree listing.
//! Both sit on top of a `NoteRepository`, the same seam the HTTP handlers use.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

use crate::error::NoteError;
use crate::repo::{ChangeEvent, NoteRepository};
use crate::tree::TreeNode;

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenNote {
	path: String,
	saved: String,
	content: String,
}

/// Holds at most one note. The dirty flag is set by every edit and cleared
/// by a successful save; switching away from a dirty buffer needs `force`.
pub struct EditorBuffer {
	repo: Arc<dyn NoteRepository>,
	open: Option<OpenNote>,
	dirty: bool,
}

impl EditorBuffer {
	pub fn new(repo: Arc<dyn NoteRepository>) -> Self {
		Self { repo, open: None, dirty: false }
	}

	pub fn path(&self) -> Option<&str> { self.open.as_ref().map(|n| n.path.as_str()) }
	pub fn content(&self) -> Option<&str> { self.open.as_ref().map(|n| n.content.as_str()) }
	pub fn is_dirty(&self) -> bool { self.dirty }

	fn guard(&self, force: bool) -> Result<(), NoteError> {
		match &self.open {
			Some(note) if self.dirty && !force => Err(NoteError::UnsavedChanges(note.path.clone())),
			_ => Ok(()),
		}
	}

	/// Loads `path`. `force` discards unsaved edits of the current note.
	pub fn open(&mut self, path: &str, force: bool) -> Result<(), NoteError> {
		self.guard(force)?;
		let content = self.repo.get(path)?;
		self.open = Some(OpenNote { path: path.to_string(), saved: content.clone(), content });
		self.dirty = false;
		Ok(())
	}

	/// Creates an empty note and opens it.
	pub fn new_note(&mut self, filename: &str, force: bool) -> Result<String, NoteError> {
		self.guard(force)?;
		let path = self.repo.create(filename)?;
		self.open = Some(OpenNote { path: path.clone(), saved: String::new(), content: String::new() });
		self.dirty = false;
		Ok(path)
	}

	pub fn edit(&mut self, content: impl Into<String>) -> Result<(), NoteError> {
		let note = self.open.as_mut().ok_or_else(|| NoteError::InvalidInput("no note is open".to_string()))?;
		note.content = content.into();
		self.dirty = true;
		Ok(())
	}

	/// Writes the buffer back. On failure the buffer stays dirty so the save can be repeated.
	pub fn save(&mut self) -> Result<(), NoteError> {
		let note = self.open.as_mut().ok_or_else(|| NoteError::InvalidInput("no note is open".to_string()))?;
		self.repo.put(&note.path, &note.content)?;
		note.saved = note.content.clone();
		self.dirty = false;
		Ok(())
	}

	pub fn discard(&mut self) {
		if let Some(note) = self.open.as_mut() {
			note.content = note.saved.clone();
		}
		self.dirty = false;
	}

	pub fn close(&mut self, force: bool) -> Result<(), NoteError> {
		self.guard(force)?;
		self.open = None;
		self.dirty = false;
		Ok(())
	}

	/// Keeps the buffer pointed at the right file after renames, moves and deletes.
	pub fn follow(&mut self, event: &ChangeEvent) {
		let Some(note) = self.open.as_mut() else { return };
		match event {
			ChangeEvent::Renamed { from, to } | ChangeEvent::Moved { from, to } => {
				if note.path == *from {
					note.path = to.clone();
				} else if let Some(rest) = note.path.strip_prefix(&format!("{}/", from)) {
					note.path = format!("{}/{}", to, rest);
				}
			}
			ChangeEvent::Deleted { path } => {
				if note.path == *path || note.path.starts_with(&format!("{}/", path)) {
					self.open = None;
					self.dirty = false;
				}
			}
			ChangeEvent::Created { .. } | ChangeEvent::Updated { .. } => {}
		}
	}
}

/// Display cache of the listing. Change events only mark it stale; the walk
/// happens once on the next `sync`, however many mutations arrived.
pub struct TreeView {
	repo: Arc<dyn NoteRepository>,
	events: broadcast::Receiver<ChangeEvent>,
	nodes: Vec<TreeNode>,
	stale: bool,
	walks: u64,
}

impl TreeView {
	pub fn new(repo: Arc<dyn NoteRepository>) -> Self {
		let events = repo.subscribe();
		Self { repo, events, nodes: Vec::new(), stale: true, walks: 0 }
	}

	pub fn nodes(&self) -> &[TreeNode] { &self.nodes }
	pub fn is_stale(&self) -> bool { self.stale }
	/// Number of full directory walks performed so far.
	pub fn walks(&self) -> u64 { self.walks }

	pub fn refresh(&mut self) -> Result<(), NoteError> {
		self.nodes = self.repo.list()?;
		self.stale = false;
		self.walks += 1;
		Ok(())
	}

	/// Drains pending events, returning them so an editor can `follow` them,
	/// and re-walks only if something changed.
	pub fn sync(&mut self) -> Result<Vec<ChangeEvent>, NoteError> {
		let mut seen = Vec::new();
		loop {
			match self.events.try_recv() {
				Ok(ev) => seen.push(ev),
				Err(TryRecvError::Lagged(n)) => {
					debug!(skipped = n, "tree view lagged behind change events");
					self.stale = true;
				}
				Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
			}
		}
		if !seen.is_empty() {
			self.stale = true;
		}
		if self.stale {
			self.refresh()?;
		}
		Ok(seen)
	}
}
