//! Markdown notes tree server: path validation, tree listing and single-shot
//! note mutations over a fixed notes root, exposed as a JSON HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod paths;
pub mod repo;
pub mod session;
pub mod tree;

pub use error::NoteError;
pub use repo::{ChangeEvent, FsRepository, NoteRepository};
pub use tree::{build_tree, TreeNode};
