use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoteError {
	#[error("{0}")]
	InvalidInput(String),
	#[error("path escapes the notes root: {0}")]
	InvalidPath(String),
	#[error("not found: {0}")]
	NotFound(String),
	#[error("already exists: {0}")]
	AlreadyExists(String),
	#[error("filesystem error: {0}")]
	Io(#[from] std::io::Error),
	#[error("protected path: {0}")]
	ProtectedResource(String),
	/// Raised by the editor buffer only, never by the repository.
	#[error("unsaved changes in {0}")]
	UnsavedChanges(String),
}

impl NoteError {
	pub fn status(&self) -> StatusCode {
		match self {
			NoteError::InvalidInput(_) | NoteError::InvalidPath(_) => StatusCode::BAD_REQUEST,
			NoteError::NotFound(_) => StatusCode::NOT_FOUND,
			NoteError::AlreadyExists(_) | NoteError::UnsavedChanges(_) => StatusCode::CONFLICT,
			NoteError::ProtectedResource(_) => StatusCode::FORBIDDEN,
			NoteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn code(&self) -> &'static str {
		match self {
			NoteError::InvalidInput(_) => "INVALID_INPUT",
			NoteError::InvalidPath(_) => "INVALID_PATH",
			NoteError::NotFound(_) => "NOT_FOUND",
			NoteError::AlreadyExists(_) => "ALREADY_EXISTS",
			NoteError::Io(_) => "IO_FAILURE",
			NoteError::ProtectedResource(_) => "PROTECTED_RESOURCE",
			NoteError::UnsavedChanges(_) => "UNSAVED_CHANGES",
		}
	}

	/// Maps an io error by kind; `what` names the path the call was about.
	pub fn from_io(err: std::io::Error, what: &str) -> Self {
		match err.kind() {
			std::io::ErrorKind::NotFound => NoteError::NotFound(what.to_string()),
			std::io::ErrorKind::AlreadyExists => NoteError::AlreadyExists(what.to_string()),
			_ => NoteError::Io(err),
		}
	}
}

#[inline]
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>, details: Option<serde_json::Value>) -> Response {
	let body = serde_json::json!({ "error": { "code": code, "message": message.into(), "details": details } });
	(status, Json(body)).into_response()
}

impl IntoResponse for NoteError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(err = %self, "request failed");
		} else {
			tracing::warn!(err = %self, code = self.code(), "request rejected");
		}
		json_error(status, self.code(), self.to_string(), None)
	}
}
