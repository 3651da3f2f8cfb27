use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::NoteError;
use crate::repo::NoteRepository;
use crate::tree::{count_notes, TreeNode};

pub struct AppState {
	pub start_time: Instant,
	pub repo: Arc<dyn NoteRepository>,
}

impl AppState {
	pub fn new(repo: Arc<dyn NoteRepository>) -> Self {
		Self { start_time: Instant::now(), repo }
	}
}

#[derive(Deserialize)]
pub struct CreateRequest { pub filename: String }

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
	Append,
	#[default]
	Overwrite,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
	pub filename: String,
	pub content: String,
	#[serde(default)]
	pub action: UpdateAction,
}

#[derive(Deserialize)]
pub struct RenameRequest {
	#[serde(rename = "oldPath")]
	pub old_path: String,
	#[serde(rename = "newPath")]
	pub new_path: String,
}

#[derive(Deserialize)]
pub struct DeleteRequest { pub path: String }

#[derive(Deserialize)]
pub struct MoveRequest {
	#[serde(rename = "sourcePath")]
	pub source_path: String,
	#[serde(rename = "targetFolder")]
	pub target_folder: String,
}

#[derive(Serialize)]
struct Health { status: &'static str }

#[derive(Serialize)]
struct StatusResponse {
	uptime_ms: u128,
	notes_root: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	notes: Option<usize>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/status", get(status))
		.route("/api/notes/tree", get(notes_tree))
		.route("/api/notes/content", get(notes_content))
		.route("/api/notes/create", post(notes_create))
		.route("/api/notes/update", post(notes_update))
		.route("/api/notes/rename", post(notes_rename))
		.route("/api/notes/delete", post(notes_delete))
		.route("/api/notes/move", post(notes_move))
		.route("/api/notes/events", get(notes_events))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

// Body rejections (bad JSON, wrong types, missing content type) get the same error envelope.
fn body<T>(req: Result<Json<T>, JsonRejection>) -> Result<T, NoteError> {
	req.map(|Json(v)| v).map_err(|rej| NoteError::InvalidInput(rej.body_text()))
}

async fn health() -> Json<Health> { Json(Health { status: "ok" }) }

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
	let notes = match with_repo(&state, |repo| repo.list()).await {
		Ok(tree) => Some(count_notes(&tree)),
		Err(err) => {
			warn!(%err, "status could not list the notes root");
			None
		}
	};
	Json(StatusResponse {
		uptime_ms: state.start_time.elapsed().as_millis(),
		notes_root: state.repo.root().display().to_string(),
		notes,
	})
}

// Repository calls are blocking filesystem work; run them off the async workers.
async fn with_repo<T, F>(state: &Arc<AppState>, f: F) -> Result<T, NoteError>
where
	F: FnOnce(&dyn NoteRepository) -> Result<T, NoteError> + Send + 'static,
	T: Send + 'static,
{
	let repo = state.repo.clone();
	task::spawn_blocking(move || f(repo.as_ref()))
		.await
		.map_err(|err| NoteError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}

pub async fn notes_tree(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TreeNode>>, NoteError> {
	Ok(Json(with_repo(&state, |repo| repo.list()).await?))
}

pub async fn notes_content(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> Result<Json<serde_json::Value>, NoteError> {
	let path = params.get("path").cloned().ok_or_else(|| NoteError::InvalidInput("path query parameter is required".to_string()))?;
	let content = with_repo(&state, move |repo| repo.get(&path)).await?;
	Ok(Json(serde_json::json!({ "content": content })))
}

pub async fn notes_create(State(state): State<Arc<AppState>>, req: Result<Json<CreateRequest>, JsonRejection>) -> Result<(StatusCode, Json<serde_json::Value>), NoteError> {
	let req = body(req)?;
	let filename = with_repo(&state, move |repo| repo.create(&req.filename)).await?;
	Ok((StatusCode::CREATED, Json(serde_json::json!({ "message": "Note created", "filename": filename }))))
}

pub async fn notes_update(State(state): State<Arc<AppState>>, req: Result<Json<UpdateRequest>, JsonRejection>) -> Result<Json<serde_json::Value>, NoteError> {
	let req = body(req)?;
	let message = with_repo(&state, move |repo| match req.action {
		UpdateAction::Append => repo.append(&req.filename, &req.content).map(|_| "Note appended"),
		UpdateAction::Overwrite => repo.put(&req.filename, &req.content).map(|_| "Note saved"),
	}).await?;
	Ok(Json(serde_json::json!({ "message": message })))
}

pub async fn notes_rename(State(state): State<Arc<AppState>>, req: Result<Json<RenameRequest>, JsonRejection>) -> Result<Json<serde_json::Value>, NoteError> {
	let req = body(req)?;
	with_repo(&state, move |repo| repo.rename(&req.old_path, &req.new_path)).await?;
	Ok(Json(serde_json::json!({ "message": "Renamed" })))
}

pub async fn notes_delete(State(state): State<Arc<AppState>>, req: Result<Json<DeleteRequest>, JsonRejection>) -> Result<Json<serde_json::Value>, NoteError> {
	let req = body(req)?;
	let removed = with_repo(&state, move |repo| repo.delete(&req.path)).await?;
	Ok(Json(serde_json::json!({ "message": "Deleted", "removed": removed })))
}

pub async fn notes_move(State(state): State<Arc<AppState>>, req: Result<Json<MoveRequest>, JsonRejection>) -> Result<Json<serde_json::Value>, NoteError> {
	let req = body(req)?;
	let outcome = with_repo(&state, move |repo| repo.move_note(&req.source_path, &req.target_folder)).await?;
	Ok(Json(serde_json::json!({ "message": "Moved", "path": outcome.path, "tree": outcome.tree })))
}

/// Server-sent stream of change events; a `resync` event means some were dropped
/// and the client should refetch the tree.
async fn notes_events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
	let rx = state.repo.subscribe();
	let stream = futures::stream::unfold(rx, |mut rx| async move {
		let event = match rx.recv().await {
			Ok(change) => Event::default().event("change").json_data(&change).unwrap_or_else(|_| Event::default().event("resync")),
			Err(RecvError::Lagged(n)) => Event::default().event("resync").data(n.to_string()),
			Err(RecvError::Closed) => return None,
		};
		Some((Ok(event), rx))
	});
	Sse::new(stream).keep_alive(KeepAlive::default())
}
