use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notes_tree_server::api::{build_router, AppState};
use notes_tree_server::config::{self, DEFAULT_BIND, DEFAULT_NOTES_DIR};
use notes_tree_server::{FsRepository, NoteRepository};

#[derive(Parser, Debug)]
#[command(name = "notes-tree-server", version, about = "HTTP API over a directory of Markdown notes")]
struct Cli {
	/// Bind address for the HTTP server
	#[arg(long, env = "HTTP_BIND", default_value = DEFAULT_BIND)]
	bind: String,

	/// Notes root directory
	#[arg(long, env = "NOTES_DIR", default_value = DEFAULT_NOTES_DIR)]
	notes_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	let cli = Cli::parse();
	let overrides = config::Overrides {
		bind: (cli.bind != DEFAULT_BIND).then_some(cli.bind),
		notes_dir: (cli.notes_dir != DEFAULT_NOTES_DIR).then_some(cli.notes_dir),
	};
	let cfg = config::Config::load(overrides)?;
	let root = cfg.notes_root;
	let repo: Arc<dyn NoteRepository> = Arc::new(FsRepository::new(root.clone()));
	let state = Arc::new(AppState::new(repo));

	info!(bind = %cfg.bind, root = %root.display(), "Starting HTTP server");
	let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
	axum::serve(listener, build_router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await?;
	info!("Shutdown complete");
	Ok(())
}

fn init_tracing() {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let fmt_layer = fmt::layer().with_target(false).with_ansi(false).with_writer(std::io::stderr);
	tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

async fn shutdown_signal() {
	let _ = signal::ctrl_c().await;
	info!("Shutdown signal received");
}
