use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_NOTES_DIR: &str = "./notes";

/// Effective server settings. `notes_root` is canonical and exists.
pub struct Config {
	pub bind: SocketAddr,
	pub notes_root: PathBuf,
}

/// Values given on the command line; they win over `.env` and the environment.
#[derive(Default)]
pub struct Overrides {
	pub bind: Option<String>,
	pub notes_dir: Option<String>,
}

impl Config {
	pub fn load(overrides: Overrides) -> anyhow::Result<Self> {
		let _ = dotenvy::dotenv();
		let bind = overrides.bind
			.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).map(|p| format!("127.0.0.1:{}", p)))
			.or_else(|| std::env::var("HTTP_BIND").ok())
			.unwrap_or_else(|| DEFAULT_BIND.to_string());
		let notes_dir = overrides.notes_dir
			.or_else(|| std::env::var("NOTES_DIR").ok())
			.unwrap_or_else(|| DEFAULT_NOTES_DIR.to_string());
		std::fs::create_dir_all(&notes_dir)?;
		Ok(Self { bind: bind.parse()?, notes_root: PathBuf::from(notes_dir).canonicalize()? })
	}
}
