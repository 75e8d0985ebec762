use anyhow::Context;
use clap::Parser;
use questboard_engine::Engine;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::AppState;

/// Store service settings. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "questboard-server", version, about = "Questboard store service")]
pub struct ServerConfig {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding `db.json`.
    #[arg(long, env = "QUESTBOARD_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Initial quest list, read only when `db.json` does not exist yet.
    #[arg(long, env = "QUESTBOARD_SEED_FILE", default_value = "quests.json")]
    pub seed_file: PathBuf,

    /// Static pages; `login.html` here is the catch-all page.
    #[arg(long, env = "QUESTBOARD_PUBLIC_DIR", default_value = ".")]
    pub public_dir: PathBuf,
}

impl ServerConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn into_state(self) -> AppState {
        AppState {
            engine: Engine::in_dir(&self.data_dir, self.seed_file),
            public_dir: self.public_dir,
        }
    }
}
