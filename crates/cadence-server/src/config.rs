use std::path::PathBuf;

use clap::Parser;

/// Command line surface; every flag falls back to its environment variable.
#[derive(Parser, Debug, Default)]
#[command(name = "cadence")]
#[command(about = "Coordination server for AI-assisted coding sessions")]
pub struct Cli {
    /// Bus bind host (MAIN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Bus bind port (MAIN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Health endpoint port (HEALTH_PORT; default bus port + 1)
    #[arg(long)]
    pub health_port: Option<u16>,

    /// SQLite file path (DB_PATH)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Data directory for the store and generated docs (DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Shared bus secret (AUTH_TOKEN)
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Workspace the reality checker scans (WORKSPACE_ROOT; default cwd)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub health_port: u16,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub auth_token: String,
    pub workspace_root: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Flags win over environment; environment wins over defaults.
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let host = cli
            .host
            .or_else(|| env_var("MAIN_HOST"))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match cli.port {
            Some(port) => port,
            None => match env_var("MAIN_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("MAIN_PORT is not a valid port: {raw}"))?,
                None => 8180,
            },
        };
        let health_port = match cli.health_port {
            Some(p) => p,
            None => match env_var("HEALTH_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("HEALTH_PORT is not a valid port: {raw}"))?,
                None => port + 1,
            },
        };

        let data_dir = cli
            .data_dir
            .or_else(|| env_var("DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".cadence"));
        let db_path = cli
            .db_path
            .or_else(|| env_var("DB_PATH").map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join("cadence.db"));

        let auth_token = cli
            .auth_token
            .or_else(|| env_var("AUTH_TOKEN"))
            .ok_or_else(|| anyhow::anyhow!("AUTH_TOKEN is required (flag or environment)"))?;

        let workspace_root = cli
            .workspace_root
            .or_else(|| env_var("WORKSPACE_ROOT").map(PathBuf::from))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        Ok(Self {
            host,
            port,
            health_port,
            db_path,
            data_dir,
            auth_token,
            workspace_root,
            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: env_var("LOG_FILE").map(PathBuf::from),
        })
    }
}
