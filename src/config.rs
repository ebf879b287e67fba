use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub unix_socket: Option<PathBuf>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "S3-compatible endpoint backed by a local directory")]
pub struct Args {
    /// Host to bind to (overrides S3_LOCALFS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides S3_LOCALFS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory for buckets and objects (overrides S3_LOCALFS_ROOT)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Listen on a Unix domain socket instead of TCP (overrides S3_LOCALFS_UNIX_SOCKET)
    #[arg(long)]
    pub unix_socket: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("S3_LOCALFS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let env_port = match env::var("S3_LOCALFS_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing S3_LOCALFS_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 1234,
            Err(err) => return Err(err).context("reading S3_LOCALFS_PORT"),
        };
        let env_root = env::var_os("S3_LOCALFS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/s3-localfs"));
        let env_socket = env::var_os("S3_LOCALFS_UNIX_SOCKET").map(PathBuf::from);

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            root: args.root.unwrap_or(env_root),
            unix_socket: args.unix_socket.or(env_socket),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
