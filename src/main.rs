use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use taskhand::config::Config;
use taskhand::server::{self, AppState};

/// Natural-language task router over a fixed set of file/data operations.
#[derive(Debug, Parser)]
#[command(name = "taskhand", version, about)]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Path to config.toml (defaults to ~/.taskhand/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory the canonical task phrasings refer to.
    #[arg(long)]
    data_root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config)?;
    if let Some(data_root) = args.data_root {
        config.data_root = data_root;
    }

    if config.api_token.is_none() {
        eprintln!("[taskhand] no API token configured; running with the keyword fallback classifier only");
    }

    let state = Arc::new(AppState::new(&config)?);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    server::serve(state, addr).await;

    Ok(())
}
