use anyhow::Result;
use axum::Router;
use boolrank_core::config::DEFAULT_INDEX_FILE;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use boolrank_server::build_app;
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index file path
    #[arg(long, env = "BOOLRANK_INDEX", default_value = DEFAULT_INDEX_FILE)]
    index: String,
    /// Collection size used for idf; defaults to the size recorded at build time
    #[arg(long)]
    total_docs: Option<u32>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let app: Router = build_app(&args.index, args.total_docs)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
