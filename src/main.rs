use std::net::SocketAddr;
use std::path::Path;

use tracing_subscriber::EnvFilter;

use livepaste::config::Config;
use livepaste::http::AppState;
use livepaste::{db, http, sweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        database_url = %config.database_url,
        port = config.port,
        retention_hours = config.retention_hours,
        "starting livepaste"
    );

    let conn = db::open(Path::new(&config.database_url))?;
    let state = AppState::new(conn, config.clone());

    sweep::spawn_retention_sweep(state.conn.clone(), config.retention_hours);
    sweep::spawn_session_sweep(state.sessions.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, http::router(state)).await?;
    Ok(())
}
