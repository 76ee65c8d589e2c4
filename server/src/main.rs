#![allow(dead_code)]

mod config;
mod db;
mod envelope;
mod net;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::timelapse::TimelapseRenderer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();

    let boards = services::storage::BoardStore::new(config.data_dir.clone());
    boards.init().await.expect("board storage init failed");

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("database init failed");

    // The video encoder is an external collaborator; without one the
    // timelapse endpoints answer 503 and everything else runs normally.
    let renderer: Option<Arc<dyn TimelapseRenderer>> = None;
    if renderer.is_none() {
        tracing::warn!("timelapse renderer not configured — video generation disabled");
    }

    let state = state::AppState::new(pool, config, boards, renderer);

    // Hourly sweep of finished timelapse jobs older than a day.
    let jobs = state.jobs.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            jobs.prune_finished(24 * 3600 * 1000);
        }
    });

    // Control plane on its own port.
    let api = routes::app(state.clone());
    let api_listener = tokio::net::TcpListener::bind(("0.0.0.0", state.config.http_port))
        .await
        .expect("failed to bind http port");
    tracing::info!(port = state.config.http_port, "control plane listening");
    tokio::spawn(async move {
        axum::serve(api_listener, api).await.expect("http server failed");
    });

    // Session layer on the main port; blocks forever.
    net::listener::run(state).await.expect("session listener failed");
}
