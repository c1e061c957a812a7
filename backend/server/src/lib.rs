//! Documentation of a campus election voting portal backend.
//!
//! Students vote for candidates on their department's positions; administrators
//! seed elections, positions, candidates and the eligibility roll with the
//! `process` tool.
//!
//!
//!
//! # General Infrastructure
//! - User goes to the public endpoint running the reverse proxy
//! - Reverse proxy owns login and sessions, then forwards the student number
//!   in `X-Voter-Id`
//! - This server only trusts that header, it is never exposed directly
//! - SQLite file next to the server, Redis shared between server replicas
//!
//!
//!
//! # Voting
//!
//! **Goal**: one submission per student per position, no lost counter updates
//! under a burst of votes for the same candidate.
//!
//! - `POST /positions/{id}/votes`, protobuf `Choice` body with the picked ids
//! - Ledger pre-checks the ballot, locks the picked candidates, then writes the
//!   submission marker, the counters and the records in one transaction
//! - `201` with the updated counters, `409` if the student already voted
//! - Lock timeouts and database hiccups are retried a few times before the
//!   client sees `503`/`500`
//! - Every committed vote is published on the `vote.casted` channel
//!
//!
//!
//! # Results
//!
//! - `GET /positions/{id}/tally`: durable counters, most votes first
//! - `GET /candidates/{id}/votes`: cached counter, seeded from SQLite on a miss
//!
//!
//!
//! # Notes
//!
//! ## Departments
//! Every department (BSA, BSBA, BSCS, BSCTE, BSHM, ...) shares one schema; the
//! department is a column on positions and on the roll.
//!
//! ## Cache drift
//! The Redis tally is advisory. It can lag behind after a failed increment,
//! and it expires, but it is never reset to zero while SQLite has votes.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Seed the database, then start the server.
//! ```sh
//! cargo run -p process -- seed registry.json
//! RUST_LOG=info cargo run -p portal
//! ```
//!
//! Cast a sample ballot.
//! ```sh
//! cargo run -p tester -- 100
//! curl -X POST -H 'X-Voter-Id: 2021-00123' --data-binary @ballot.bin \
//!     http://localhost:1111/positions/10/votes
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod routes;
pub mod state;
pub mod user;
pub mod utils;

use routes::{candidate_votes_handler, tally_handler, votes_handler};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/positions/{position_id}/votes", post(votes_handler))
        .route("/positions/{position_id}/tally", get(tally_handler))
        .route("/candidates/{candidate_id}/votes", get(candidate_votes_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
