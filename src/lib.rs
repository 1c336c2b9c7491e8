//! Packing-list backend and selection model.
//!
//! Serves a password-gated inventory catalog and a session-cookie
//! rotation protocol, and provides the session-side model the list UI
//! runs on: catalog, quantity selection, badge counters, and the
//! one-shot delivery import.
//!
//! # Layout
//! - [`catalog`], [`key`], [`selection`], [`render`], [`badge`],
//!   [`delivery`], [`context`] — the selection state machine.
//! - [`session`] — the cookie reconciliation protocol and its stores.
//! - [`routes`], [`state`], [`config`], [`error`] — the axum surface.
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod badge;
pub mod catalog;
pub mod config;
pub mod context;
pub mod csv;
pub mod delivery;
pub mod error;
pub mod key;
pub mod render;
pub mod routes;
pub mod selection;
pub mod session;
pub mod state;

use routes::{data_handler, session_issue_handler, session_verify_handler};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/data", get(data_handler))
        .route(
            "/api/session",
            get(session_verify_handler).post(session_issue_handler),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
