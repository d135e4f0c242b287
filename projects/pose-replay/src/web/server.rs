use crate::session::Session;
use crate::web::api::{self, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/videos", get(api::get_videos))
        .route("/api/session", get(api::get_session))
        .route("/api/session/upload", post(api::upload_handler))
        .route("/api/session/progress", get(api::get_progress))
        .route("/api/session/events", get(api::session_events))
        .route("/api/session/play", post(api::play_handler))
        .route("/api/session/pause", post(api::pause_handler))
        .route("/api/session/seek", post(api::seek_handler))
        .route("/api/session/overlay", get(api::get_overlay))
        .route("/api/session/scrub", get(api::get_scrub))
        .route("/api/session/frames/:index/image", get(api::get_frame_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(host: IpAddr, port: u16, video_root: PathBuf, session: Session) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires a non-blocking socket
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("No available ports found"))?;
            }
        }
    };

    info!("Serving videos from {}", video_root.display());
    let state = Arc::new(AppState {
        session: session.clone(),
        video_root,
    });
    let app = router(state);

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Pose Replay server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.end();
    info!("Session ended");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
