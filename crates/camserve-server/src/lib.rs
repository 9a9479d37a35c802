//! # camserve-server
//!
//! Snapshot HTTP server for host targets, built on Axum.
//!
//! Serves the camserve route table:
//! - `GET /` - landing page
//! - `GET /capture` - one JPEG snapshot from the camera driver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use camserve_server::{create_router, CaptureState};
//!
//! let state = CaptureState::new(camera, encoder);
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! camserve_server::serve(listener, create_router(state), shutdown).await?;
//! ```

pub mod responder;
pub mod router;

pub use router::{create_router, CaptureState};

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

/// Serve `router` on an already-bound listener until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, router: Router, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
