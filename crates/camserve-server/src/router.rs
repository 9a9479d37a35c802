//! Axum router serving the static route table.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{extract::State, Router};
use camserve_core::routes::{self, Method, RouteKind, ROUTES};
use camserve_core::{handle_capture, CameraDriver, CaptureError, JpegEncoder};
use tracing::{debug, error};

use crate::responder;

/// Shared state for the capture route.
pub struct CaptureState<D, E> {
    pub camera: Arc<D>,
    pub encoder: Arc<E>,
}

impl<D, E> CaptureState<D, E> {
    pub fn new(camera: D, encoder: E) -> Self {
        Self {
            camera: Arc::new(camera),
            encoder: Arc::new(encoder),
        }
    }
}

impl<D, E> Clone for CaptureState<D, E> {
    fn clone(&self) -> Self {
        Self {
            camera: self.camera.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

/// Build the router with every entry of [`ROUTES`].
pub fn create_router<D, E>(state: CaptureState<D, E>) -> Router
where
    D: CameraDriver + Send + Sync + 'static,
    E: JpegEncoder<D::Frame> + Send + Sync + 'static,
{
    let mut router = Router::new();
    for route in ROUTES.iter() {
        let handler: MethodRouter<CaptureState<D, E>> = match (route.method, route.kind) {
            (Method::Get, RouteKind::Index) => get(index_handler),
            (Method::Get, RouteKind::Capture) => get(capture_handler::<D, E>),
        };
        debug!("Registered route {:?} {}", route.method, route.path);
        router = router.route(route.path, handler);
    }
    router.with_state(state)
}

/// `GET /`
async fn index_handler() -> impl IntoResponse {
    let (content_type, body) = routes::index_page();
    ([(header::CONTENT_TYPE, content_type)], body)
}

/// `GET /capture`
async fn capture_handler<D, E>(State(state): State<CaptureState<D, E>>) -> Response
where
    D: CameraDriver + Send + Sync + 'static,
    E: JpegEncoder<D::Frame> + Send + Sync + 'static,
{
    let (responder, head_rx, body_rx) = responder::channel();

    tokio::task::spawn_blocking(move || {
        // The body ends only after the handler has returned the frame buffer.
        let _stream = responder.stream_guard();
        match handle_capture(&*state.camera, &*state.encoder, responder) {
            Ok(outcome) => debug!(
                "Capture served: {:?}, {} bytes in {} chunk(s)",
                outcome.branch, outcome.bytes_sent, outcome.chunks
            ),
            Err(CaptureError::NoFrame) => debug!("Capture rejected: no frame buffer"),
            Err(e) => debug!("Capture ended early: {}", e),
        }
    });

    match head_rx.await {
        Ok(head) => head.into_response(body_rx),
        Err(_) => {
            error!("Capture task ended without sending a response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
