//! HTTP handlers on `EspHttpServer`.
//!
//! Registers every entry of the route table and adapts ESP-IDF requests to
//! the capture handler's response abstraction.

use anyhow::Result;
use camserve_core::routes::{self, Method, RouteKind, ROUTES};
use camserve_core::{chunked_headers, handle_capture, CaptureError, CaptureResponder, ResponseBody};
use esp_idf_svc::http::server::{
    Configuration, EspHttpConnection, EspHttpServer, Request, Response,
};
use esp_idf_svc::io::{EspIOError, Write};
use log::{debug, info};

use crate::camera::EspCamera;
use crate::encoder::EspJpegEncoder;

type EspRequest<'r, 'c> = Request<&'r mut EspHttpConnection<'c>>;

/// [`CaptureResponder`] over one ESP-IDF request.
pub struct EspResponder<'r, 'c>(EspRequest<'r, 'c>);

/// Open ESP-IDF response body.
pub struct EspBody<'r, 'c>(Response<&'r mut EspHttpConnection<'c>>);

impl<'r, 'c> CaptureResponder for EspResponder<'r, 'c> {
    type Error = EspIOError;
    type Body = EspBody<'r, 'c>;

    fn reject(self, status: u16) -> Result<(), EspIOError> {
        self.0.into_status_response(status)?;
        Ok(())
    }

    fn open(self, headers: &[(&str, &str)]) -> Result<EspBody<'r, 'c>, EspIOError> {
        // Every write goes out through httpd_resp_send_chunk.
        let headers = chunked_headers(headers);
        let response = self.0.into_response(200, Some("OK"), &headers)?;
        Ok(EspBody(response))
    }
}

impl ResponseBody for EspBody<'_, '_> {
    type Error = EspIOError;

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), EspIOError> {
        self.0.write_all(chunk)
    }

    fn finish(mut self) -> Result<(), EspIOError> {
        // The connection sends the terminating chunk when the handler returns.
        self.0.flush()
    }
}

fn index_handler(request: EspRequest<'_, '_>) -> Result<(), EspIOError> {
    let (content_type, body) = routes::index_page();
    let mut response = request.into_response(200, Some("OK"), &[("Content-Type", content_type)])?;
    response.write_all(body.as_bytes())
}

fn capture_handler(
    request: EspRequest<'_, '_>,
    camera: &EspCamera,
    encoder: &EspJpegEncoder,
) -> Result<(), EspIOError> {
    match handle_capture(camera, encoder, EspResponder(request)) {
        Ok(outcome) => {
            debug!(
                "Capture served: {:?}, {} bytes in {} chunk(s)",
                outcome.branch, outcome.bytes_sent, outcome.chunks
            );
            Ok(())
        }
        Err(CaptureError::Response(e)) => Err(e),
        // Status already sent and logged; the connection is done either way.
        Err(e) => {
            debug!("Capture ended early: {}", e);
            Ok(())
        }
    }
}

/// Start the HTTP server with default settings and register the routes.
///
/// The returned server must be kept alive for the routes to stay registered.
pub fn start_server(camera: EspCamera) -> Result<EspHttpServer<'static>> {
    let encoder = EspJpegEncoder;
    let mut server = EspHttpServer::new(&Configuration::default())?;

    for route in ROUTES.iter() {
        let method = match route.method {
            Method::Get => esp_idf_svc::http::Method::Get,
        };
        match route.kind {
            RouteKind::Index => {
                server.fn_handler(route.path, method, index_handler)?;
            }
            RouteKind::Capture => {
                server.fn_handler(route.path, method, move |request| {
                    capture_handler(request, &camera, &encoder)
                })?;
            }
        }
        debug!("Registered route {:?} {}", route.method, route.path);
    }

    info!("HTTP server started");
    Ok(server)
}
