//! Bridges the blocking capture handler to an async HTTP response.
//!
//! The capture runs on tokio's blocking pool. It reports the response head
//! through a oneshot channel and streams body chunks through a bounded mpsc
//! channel; the async side turns those into an axum [`Response`]. A response
//! without `Content-Length` goes out chunked. The stream ends once every body
//! sender is gone, including the [`StreamGuard`] the capture task holds until
//! the handler has returned its frame buffer.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use camserve_core::{CaptureResponder, ResponseBody};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Body chunks buffered between the encoder and the connection.
pub const BODY_CHANNEL_DEPTH: usize = 4;

/// Errors writing a capture response through the channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Request dropped before the response head was sent")]
    HeadDropped,

    #[error("Client disconnected mid-body")]
    BodyClosed,

    #[error("Invalid response header {0}")]
    InvalidHeader(String),

    #[error("Invalid status code {0}")]
    InvalidStatus(u16),
}

/// Status and headers chosen by the capture handler.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `false` for bodiless error responses.
    pub has_body: bool,
}

impl ResponseHead {
    /// Build the response, streaming the body from `body_rx`.
    pub fn into_response(self, body_rx: mpsc::Receiver<Bytes>) -> Response {
        let body = if self.has_body {
            let stream = futures::stream::unfold(body_rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
            });
            Body::from_stream(stream)
        } else {
            Body::empty()
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Create a responder and the receiving ends the async handler awaits.
pub fn channel() -> (
    ChannelResponder,
    oneshot::Receiver<ResponseHead>,
    mpsc::Receiver<Bytes>,
) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
    (
        ChannelResponder {
            head: head_tx,
            body: body_tx,
        },
        head_rx,
        body_rx,
    )
}

/// [`CaptureResponder`] writing into the channels from [`channel`].
pub struct ChannelResponder {
    head: oneshot::Sender<ResponseHead>,
    body: mpsc::Sender<Bytes>,
}

impl ChannelResponder {
    /// Keep the body stream open until the returned guard is dropped, even
    /// after [`ChannelBody::finish`].
    pub fn stream_guard(&self) -> StreamGuard {
        StreamGuard(self.body.clone())
    }
}

/// Holds the body stream open. The client sees the end of the body only
/// after this is dropped.
#[derive(Debug)]
pub struct StreamGuard(mpsc::Sender<Bytes>);

impl CaptureResponder for ChannelResponder {
    type Error = ChannelError;
    type Body = ChannelBody;

    fn reject(self, status: u16) -> Result<(), ChannelError> {
        let status = StatusCode::from_u16(status).map_err(|_| ChannelError::InvalidStatus(status))?;
        self.head
            .send(ResponseHead {
                status,
                headers: HeaderMap::new(),
                has_body: false,
            })
            .map_err(|_| ChannelError::HeadDropped)
    }

    fn open(self, headers: &[(&str, &str)]) -> Result<ChannelBody, ChannelError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ChannelError::InvalidHeader(name.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| ChannelError::InvalidHeader(value.to_string()))?;
            map.insert(name, value);
        }

        self.head
            .send(ResponseHead {
                status: StatusCode::OK,
                headers: map,
                has_body: true,
            })
            .map_err(|_| ChannelError::HeadDropped)?;

        Ok(ChannelBody { tx: self.body })
    }
}

/// Open response body. Must only be used from a blocking thread.
pub struct ChannelBody {
    tx: mpsc::Sender<Bytes>,
}

impl ResponseBody for ChannelBody {
    type Error = ChannelError;

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .blocking_send(Bytes::copy_from_slice(chunk))
            .map_err(|_| ChannelError::BodyClosed)
    }

    fn finish(self) -> Result<(), ChannelError> {
        // The stream closes when the last sender, usually the StreamGuard,
        // is dropped.
        drop(self.tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn test_reject_sends_bodiless_head() {
        let (responder, mut head_rx, _body_rx) = channel();

        responder.reject(500).unwrap();

        let head = head_rx.try_recv().unwrap();
        assert_eq!(head.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!head.has_body);
        assert!(head.headers.is_empty());
    }

    #[test]
    fn test_open_then_stream_chunks() {
        let (responder, mut head_rx, mut body_rx) = channel();

        let mut body = responder
            .open(&[("Content-Type", "image/jpeg"), ("Content-Length", "3")])
            .unwrap();
        body.write_chunk(&[1, 2, 3]).unwrap();
        body.finish().unwrap();

        let head = head_rx.try_recv().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers["content-type"], "image/jpeg");
        assert_eq!(head.headers["content-length"], "3");
        assert_eq!(body_rx.try_recv().unwrap(), Bytes::from_static(&[1, 2, 3]));
        assert!(body_rx.try_recv().is_err());
    }

    #[test]
    fn test_write_after_client_left_fails() {
        let (responder, _head_rx, body_rx) = channel();
        let mut body = responder.open(&[]).unwrap();
        drop(body_rx);

        assert!(matches!(
            body.write_chunk(&[0]),
            Err(ChannelError::BodyClosed)
        ));
    }

    #[test]
    fn test_guard_holds_stream_open_after_finish() {
        let (responder, _head_rx, mut body_rx) = channel();
        let guard = responder.stream_guard();

        let mut body = responder.open(&[]).unwrap();
        body.write_chunk(&[7]).unwrap();
        body.finish().unwrap();

        assert_eq!(body_rx.try_recv().unwrap(), Bytes::from_static(&[7]));
        assert!(matches!(body_rx.try_recv(), Err(TryRecvError::Empty)));

        drop(guard);
        assert!(matches!(
            body_rx.try_recv(),
            Err(TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_open_after_request_dropped_fails() {
        let (responder, head_rx, _body_rx) = channel();
        drop(head_rx);

        assert!(matches!(responder.open(&[]), Err(ChannelError::HeadDropped)));
    }
}
