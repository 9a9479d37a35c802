//! # camserve-core
//!
//! Capture-and-serve logic for a camera board that hosts its own access point.
//!
//! This crate provides:
//! - Camera configuration and named board pin maps
//! - Access-point configuration
//! - Frame buffer, driver and streaming-encoder traits
//! - The capture and index handlers, over a response abstraction
//! - The static route table
//! - Startup sequencing
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod capture;
pub mod config;
pub mod frame;
pub mod network;
pub mod routes;
pub mod startup;

pub use capture::{
    chunked_headers, handle_capture, CaptureBranch, CaptureError, CaptureOutcome,
    CaptureResponder, ResponseBody,
};
pub use config::{
    BoardProfile, CameraConfig, ConfigError, FbLocation, FrameSize, GrabMode, PinMap,
    PixelFormat,
};
pub use frame::{CameraDriver, ChunkSink, EncodeError, Frame, FrameInfo, JpegEncoder};
pub use network::AccessPointConfig;
pub use routes::{Method, Route, RouteKind, ROUTES};
pub use startup::{bring_up, Platform, Running, StartupError, StartupStage};
