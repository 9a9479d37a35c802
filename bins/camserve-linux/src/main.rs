//! Camera snapshot server for Linux.
//!
//! Runs the same startup sequence and routes as the board firmware against
//! the simulated camera, so the pages can be exercised from a browser or curl.

mod settings;

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use camserve_core::{bring_up, AccessPointConfig, CameraConfig, Platform};
use camserve_server::{create_router, CaptureState};
use camserve_sim::{SimCamera, SoftwareJpegEncoder};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

/// Host stand-in for the board services.
struct HostPlatform {
    settings: Settings,
}

/// A bound listener with its routes, ready to serve.
struct HostServer {
    listener: TcpListener,
    router: Router,
}

impl Platform for HostPlatform {
    type Storage = ();
    type Network = AccessPointConfig;
    type Camera = SimCamera;
    type Server = HostServer;
    type Error = anyhow::Error;

    fn init_storage(&mut self) -> anyhow::Result<()> {
        tracing::debug!("No persistent storage on the host");
        Ok(())
    }

    fn start_access_point(
        &mut self,
        _storage: &(),
        config: &AccessPointConfig,
    ) -> anyhow::Result<AccessPointConfig> {
        tracing::info!(
            "Simulating access point '{}' (channel {}, max {} client(s))",
            config.ssid,
            config.channel,
            config.max_connections
        );
        Ok(config.clone())
    }

    fn init_camera(&mut self, config: &CameraConfig) -> anyhow::Result<SimCamera> {
        let camera = SimCamera::with_acquire_timeout(config, self.settings.acquire_timeout())?;
        tracing::debug!("Simulated frame buffer: {} bytes", camera.frame_len());
        Ok(camera)
    }

    fn start_server(&mut self, camera: &SimCamera) -> anyhow::Result<HostServer> {
        let listener = std::net::TcpListener::bind(self.settings.bind)
            .with_context(|| format!("Failed to bind {}", self.settings.bind))?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;

        let state = CaptureState::new(camera.clone(), SoftwareJpegEncoder::new());
        Ok(HostServer {
            listener,
            router: create_router(state),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,camserve=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("camserve starting...");

    let settings = Settings::load()?;
    let camera_config = settings.camera_config();
    let ap_config = AccessPointConfig::default();

    let mut platform = HostPlatform { settings };
    let running = bring_up(&mut platform, &ap_config, &camera_config)?;

    let addr: SocketAddr = running.server.listener.local_addr()?;
    tracing::info!("Camera ready! Connect to SSID '{}'", ap_config.ssid);
    tracing::info!("   Index:   http://{}/", addr);
    tracing::info!("   Capture: http://{}/capture", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down...");
    };

    let HostServer { listener, router } = running.server;
    camserve_server::serve(listener, router, shutdown).await?;

    let stats = running.camera.stats();
    tracing::info!(
        "Shutdown complete ({} frame(s) served)",
        stats.frames_served
    );
    Ok(())
}
