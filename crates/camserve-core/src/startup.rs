//! Startup sequencing.
//!
//! Bring-up is linear and stops at the first failure:
//! storage -> access point -> camera -> HTTP server.
//! Stages that already succeeded are left running; nothing is torn down.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::config::CameraConfig;
use crate::network::AccessPointConfig;

/// How often the idle main loop wakes up.
pub const IDLE_PERIOD: Duration = Duration::from_secs(1);

/// Boxed error carried by [`StartupError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A startup stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Storage,
    AccessPoint,
    Camera,
    HttpServer,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupStage::Storage => "Storage",
            StartupStage::AccessPoint => "Access point",
            StartupStage::Camera => "Camera",
            StartupStage::HttpServer => "HTTP server",
        };
        f.write_str(name)
    }
}

/// The stage that failed and why.
#[derive(Debug, Error)]
#[error("{stage} initialization failed: {source}")]
pub struct StartupError {
    pub stage: StartupStage,
    #[source]
    pub source: BoxError,
}

impl StartupError {
    pub fn new(stage: StartupStage, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Platform services brought up at boot.
///
/// Each method performs one stage. Handles it returns must stay alive for the
/// service to keep running.
pub trait Platform {
    type Storage;
    type Network;
    type Camera;
    type Server;
    type Error: Into<BoxError>;

    /// Initialize persistent key-value storage.
    fn init_storage(&mut self) -> Result<Self::Storage, Self::Error>;

    /// Configure and start the access point.
    fn start_access_point(
        &mut self,
        storage: &Self::Storage,
        config: &AccessPointConfig,
    ) -> Result<Self::Network, Self::Error>;

    /// Apply `config` to the camera driver.
    fn init_camera(&mut self, config: &CameraConfig) -> Result<Self::Camera, Self::Error>;

    /// Start the HTTP server and register the routes.
    fn start_server(&mut self, camera: &Self::Camera) -> Result<Self::Server, Self::Error>;
}

/// Everything [`bring_up`] started. Dropping it stops the services.
pub struct Running<P: Platform> {
    pub storage: P::Storage,
    pub network: P::Network,
    pub camera: P::Camera,
    pub server: P::Server,
}

/// Run every startup stage in order, short-circuiting on the first failure.
pub fn bring_up<P: Platform>(
    platform: &mut P,
    ap: &AccessPointConfig,
    camera: &CameraConfig,
) -> Result<Running<P>, StartupError> {
    let storage = platform
        .init_storage()
        .map_err(|e| StartupError::new(StartupStage::Storage, e))?;

    ap.validate()
        .map_err(|e| StartupError::new(StartupStage::AccessPoint, e))?;
    let network = platform
        .start_access_point(&storage, ap)
        .map_err(|e| StartupError::new(StartupStage::AccessPoint, e))?;
    info!("Access point '{}' up", ap.ssid);

    camera
        .validate()
        .map_err(|e| StartupError::new(StartupStage::Camera, e))?;
    let camera_handle = platform
        .init_camera(camera)
        .map_err(|e| StartupError::new(StartupStage::Camera, e))?;
    info!(
        "Camera ready: {} {}x{} on {}",
        camera.pixel_format,
        camera.frame_size.dimensions().0,
        camera.frame_size.dimensions().1,
        camera.board
    );

    let server = platform
        .start_server(&camera_handle)
        .map_err(|e| StartupError::new(StartupStage::HttpServer, e))?;

    Ok(Running {
        storage,
        network,
        camera: camera_handle,
        server,
    })
}

/// Initialize storage, erasing it and trying once more if the first attempt
/// fails (corrupt or outdated partition).
pub fn init_with_erase_retry<T, E, I, X>(mut init: I, erase: X) -> Result<T, E>
where
    I: FnMut() -> Result<T, E>,
    X: FnOnce() -> Result<(), E>,
    E: fmt::Display,
{
    match init() {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Storage init failed ({}), erasing and retrying", e);
            erase()?;
            init()
        }
    }
}

/// Park the calling thread forever, waking every [`IDLE_PERIOD`].
pub fn idle_forever() -> ! {
    loop {
        std::thread::sleep(IDLE_PERIOD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakePlatform {
        calls: Vec<&'static str>,
        fail_at: Option<StartupStage>,
    }

    impl FakePlatform {
        fn step(&mut self, name: &'static str, stage: StartupStage) -> Result<(), String> {
            self.calls.push(name);
            if self.fail_at == Some(stage) {
                Err(format!("{} exploded", name))
            } else {
                Ok(())
            }
        }
    }

    impl Platform for FakePlatform {
        type Storage = ();
        type Network = ();
        type Camera = ();
        type Server = ();
        type Error = String;

        fn init_storage(&mut self) -> Result<(), String> {
            self.step("storage", StartupStage::Storage)
        }

        fn start_access_point(&mut self, _: &(), _: &AccessPointConfig) -> Result<(), String> {
            self.step("ap", StartupStage::AccessPoint)
        }

        fn init_camera(&mut self, _: &CameraConfig) -> Result<(), String> {
            self.step("camera", StartupStage::Camera)
        }

        fn start_server(&mut self, _: &()) -> Result<(), String> {
            self.step("server", StartupStage::HttpServer)
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut platform = FakePlatform::default();

        let running = bring_up(
            &mut platform,
            &AccessPointConfig::default(),
            &CameraConfig::default(),
        );

        assert!(running.is_ok());
        assert_eq!(platform.calls, vec!["storage", "ap", "camera", "server"]);
    }

    #[test]
    fn test_camera_failure_skips_server() {
        let mut platform = FakePlatform {
            fail_at: Some(StartupStage::Camera),
            ..Default::default()
        };

        let err = bring_up(
            &mut platform,
            &AccessPointConfig::default(),
            &CameraConfig::default(),
        )
        .err()
        .unwrap();

        assert_eq!(err.stage, StartupStage::Camera);
        assert_eq!(err.to_string(), "Camera initialization failed: camera exploded");
        assert_eq!(platform.calls, vec!["storage", "ap", "camera"]);
    }

    #[test]
    fn test_invalid_camera_config_never_reaches_driver() {
        let mut platform = FakePlatform::default();
        let camera = CameraConfig::default().with_fb_count(0);

        let err = bring_up(&mut platform, &AccessPointConfig::default(), &camera)
            .err()
            .unwrap();

        assert_eq!(err.stage, StartupStage::Camera);
        assert!(err.source.downcast_ref::<ConfigError>().is_some());
        assert_eq!(platform.calls, vec!["storage", "ap"]);
    }

    #[test]
    fn test_erase_retry_runs_once() {
        let attempts = Cell::new(0);
        let erased = Cell::new(false);

        let result: Result<u8, String> = init_with_erase_retry(
            || {
                attempts.set(attempts.get() + 1);
                if erased.get() {
                    Ok(7)
                } else {
                    Err("no free pages".to_string())
                }
            },
            || {
                erased.set(true);
                Ok(())
            },
        );

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_erase_retry_gives_up_after_second_failure() {
        let attempts = Cell::new(0);

        let result: Result<(), String> = init_with_erase_retry(
            || {
                attempts.set(attempts.get() + 1);
                Err("flash broken".to_string())
            },
            || Ok(()),
        );

        assert_eq!(result, Err("flash broken".to_string()));
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_healthy_storage_is_not_erased() {
        let result: Result<(), String> =
            init_with_erase_retry(|| Ok(()), || Err("must not erase".to_string()));
        assert!(result.is_ok());
    }
}
