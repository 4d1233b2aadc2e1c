//! Session configuration loaded from TOML.
//!
//! # Example
//! ```
//! use gphoto2_session::SessionConfig;
//!
//! let config = SessionConfig::from_toml_str(
//!     r#"
//!     model = "Canon EOS 550D"
//!     port = "usb:001,007"
//!     event_timeout = "500ms"
//!     "#,
//! )?;
//! assert_eq!(config.event_timeout.as_millis(), 500);
//! # Ok::<(), gphoto2_session::CameraError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};
use crate::traits::ConnectTarget;

/// How a [`crate::Camera`] connects and how its event listener paces itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Camera model as reported by autodetection. Requires `port`.
    #[serde(default)]
    pub model: Option<String>,
    /// Port path such as `usb:001,007`. Requires `model`.
    #[serde(default)]
    pub port: Option<String>,
    /// Timeout of each native wait-for-event call.
    #[serde(default = "default_event_timeout", with = "humantime_serde")]
    pub event_timeout: Duration,
    /// Pause after a failed wait before the listener retries.
    #[serde(default = "default_error_backoff", with = "humantime_serde")]
    pub error_backoff: Duration,
    /// Explicit path of the libgphoto2 shared library.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
}

const fn default_event_timeout() -> Duration {
    Duration::from_secs(1)
}

const fn default_error_backoff() -> Duration {
    Duration::from_millis(100)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            port: None,
            event_timeout: default_event_timeout(),
            error_backoff: default_error_backoff(),
            library_path: None,
        }
    }
}

impl SessionConfig {
    /// Connect to `model` on `port` instead of the first detected camera.
    #[must_use]
    pub fn with_target<M: Into<String>, P: Into<String>>(mut self, model: M, port: P) -> Self {
        self.model = Some(model.into());
        self.port = Some(port.into());
        self
    }

    /// Set the per-call wait timeout.
    #[must_use]
    pub const fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    /// Set the pause after a failed wait.
    #[must_use]
    pub const fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Load libgphoto2 from `path`.
    #[must_use]
    pub fn with_library_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded session config");
        Ok(config)
    }

    /// Check field combinations that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match (&self.model, &self.port) {
            (Some(_), None) => return Err(CameraError::config("'model' requires 'port'")),
            (None, Some(_)) => return Err(CameraError::config("'port' requires 'model'")),
            (Some(model), Some(port)) if model.is_empty() || port.is_empty() => {
                return Err(CameraError::config("'model' and 'port' must not be empty"));
            }
            _ => {}
        }
        if self.event_timeout.is_zero() {
            return Err(CameraError::config("'event_timeout' must be greater than zero"));
        }
        if self
            .library_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(CameraError::config("'library_path' must not be empty"));
        }
        Ok(())
    }

    /// Where a session built from this configuration connects.
    pub fn target(&self) -> ConnectTarget<'_> {
        match (&self.model, &self.port) {
            (Some(model), Some(port)) => ConnectTarget::Explicit { model, port },
            _ => ConnectTarget::FirstDetected,
        }
    }
}
