//! Client configuration.
//!
//! Stored as JSON in `~/.config/mediavault/config.json`. The password is
//! never written to disk; it comes from `MEDIAVAULT_PASSWORD`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mediavault_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESOURCE_TIMEOUT,
    DEFAULT_TUS_PATH,
};
use mediavault_transport::{Credentials, TransportConfig, TrustPolicy};
use mediavault_upload::{OrchestratorConfig, SessionConfig, UploadStrategy};
use serde::{Deserialize, Serialize};

/// Environment variable holding the server password.
pub const PASSWORD_ENV: &str = "MEDIAVAULT_PASSWORD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Archive server root, e.g. `https://archive.example.org`.
    pub server_url: String,
    pub username: String,
    /// Accept self-signed certificates. Off unless the user opts in.
    pub trust_all_certificates: bool,
    pub upload_strategy: UploadStrategy,
    pub tus_path: String,
    pub chunk_size: usize,
    pub max_upload_size: u64,
    pub request_timeout_secs: u64,
    pub resource_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            trust_all_certificates: false,
            upload_strategy: UploadStrategy::default(),
            tus_path: DEFAULT_TUS_PATH.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            resource_timeout_secs: DEFAULT_RESOURCE_TIMEOUT.as_secs(),
        }
    }
}

impl ClientConfig {
    /// Loads from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads from `path`. A missing file gives defaults; an unreadable one
    /// is reported and replaced by defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Transport settings, with credentials when a username is configured.
    pub fn transport_config(&self, password: Option<String>) -> anyhow::Result<TransportConfig> {
        if self.server_url.trim().is_empty() {
            anyhow::bail!("no server configured; pass --server or run `mediavault config --save`");
        }
        let mut config = TransportConfig::new(self.server_url.trim())
            .with_trust(TrustPolicy::from_opt_in(self.trust_all_certificates))
            .with_timeouts(
                Duration::from_secs(self.request_timeout_secs),
                Duration::from_secs(self.resource_timeout_secs),
            );
        if !self.username.is_empty() {
            let password = password.with_context(|| format!("{PASSWORD_ENV} is not set"))?;
            config = config.with_credentials(Credentials::new(&self.username, password));
        }
        Ok(config)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            strategy: self.upload_strategy,
            session: SessionConfig {
                tus_path: self.tus_path.clone(),
                chunk_size: self.chunk_size.max(1),
            },
            max_upload_size: self.max_upload_size,
        }
    }
}

/// Reads the password from the environment.
pub fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty())
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("mediavault").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
            && !xdg.is_empty()
        {
            return Ok(PathBuf::from(xdg));
        }
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".config"))
    }
}
