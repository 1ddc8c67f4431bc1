//! Server configuration

use fileplay_lib::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ServerError};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// RTP output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    /// Local address the sending socket binds to
    pub bind: String,

    /// Largest RTP payload; bigger NAL units are fragmented (FU-A)
    pub mtu: usize,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:0".to_string(),
            mtu: 1200,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level, overridden by RUST_LOG
    pub log_level: String,

    pub log_format: LogFormat,

    pub engine: EngineConfig,

    pub rtp: RtpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            engine: EngineConfig::default(),
            rtp: RtpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig =
            toml::from_str(&content).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists; `None` means the defaults apply.
    pub fn load(path: &str) -> Result<Option<Self>> {
        if !Path::new(path).exists() {
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        // Two bytes of FU-A framing plus at least one payload byte
        if self.rtp.mtu < 3 {
            return Err(ServerError::Config(format!(
                "rtp.mtu {} is too small",
                self.rtp.mtu
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileplay_lib::NarrowbandCodec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.rtp.mtu, 1200);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.engine.video.payload_type, 96);
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
port = 5060
log_format = "json"

[engine]
poll_interval_ms = 10

[engine.audio]
codec = "pcmu"

[rtp]
mtu = 1400
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 5060);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.engine.poll_interval_ms, 10);
        assert_eq!(config.engine.catchup_tolerance_ms, 200);
        assert_eq!(config.engine.audio.codec, NarrowbandCodec::Pcmu);
        assert_eq!(config.engine.audio.frame_ms, 20);
        assert_eq!(config.rtp.mtu, 1400);
        assert_eq!(config.rtp.bind, "0.0.0.0:0");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[engine.video]\npayload_type = 8\n").unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert!(ServerConfig::from_file(&path).is_err());
        assert!(ServerConfig::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        assert!(ServerConfig::load("/nonexistent/fileplay.toml")
            .unwrap()
            .is_none());
    }
}
