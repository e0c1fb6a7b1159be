//! Host configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Netplay host configuration
///
/// Stored as JSON. A missing or empty file yields the defaults.
///
/// # Example
/// ```rust,no_run
/// use netplay_host::NetplayConfig;
///
/// let mut config = NetplayConfig::load("netplay.json").expect("Failed to load");
/// config.tcp_port = 45000;
/// config.save("netplay.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetplayConfig {
    /// Address the synchronization servers bind to
    pub bind_address: IpAddr,
    /// TCP control server port (0 lets the OS choose)
    pub tcp_port: u16,
    /// Number of input frames the servers buffer ahead
    pub buffer_target: u8,
    /// Gateway discovery timeout in milliseconds
    pub gateway_timeout_ms: u64,
    /// Raise the session worker's scheduling priority
    pub high_priority: bool,
    /// Gateway description of the room server mapping
    pub room_description: String,
    /// Gateway description of the TCP control server mapping
    pub tcp_description: String,
    /// Gateway description of the UDP data server mapping
    pub udp_description: String,
}

impl NetplayConfig {
    /// Load the configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the config file
    ///
    /// # Returns
    /// The loaded config, or the default config if the file doesn't exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.buffer_target == 0 {
            return Err(Error::Config("buffer_target must be at least 1".to_string()));
        }
        if self.gateway_timeout_ms == 0 {
            return Err(Error::Config(
                "gateway_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for NetplayConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            tcp_port: 0,
            buffer_target: 2,
            gateway_timeout_ms: 2000,
            high_priority: true,
            room_description: "Netplay Room".to_string(),
            tcp_description: "Netplay Core TCP".to_string(),
            udp_description: "Netplay Core UDP".to_string(),
        }
    }
}
