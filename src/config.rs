//! Gateway and connection configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GuacError, Result};

/// Parameters for one guacd session.
///
/// The parameter map is keyed by the names guacd advertises in its `args`
/// instruction; values for names the map lacks are sent as empty strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Remote desktop protocol to ask guacd for ("rdp", "vnc", "ssh", ...).
    pub protocol: String,
    /// Existing connection id to join instead of starting a new session.
    pub connection_id: Option<String>,
    /// Protocol parameters (hostname, port, credentials, ...).
    pub parameters: HashMap<String, String>,
    pub optimal_screen_width: u32,
    pub optimal_screen_height: u32,
    pub optimal_resolution: u32,
    pub audio_mimetypes: Vec<String>,
    pub video_mimetypes: Vec<String>,
    pub image_mimetypes: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: String::new(),
            connection_id: None,
            parameters: HashMap::new(),
            optimal_screen_width: 1024,
            optimal_screen_height: 768,
            optimal_resolution: 96,
            audio_mimetypes: Vec::new(),
            video_mimetypes: Vec::new(),
            image_mimetypes: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    /// Build a connection config from an HTTP request query string.
    ///
    /// Recognized keys: `protocol` (or `scheme`), `id` (join an existing
    /// connection), `width`, `height`, `dpi`, and the repeatable `audio`,
    /// `video`, `image` mimetype lists. Every other key lands in the
    /// parameter map.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut config = Self::default();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(key)?;
            let value = decode(value)?;
            match key.as_str() {
                "protocol" | "scheme" => config.protocol = value,
                "id" => config.connection_id = Some(value),
                "width" => config.optimal_screen_width = parse_dimension(&key, &value)?,
                "height" => config.optimal_screen_height = parse_dimension(&key, &value)?,
                "dpi" => config.optimal_resolution = parse_dimension(&key, &value)?,
                "audio" => config.audio_mimetypes.push(value),
                "video" => config.video_mimetypes.push(value),
                "image" => config.image_mimetypes.push(value),
                _ => {
                    config.parameters.insert(key, value);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.is_empty() && self.connection_id.is_none() {
            return Err(GuacError::Config(
                "either a protocol or a connection id to join is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn decode(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|err| GuacError::Config(format!("invalid percent-encoding in '{raw}': {err}")))
}

fn parse_dimension(key: &str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| {
        GuacError::Config(format!("'{key}' must be a positive integer, got '{value}'"))
    })
}

/// Configuration of the gateway process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// host:port of the guacd daemon sessions are relayed to.
    pub guacd_address: String,
    /// Socket timeout applied to every guacd read and write, in seconds.
    pub socket_timeout_secs: u64,
    /// Parameters merged into every connection unless the request already
    /// set them (e.g. a fixed hostname the gateway fronts).
    pub parameters: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 4567,
            guacd_address: "127.0.0.1:4822".to_string(),
            socket_timeout_secs: 15,
            parameters: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.guacd_address.is_empty() {
            return Err(GuacError::Config("guacd_address must not be empty".to_string()));
        }
        if self.socket_timeout_secs == 0 {
            return Err(GuacError::Config(
                "socket_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge gateway-level preset parameters into a request-supplied
    /// connection config. Request values win.
    pub fn apply_presets(&self, config: &mut ConnectionConfig) {
        for (key, value) in &self.parameters {
            config
                .parameters
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Load configuration from a YAML file.
///
/// Also applies GUAC_GATEWAY_* env var overrides after loading.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// Also applies GUAC_GATEWAY_* env var overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<GatewayConfig> {
    let mut config: GatewayConfig = serde_yaml::from_str(yaml)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Apply GUAC_GATEWAY_* environment variable overrides to a config.
///
/// Supported env vars:
/// - `GUAC_GATEWAY_LISTEN_ADDRESS` - Override listen address
/// - `GUAC_GATEWAY_LISTEN_PORT` - Override listen port
/// - `GUAC_GATEWAY_GUACD_ADDRESS` - Override the guacd address
/// - `GUAC_GATEWAY_SOCKET_TIMEOUT_SECS` - Override the socket timeout
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(val) = std::env::var("GUAC_GATEWAY_LISTEN_ADDRESS") {
        debug!("overriding listen_address from GUAC_GATEWAY_LISTEN_ADDRESS");
        config.listen_address = val;
    }
    if let Ok(val) = std::env::var("GUAC_GATEWAY_LISTEN_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            debug!("overriding listen_port from GUAC_GATEWAY_LISTEN_PORT");
            config.listen_port = port;
        }
    }
    if let Ok(val) = std::env::var("GUAC_GATEWAY_GUACD_ADDRESS") {
        debug!("overriding guacd_address from GUAC_GATEWAY_GUACD_ADDRESS");
        config.guacd_address = val;
    }
    if let Ok(val) = std::env::var("GUAC_GATEWAY_SOCKET_TIMEOUT_SECS") {
        if let Ok(secs) = val.parse::<u64>() {
            debug!("overriding socket_timeout_secs from GUAC_GATEWAY_SOCKET_TIMEOUT_SECS");
            config.socket_timeout_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_basic() {
        let config = ConnectionConfig::from_query(
            "protocol=vnc&hostname=desktop.example.com&port=5901&width=1920&height=1080",
        )
        .unwrap();

        assert_eq!(config.protocol, "vnc");
        assert_eq!(config.optimal_screen_width, 1920);
        assert_eq!(config.optimal_screen_height, 1080);
        assert_eq!(config.optimal_resolution, 96);
        assert_eq!(
            config.parameters.get("hostname").map(String::as_str),
            Some("desktop.example.com")
        );
        assert_eq!(config.parameters.get("port").map(String::as_str), Some("5901"));
    }

    #[test]
    fn test_from_query_percent_decoding_and_mimetypes() {
        let config = ConnectionConfig::from_query(
            "protocol=rdp&username=ad%5Cuser&audio=audio%2FL16&audio=audio%2FL8",
        )
        .unwrap();

        assert_eq!(
            config.parameters.get("username").map(String::as_str),
            Some("ad\\user")
        );
        assert_eq!(config.audio_mimetypes, vec!["audio/L16", "audio/L8"]);
    }

    #[test]
    fn test_from_query_join_by_id() {
        let config = ConnectionConfig::from_query("id=%24abc123").unwrap();
        assert_eq!(config.connection_id.as_deref(), Some("$abc123"));
        assert!(config.protocol.is_empty());
    }

    #[test]
    fn test_from_query_requires_protocol_or_id() {
        assert!(ConnectionConfig::from_query("width=800").is_err());
    }

    #[test]
    fn test_from_query_rejects_bad_dimension() {
        assert!(ConnectionConfig::from_query("protocol=vnc&width=wide").is_err());
    }

    #[test]
    fn test_load_config_from_str() {
        let yaml = r#"
listen_address: 0.0.0.0
listen_port: 8080
guacd_address: guacd.internal:4822
socket_timeout_secs: 30
parameters:
  hostname: desktop.internal
"#;
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.listen_address, "0.0.0.0");
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.guacd_address, "guacd.internal:4822");
        assert_eq!(config.socket_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_config_rejects_zero_timeout() {
        assert!(load_config_from_str("socket_timeout_secs: 0").is_err());
    }

    #[test]
    fn test_apply_presets_request_wins() {
        let mut gateway = GatewayConfig::default();
        gateway
            .parameters
            .insert("hostname".to_string(), "preset.internal".to_string());
        gateway
            .parameters
            .insert("port".to_string(), "5900".to_string());

        let mut connection = ConnectionConfig::from_query("protocol=vnc&hostname=other").unwrap();
        gateway.apply_presets(&mut connection);

        assert_eq!(
            connection.parameters.get("hostname").map(String::as_str),
            Some("other")
        );
        assert_eq!(connection.parameters.get("port").map(String::as_str), Some("5900"));
    }
}
