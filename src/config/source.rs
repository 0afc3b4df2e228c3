//! Gateway list sources.
//!
//! The bridge is agnostic about where its gateway definitions come from;
//! callers hand it anything implementing [`GatewaySource`].

use std::fs;
use std::path::PathBuf;

use crate::bridge::protocol::GatewayConfig;
use crate::config::loader::ConfigError;
use crate::config::schema::BridgeConfig;

/// Yields the gateway definitions handed to the worker.
pub trait GatewaySource: Send + Sync {
    fn load_gateways(&self) -> Result<Vec<GatewayConfig>, ConfigError>;
}

impl GatewaySource for BridgeConfig {
    fn load_gateways(&self) -> Result<Vec<GatewayConfig>, ConfigError> {
        Ok(self.gateways.clone())
    }
}

impl GatewaySource for Vec<GatewayConfig> {
    fn load_gateways(&self) -> Result<Vec<GatewayConfig>, ConfigError> {
        Ok(self.clone())
    }
}

/// A JSON file in the worker's own format: a list of gateway objects.
#[derive(Debug, Clone)]
pub struct JsonFileGateways {
    path: PathBuf,
}

impl JsonFileGateways {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GatewaySource for JsonFileGateways {
    fn load_gateways(&self) -> Result<Vec<GatewayConfig>, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::Gateways(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_source() {
        let mut config = BridgeConfig::default();
        config.gateways.push(GatewayConfig::new("bogus", "test"));
        let gateways = config.load_gateways().unwrap();
        assert_eq!(gateways, vec![GatewayConfig::new("bogus", "test")]);
    }

    #[test]
    fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"module": "bogus", "name": "a", "params": {"login": "x"}}]"#)
            .unwrap();

        let gateways = JsonFileGateways::new(file.path()).load_gateways().unwrap();
        assert_eq!(gateways[0].name, "a");
        assert_eq!(gateways[0].params["login"], "x");
    }

    #[test]
    fn test_json_file_source_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();

        let err = JsonFileGateways::new(file.path()).load_gateways().unwrap_err();
        assert!(matches!(err, ConfigError::Gateways(_)));
    }
}
