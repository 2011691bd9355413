//! Creation parameters for network adapters.

use std::fs;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::*;
use crate::options::{OptionSet, OptionValue};

/// Host, port and initial options of a network endpoint.
///
/// ```
/// let config = xio::EndpointConfig::from_json(
///     r#"{ "hostname": "example.org", "port": 8883, "options": [["TrustedCerts", "PEM"]] }"#,
/// )
/// .unwrap();
/// assert_eq!(config.port, 8883);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub hostname: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "OptionSet::is_empty")]
    pub options: OptionSet,
}

impl EndpointConfig {
    pub fn new<S: Into<String>>(hostname: S, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            options: OptionSet::new(),
        }
    }

    pub fn with_option<S: Into<String>, V: Into<OptionValue>>(mut self, name: S, value: V) -> Self {
        self.options.push(name, value);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EndpointConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(Error::InvalidParameter("hostname".into()));
        }
        Ok(())
    }
}
