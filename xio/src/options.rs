//! Option names, capability flags and the TLS option store.
//!
//! An adapter advertises which options it can act on through [`OptionCaps`].
//! Composite adapters combine the capabilities of their TLS engine with the
//! capabilities of the transport beneath it, and reject anything outside
//! that set.

use bitflags::bitflags;
use serde_derive::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::*;
use crate::state::IoStateMachine;

pub const OPTION_TRUSTED_CERT: &str = "TrustedCerts";
pub const OPTION_X509_CERT: &str = "x509certificate";
pub const OPTION_X509_PRIVATE_KEY: &str = "x509privatekey";
pub const OPTION_X509_ECC_CERT: &str = "x509EccCertificate";
pub const OPTION_X509_ECC_KEY: &str = "x509EccAliasKey";
pub const OPTION_TCP_KEEPALIVE: &str = "tcp_keepalive";

bitflags! {
    /// Capability bits an adapter reports for the options it supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OptionCaps: u32 {
        /// Supports trusted-certificate injection.
        const TRUSTED_CERTS = 0x01;
        /// Supports an RSA client certificate and private key.
        const X509_RSA_CERT = 0x02;
        /// Supports an ECC client certificate and alias key.
        const X509_ECC_CERT = 0x04;
        /// Supports toggling TCP keepalive on the underlying socket.
        const TCP_KEEPALIVE = 0x08;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.into())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

/// An ordered snapshot of option values.
///
/// Used both as the initial option list of an endpoint configuration and as
/// the result of `retrieve_options`, which can be replayed onto another
/// state machine with [`OptionSet::apply_to`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct OptionSet {
    entries: Vec<(String, OptionValue)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>, V: Into<OptionValue>>(&mut self, name: S, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn with<S: Into<String>, V: Into<OptionValue>>(mut self, name: S, value: V) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay every option onto `xio`, stopping at the first rejection.
    pub fn apply_to(&self, xio: &mut IoStateMachine) -> Result<()> {
        for (name, value) in self.iter() {
            xio.set_option(name, value)?;
        }
        Ok(())
    }
}

/// Whether an option store recognised an option name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionStatus {
    Accepted,
    NotHandled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509Type {
    Rsa,
    Ecc,
}

impl X509Type {
    fn cap(self) -> OptionCaps {
        match self {
            X509Type::Rsa => OptionCaps::X509_RSA_CERT,
            X509Type::Ecc => OptionCaps::X509_ECC_CERT,
        }
    }

    fn cert_option(self) -> &'static str {
        match self {
            X509Type::Rsa => OPTION_X509_CERT,
            X509Type::Ecc => OPTION_X509_ECC_CERT,
        }
    }

    fn key_option(self) -> &'static str {
        match self {
            X509Type::Rsa => OPTION_X509_PRIVATE_KEY,
            X509Type::Ecc => OPTION_X509_ECC_KEY,
        }
    }
}

/// Options a TLS session is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsOptions {
    supported: OptionCaps,
    trusted_certs: Option<String>,
    x509_type: Option<X509Type>,
    x509_cert: Option<String>,
    x509_key: Option<String>,
}

impl TlsOptions {
    pub fn new(supported: OptionCaps) -> Self {
        Self {
            supported,
            trusted_certs: None,
            x509_type: None,
            x509_cert: None,
            x509_key: None,
        }
    }

    pub fn supported(&self) -> OptionCaps {
        self.supported
    }

    pub fn trusted_certs(&self) -> Option<&str> {
        self.trusted_certs.as_deref()
    }

    pub fn x509_type(&self) -> Option<X509Type> {
        self.x509_type
    }

    pub fn x509_cert(&self) -> Option<&str> {
        self.x509_cert.as_deref()
    }

    pub fn x509_key(&self) -> Option<&str> {
        self.x509_key.as_deref()
    }

    pub fn set(&mut self, name: &str, value: &OptionValue) -> Result<OptionStatus> {
        let (x509_type, is_cert) = match name {
            OPTION_TRUSTED_CERT => {
                if !self.supported.contains(OptionCaps::TRUSTED_CERTS) {
                    error!("Trusted certificates are not supported by this adapter");
                    return Err(Error::UnsupportedOption(name.into()));
                }
                self.trusted_certs = Some(string_value(name, value)?);
                return Ok(OptionStatus::Accepted);
            }
            OPTION_X509_CERT => (X509Type::Rsa, true),
            OPTION_X509_PRIVATE_KEY => (X509Type::Rsa, false),
            OPTION_X509_ECC_CERT => (X509Type::Ecc, true),
            OPTION_X509_ECC_KEY => (X509Type::Ecc, false),
            _ => return Ok(OptionStatus::NotHandled),
        };

        if !self.supported.contains(x509_type.cap()) {
            error!("x509 option '{}' is not supported by this adapter", name);
            return Err(Error::UnsupportedOption(name.into()));
        }
        match self.x509_type {
            Some(current) if current != x509_type => {
                error!("Supplied x509 type conflicts with previously set x509");
                return Err(Error::OptionConflict(format!(
                    "'{}' conflicts with previously set {:?} credentials",
                    name, current
                )));
            }
            _ => {}
        }

        let value = string_value(name, value)?;
        if is_cert {
            self.x509_cert = Some(value);
        } else {
            self.x509_key = Some(value);
        }
        self.x509_type = Some(x509_type);
        Ok(OptionStatus::Accepted)
    }

    /// A certificate and its key must be set together or not at all.
    pub fn check_consistency(&self) -> Result<()> {
        if self.x509_cert.is_some() != self.x509_key.is_some() {
            warn!("Mismatched x509 certificate and private key");
            return Err(Error::OptionConflict(
                "x509 certificate and private key must both be set".into(),
            ));
        }
        Ok(())
    }

    pub fn retrieve(&self) -> OptionSet {
        let mut set = OptionSet::new();
        if let Some(ref certs) = self.trusted_certs {
            set.push(OPTION_TRUSTED_CERT, certs.as_str());
        }
        if let Some(x509_type) = self.x509_type {
            if let Some(ref cert) = self.x509_cert {
                set.push(x509_type.cert_option(), cert.as_str());
            }
            if let Some(ref key) = self.x509_key {
                set.push(x509_type.key_option(), key.as_str());
            }
        }
        set
    }
}

fn string_value(name: &str, value: &OptionValue) -> Result<String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| Error::InvalidParameter(format!("{} expects a string value", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_caps() -> TlsOptions {
        TlsOptions::new(
            OptionCaps::TRUSTED_CERTS | OptionCaps::X509_RSA_CERT | OptionCaps::X509_ECC_CERT,
        )
    }

    #[test]
    fn test_unknown_option_not_handled() {
        let mut options = all_caps();
        let status = options.set("proxy_data", &"x".into()).unwrap();
        assert_eq!(status, OptionStatus::NotHandled);
    }

    #[test]
    fn test_trusted_certs_requires_cap() {
        let mut options = TlsOptions::new(OptionCaps::empty());
        assert!(matches!(
            options.set(OPTION_TRUSTED_CERT, &"PEM".into()),
            Err(Error::UnsupportedOption(_))
        ));
        assert_eq!(options.trusted_certs(), None);
    }

    #[test]
    fn test_x509_type_conflict() {
        let mut options = all_caps();
        options.set(OPTION_X509_CERT, &"rsa-cert".into()).unwrap();
        let e = options.set(OPTION_X509_ECC_KEY, &"ecc-key".into());
        assert!(matches!(e, Err(Error::OptionConflict(_))));
        assert_eq!(options.x509_type(), Some(X509Type::Rsa));
        assert_eq!(options.x509_key(), None);
    }

    #[test]
    fn test_consistency() {
        let mut options = all_caps();
        assert!(options.check_consistency().is_ok());
        options.set(OPTION_X509_ECC_CERT, &"cert".into()).unwrap();
        assert!(options.check_consistency().is_err());
        options.set(OPTION_X509_ECC_KEY, &"key".into()).unwrap();
        assert!(options.check_consistency().is_ok());
    }

    #[test]
    fn test_non_string_rejected() {
        let mut options = all_caps();
        assert!(matches!(
            options.set(OPTION_TRUSTED_CERT, &OptionValue::Bool(true)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_retrieve_uses_type_specific_names() {
        let mut options = all_caps();
        options.set(OPTION_TRUSTED_CERT, &"ca".into()).unwrap();
        options.set(OPTION_X509_ECC_CERT, &"cert".into()).unwrap();
        options.set(OPTION_X509_ECC_KEY, &"key".into()).unwrap();

        let set = options.retrieve();
        let names: Vec<&str> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![OPTION_TRUSTED_CERT, OPTION_X509_ECC_CERT, OPTION_X509_ECC_KEY]
        );
        assert_eq!(set.get(OPTION_X509_ECC_KEY), Some(&"key".into()));
    }

    #[test]
    fn test_option_set_json() {
        let set: OptionSet =
            serde_json::from_str(r#"[["TrustedCerts", "ca"], ["tcp_keepalive", true]]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(OPTION_TCP_KEEPALIVE), Some(&OptionValue::Bool(true)));
    }
}
