//! The static configuration a [`crate::client::Client`] is built from.
//!
//! Loading this from a file, environment, or CLI flags is someone else's
//! job (see `spec.md` §1 — config loading is an external collaborator).
//! This module only owns the shape of the data and the handful of
//! string encodings §6 specifies literally: the `\n`-separated header
//! list, the comma-separated transformer list, and the decimal padding
//! integer.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
    H2,
    H2c,
    Http3,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "h2" => Ok(Protocol::H2),
            "h2c" => Ok(Protocol::H2c),
            "http3" => Ok(Protocol::Http3),
            other => Err(Error::Config(format!("unknown protocol {other:?}"))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::H2 => "h2",
            Protocol::H2c => "h2c",
            Protocol::Http3 => "http3",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPackage {
    None,
    Opaque,
}

impl FromStr for AuthPackage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(AuthPackage::None),
            "opaque" => Ok(AuthPackage::Opaque),
            other => Err(Error::Config(format!("unknown auth package {other:?}"))),
        }
    }
}

/// Raw, string-shaped configuration surface from `spec.md` §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_id: Uuid,
    pub protocol: String,
    pub host: String,
    /// `key: value` pairs separated by the literal two characters `\n`.
    pub headers: String,
    pub url: Vec<String>,
    pub proxy: String,
    pub user_agent: String,
    pub parrot: String,
    pub psk: String,
    pub ja3: String,
    pub padding: String,
    pub auth_package: String,
    /// Comma-separated, case-insensitive transform stage identifiers.
    pub transformers: String,
}

impl Config {
    /// Parse the `\n`-literal header list into case-preserving,
    /// whitespace-trimmed `(key, value)` pairs. Each non-empty line must
    /// contain at least one colon; malformed lines are rejected rather
    /// than silently dropped.
    pub fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, Error> {
        let mut out = Vec::new();
        for line in raw.split("\\n").filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("malformed header line {line:?}")))?;
            out.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(out)
    }

    pub fn parse_padding(raw: &str) -> Result<u64, Error> {
        if raw.trim().is_empty() {
            return Ok(0);
        }
        raw.trim()
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("malformed padding {raw:?}: {e}")))
    }

    pub fn parse_transformer_names(raw: &str) -> Result<Vec<String>, Error> {
        let names: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(Error::Config("transformers list is empty".into()));
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_literal_backslash_n() {
        let raw = "Accept: */*\\nX-Agent: 1";
        let parsed = Config::parse_headers(raw).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("Accept".to_string(), "*/*".to_string()),
                ("X-Agent".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_header_line_rejected() {
        let err = Config::parse_headers("no-colon-here").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_padding_is_disabled() {
        assert_eq!(Config::parse_padding("").unwrap(), 0);
    }

    #[test]
    fn empty_transformers_rejected() {
        assert!(Config::parse_transformer_names("").is_err());
        assert!(Config::parse_transformer_names("  ,  ,").is_err());
    }

    #[test]
    fn transformer_names_trimmed_and_lowercased() {
        let names = Config::parse_transformer_names(" AES, Base64-Byte ,xor").unwrap();
        assert_eq!(names, vec!["aes", "base64-byte", "xor"]);
    }
}
