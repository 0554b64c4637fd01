//! Connection options, parsed from a connection URI.

use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// Parsed form of a connection URI such as
/// `http://localhost:7474/db/data` or `memory://`.
///
/// The scheme selects the client implementation; the remaining parts are
/// surfaced for it to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    path: String,
}

impl StorageOptions {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        Ok(StorageOptions {
            scheme: url.scheme().to_owned(),
            host: url.host_str().map(str::to_owned),
            port: url.port(),
            path: url.path().to_owned(),
        })
    }
}

impl FromStr for StorageOptions {
    type Err = Error;

    fn from_str(uri: &str) -> Result<Self> {
        let url: Url = uri.parse()?;
        Self::from_url(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_graph_database_uri() {
        let options: StorageOptions = "http://localhost:7474/db/data".parse().unwrap();
        assert_eq!(options.scheme(), "http");
        assert_eq!(options.host(), Some("localhost"));
        assert_eq!(options.port(), Some(7474));
        assert_eq!(options.path(), "/db/data");
    }

    #[test]
    fn rejects_garbage() {
        assert!("not a uri".parse::<StorageOptions>().is_err());
    }
}
