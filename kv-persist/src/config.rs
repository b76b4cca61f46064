use std::env;

use crate::error::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 128;

/// Connection settings for [`crate::Db::connect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub pd_endpoints: Vec<String>,
    /// Number of keys fetched per scan round trip.
    pub page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pd_endpoints: vec!["127.0.0.1:2379".to_string()],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn new(pd_endpoints: Vec<String>) -> Self {
        Self {
            pd_endpoints,
            ..Default::default()
        }
    }

    /// Reads `KV_PERSIST_PD_ENDPOINTS` (comma separated) and
    /// `KV_PERSIST_PAGE_SIZE`, falling back to the defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(endpoints) = lookup("KV_PERSIST_PD_ENDPOINTS") {
            config.pd_endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(page_size) = lookup("KV_PERSIST_PAGE_SIZE") {
            config.page_size = match page_size.trim().parse() {
                Ok(0) | Err(_) => {
                    return Err(Error::Config(format!(
                        "KV_PERSIST_PAGE_SIZE must be a positive integer, got {:?}",
                        page_size
                    )));
                }
                Ok(n) => n,
            };
        }
        Ok(config)
    }
}
