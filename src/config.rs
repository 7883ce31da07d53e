//! Config module contains the top-level config for the app.
use std::env;

use config_crate::{Config as RawConfig, ConfigError, Environment, File};

use sentry_integration::SentryConfig;

/// Basic settings - database url, worker threads, session store
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub database: String,
    pub thread_count: usize,
    pub redis: Option<String>,
}

/// Promotions sweeper settings
#[derive(Debug, Deserialize, Clone)]
pub struct Sweeper {
    pub interval_s: u64,
    pub thread_count: usize,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self {
            interval_s: 60,
            thread_count: 1,
        }
    }
}

/// Content moderation classifier endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct Moderation {
    pub url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

/// SMS gateway endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct Sms {
    pub url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

/// Listing search endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct Search {
    pub url: String,
    pub timeout_ms: u64,
}

/// Global app config
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: Server,
    pub sweeper: Option<Sweeper>,
    pub moderation: Option<Moderation>,
    pub sms: Option<Sms>,
    pub search: Option<Search>,
    pub sentry: Option<SentryConfig>,
}

impl Config {
    /// Creates new app config struct
    /// #Examples
    /// ```
    /// use listings_lib::config::*;
    ///
    /// let config = Config::new();
    /// ```
    pub fn new() -> Result<Self, ConfigError> {
        let mut s = RawConfig::new();

        s.merge(File::with_name("config/base"))?;

        // Note that this file is _optional_
        let env = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        s.merge(File::with_name(&format!("config/{}", env)).required(false))?;

        // Add in settings from the environment (with a prefix of LISTINGS)
        s.merge(Environment::with_prefix("LISTINGS").separator("__"))?;

        s.try_into()
    }
}
