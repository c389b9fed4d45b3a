//! Configuration parsed from CLI flags and environment variables.
//!
//! Every flag falls back to an env var, and `main` loads `.env` before
//! parsing, so a `.env` next to the binary is enough to run it.

use clap::Parser;

use crate::relay::{DEFAULT_RECONNECT_ATTEMPTS, ReconnectPolicy};

/// Channel id compared against `body.id` when none is configured.
pub const DEFAULT_CHANNEL_ID: &str = "example";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {var}")]
    Missing { var: &'static str },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "notecast", about = "Read Misskey channel notes aloud through BouyomiChan")]
pub struct Config {
    #[arg(long, env = "MISSKEY_HOST")]
    pub misskey_host: Option<String>,

    #[arg(long, env = "MISSKEY_API_KEY", hide_env_values = true)]
    pub misskey_api_key: Option<String>,

    #[arg(long, env = "MISSKEY_CHANNEL_NAME")]
    pub channel_name: Option<String>,

    #[arg(long, env = "MISSKEY_CHANNEL_ID", default_value = DEFAULT_CHANNEL_ID)]
    pub channel_id: String,

    #[arg(long, env = "BOUYOMI_CHAN_HOST")]
    pub bouyomi_host: Option<String>,

    #[arg(long, env = "BOUYOMI_RECONNECT", action = clap::ArgAction::Set, default_value_t = false)]
    pub relay_reconnect: bool,

    #[arg(long, env = "BOUYOMI_RECONNECT_ATTEMPTS", default_value_t = DEFAULT_RECONNECT_ATTEMPTS)]
    pub relay_reconnect_attempts: u32,
}

/// Both socket URLs, derived once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Logged in place of `source_url`, which carries the API key.
    pub source_host: String,
    pub source_url: String,
    pub relay_url: String,
}

impl Endpoints {
    /// The API key goes in the `i` query parameter; the streaming API does
    /// not accept it as a header.
    #[must_use]
    pub fn new(misskey_host: &str, api_key: &str, bouyomi_host: &str) -> Self {
        Self {
            source_host: misskey_host.to_owned(),
            source_url: format!("wss://{misskey_host}/streaming?i={api_key}"),
            relay_url: format!("ws://{bouyomi_host}/TalkAPI/"),
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub channel_name: String,
    pub channel_id: String,
    pub reconnect: ReconnectPolicy,
}

impl Config {
    /// Check required values and derive [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the env var of the first
    /// required value that is absent or blank.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let host = required(self.misskey_host, "MISSKEY_HOST")?;
        let api_key = required(self.misskey_api_key, "MISSKEY_API_KEY")?;
        let channel_name = required(self.channel_name, "MISSKEY_CHANNEL_NAME")?;
        let channel_id = required(Some(self.channel_id), "MISSKEY_CHANNEL_ID")?;
        let bouyomi_host = required(self.bouyomi_host, "BOUYOMI_CHAN_HOST")?;

        let reconnect = if self.relay_reconnect {
            ReconnectPolicy::retrying(self.relay_reconnect_attempts)
        } else {
            ReconnectPolicy::disabled()
        };

        Ok(Settings {
            endpoints: Endpoints::new(&host, &api_key, &bouyomi_host),
            channel_name,
            channel_id,
            reconnect,
        })
    }
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { var })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
