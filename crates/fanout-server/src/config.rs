//! Configuration for the hub server.
//!
//! Read from environment variables. The first three are required and
//! startup fails if any is missing or malformed:
//!
//! - `RPC_PORT`  : notification RPC listening port
//! - `WS_PORT`   : WebSocket endpoint listening port
//! - `TOKEN_KEY` : name of the query parameter carrying the peer token
//! - `BIND_ADDR` : interface to bind to (default: "0.0.0.0")

use std::env;
use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {key} is empty")]
    Empty { key: &'static str },

    #[error("environment variable {key}={value:?} is not a valid port: {source}")]
    InvalidPort {
        key: &'static str,
        value: String,
        source: ParseIntError,
    },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// IP address / interface to bind both listeners to.
    pub bind_addr: String,

    /// Notification RPC port.
    pub rpc_port: u16,

    /// WebSocket endpoint port.
    pub ws_port: u16,

    /// Query parameter holding the peer's token, e.g. `token` in `/ws?token=...`.
    pub token_key: String,
}

impl Config {
    /// Construct a `Config` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Construct a `Config` from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_port = read_port(&lookup, "RPC_PORT")?;
        let ws_port = read_port(&lookup, "WS_PORT")?;
        let token_key = read_required(&lookup, "TOKEN_KEY")?;
        let bind_addr = lookup("BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(Config {
            bind_addr,
            rpc_port,
            ws_port,
            token_key,
        })
    }

    /// Convenience: `addr:port` for the RPC listener.
    pub fn rpc_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.rpc_port)
    }

    /// Convenience: `addr:port` for the WebSocket listener.
    pub fn ws_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.ws_port)
    }
}

fn read_required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or(ConfigError::Missing(key))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty { key });
    }
    Ok(value.to_string())
}

fn read_port<F>(lookup: &F, key: &'static str) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = read_required(lookup, key)?;
    value
        .parse::<u16>()
        .map_err(|source| ConfigError::InvalidPort { key, value, source })
}
