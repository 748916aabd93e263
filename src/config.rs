use std::{
    env,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;
use thiserror::Error;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 3847;

/// Command-line flags. Anything left unset falls back to the environment and
/// then to the built-in defaults.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "observation-memory-mcp", version, about = "Developer observation memory served over JSON-RPC")]
pub struct CliArgs {
    /// Serve over stdin/stdout instead of a TCP socket
    #[arg(long)]
    pub stdio: bool,
    /// Interface to bind the socket transport to
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind the socket transport to
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Socket,
    Stdio,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportMode,
    pub bind_addr: String,
    pub bind_port: u16,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("CACHE_MAX_ENTRIES must be a positive integer")]
    InvalidCacheSize,
    #[error("CACHE_TTL_SECS must be a positive integer")]
    InvalidCacheTtl,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn load(args: CliArgs) -> Result<Self, ConfigError> {
        Self::from_sources(args, |key| env::var(key).ok())
    }

    /// Resolves flags over variables from `lookup` over defaults.
    pub fn from_sources(
        args: CliArgs,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let env_port = lookup("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?;
        let cache_max_entries = lookup("CACHE_MAX_ENTRIES")
            .map(|value| {
                value
                    .parse::<usize>()
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or(ConfigError::InvalidCacheSize)
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_ENTRIES);
        let cache_ttl = lookup("CACHE_TTL_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ConfigError::InvalidCacheTtl)
            })
            .transpose()?
            .unwrap_or(DEFAULT_TTL);

        let config = Self {
            transport: if args.stdio {
                TransportMode::Stdio
            } else {
                TransportMode::Socket
            },
            bind_addr: args
                .host
                .or_else(|| lookup("BIND_ADDR"))
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            bind_port: args.port.or(env_port).unwrap_or(DEFAULT_BIND_PORT),
            cache_max_entries,
            cache_ttl,
        };

        if config.transport == TransportMode::Socket {
            let _ = config.bind_socket()?;
        }
        Ok(config)
    }

    /// Accepts IPv4 and IPv6 hosts; IPv6 may be given with or without brackets.
    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        let host = self
            .bind_addr
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(&self.bind_addr);
        let ip = host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidSocket)?;
        Ok(SocketAddr::new(ip, self.bind_port))
    }
}
