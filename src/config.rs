//! Process configuration (§SPEC_FULL.md A.3). Read once at startup from
//! the environment; there is no config file or GUC system outside a
//! PostgreSQL extension, so plain `std::env::var` parsing stands in for
//! the reference's registered-GUC pattern.

/// `MSKQL_PORT` default (§6 "Environment").
pub const DEFAULT_PORT: u16 = 5433;
const DEFAULT_MAX_CLIENTS: usize = 64;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub port: u16,
    pub max_clients: usize,
    pub max_message_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: parse_env_or("MSKQL_PORT", DEFAULT_PORT),
            max_clients: DEFAULT_MAX_CLIENTS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { port: DEFAULT_PORT, max_clients: DEFAULT_MAX_CLIENTS, max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES }
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "could not parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.max_clients, 64);
        assert_eq!(cfg.max_message_bytes, 16 * 1024 * 1024);
    }
}
