use std::net::SocketAddr;

/// HTTP-layer settings. Engine settings (database, models, timeouts) live in
/// [`memoria::types::MemoriaConfig`]; this struct covers only the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the listener. `BIND_ADDR`, default `0.0.0.0:8080`.
    pub bind_addr: SocketAddr,
    /// Apply pending database migrations at startup. `RUN_MIGRATIONS`, default true.
    pub run_migrations: bool,
}

impl Config {
    /// Reads `BIND_ADDR` and `RUN_MIGRATIONS` from the environment. A variable
    /// that is set but does not parse is an error, not a silent fallback.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            bind_addr: env_parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            run_migrations: env_parsed("RUN_MIGRATIONS", true)?,
        })
    }
}

fn env_parsed<T>(name: &str, fallback: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", name, raw, e)),
        Err(_) => Ok(fallback),
    }
}
