//! Runtime configuration from the environment.
//!
//! Operational values live in environment variables so deployments can
//! differ without recompilation. Startup policy for a missing value is
//! report-and-terminate: `from_env` returns the error and `main` exits.

use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

use crate::core::{Error, Result, Symbol};

/// Default precision for size-weighted price calculations.
pub const DEFAULT_DECIMAL_PLACES: u32 = 8;

/// Maximum time a handler waits for ticker data before draining the
/// instruction and report streams anyway.
pub const HANDLER_WAKE: Duration = Duration::from_secs(1);

/// Bounded block when reading journal streams.
pub const STREAM_READ_BLOCK: Duration = Duration::from_millis(1);

/// How long a market-data websocket lives before a forced reconnect.
pub const CONNECTION_LIFETIME: Duration = Duration::from_secs(3600);

/// Everything the example binary needs from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Market-data websocket URL.
    pub ws_url: String,
    /// Websocket requests admitted per second.
    pub rate: usize,
    /// Listen address for the instruction ingress.
    pub http_addr: String,
    /// Journal address. Informational when the in-memory journal is
    /// in use.
    pub kv_addr: String,
    /// The symbol the example delegate trades.
    pub symbol: Symbol,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ws_url: must_have("EXFLOW_WS_URL")?,
            rate: must_have("EXFLOW_RATE")?
                .parse()
                .map_err(|_| Error::Config("bad EXFLOW_RATE".into()))?,
            http_addr: must_have("EXFLOW_HTTP")?,
            kv_addr: must_have("EXFLOW_KV")?,
            symbol: Symbol::new(must_have("EXFLOW_SYMBOL")?),
        })
    }
}

fn must_have(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!("missing {name}"))),
    }
}

/// Load `KEY=VALUE` lines from the given file into the process
/// environment. Lines without `=` are skipped.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
    for line in std::io::BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::Config(e.to_string()))?;
        if let Some((name, value)) = line.split_once('=') {
            std::env::set_var(name.trim(), value.trim());
        }
    }
    Ok(())
}
