/// Default tracing filter when neither `RUST_LOG` nor `PLANETGATE_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "planetgate=info";

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Serve permission node reads through the in-process cache.
    pub node_cache: bool,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:planetgate.db?mode=rwc".to_string()),
            max_connections: std::env::var("PLANETGATE_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            node_cache: std::env::var("PLANETGATE_NODE_CACHE")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(true),
            log_filter: std::env::var("RUST_LOG")
                .or_else(|_| std::env::var("PLANETGATE_LOG"))
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
