use std::env;

/// How the server talks to its MCP client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Stdio => "stdio",
        }
    }
}

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub orchestrator_url: String,
    pub listen_addr: String,
    pub transport: Transport,
    pub local_mode: bool,
    pub token_location: Option<String>,
    pub refresh_interval_secs: u64,
    pub cache_max_fetch: usize,
    pub max_fetch_for_sort: usize,
    pub http_timeout_secs: u64,
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let local_mode = parse_bool(&get_env("LOCAL_MODE", "false"));
        let default_transport = if local_mode { "stdio" } else { "http" };
        let transport = match get_env("MCP_TRANSPORT", default_transport)
            .to_lowercase()
            .as_str()
        {
            "stdio" => Transport::Stdio,
            _ => Transport::Http,
        };
        let token_location = get_env("TOKEN_LOCATION", "");

        Self {
            orchestrator_url: get_env("ORCHESTRATOR_URL", "https://orchestrator.fabric-testbed.net"),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8000"),
            transport,
            local_mode,
            token_location: if token_location.is_empty() {
                None
            } else {
                Some(token_location)
            },
            refresh_interval_secs: get_env("REFRESH_INTERVAL_SECONDS", "300")
                .parse()
                .unwrap_or(300),
            cache_max_fetch: get_env("CACHE_MAX_FETCH", "5000").parse().unwrap_or(5000),
            max_fetch_for_sort: get_env("MAX_FETCH_FOR_SORT", "5000")
                .parse()
                .unwrap_or(5000),
            http_timeout_secs: get_env("HTTP_TIMEOUT_SECONDS", "60").parse().unwrap_or(60),
            log_json: get_env("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator_url: "https://orchestrator.fabric-testbed.net".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            transport: Transport::Http,
            local_mode: false,
            token_location: None,
            refresh_interval_secs: 300,
            cache_max_fetch: 5000,
            max_fetch_for_sort: 5000,
            http_timeout_secs: 60,
            log_json: false,
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
