//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::location::LocationConfig;
use crate::realtime::RealtimeConfig;

/// Header that carries the session token on REST calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `<name>: <token>`
    Named(String),
}

impl AuthHeader {
    /// Parse a header name; `Authorization` selects the bearer scheme
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("authorization") {
            AuthHeader::Bearer
        } else {
            AuthHeader::Named(name.to_string())
        }
    }
}

impl Default for AuthHeader {
    fn default() -> Self {
        AuthHeader::Named("X-WP-Nonce".to_string())
    }
}

/// Courier client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST root, e.g. "https://shop.example/wp-json/foodime/v1"
    pub api_root: String,

    /// Realtime endpoint, e.g. "wss://push.example"
    pub realtime_url: String,

    /// Token header
    pub auth_header: AuthHeader,

    /// TCP connect timeout for REST calls (requests themselves are unbounded)
    pub connect_timeout: Duration,

    /// Session record location
    pub session_path: PathBuf,

    pub realtime: RealtimeConfig,

    pub location: LocationConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the REST root
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            api_root: api_root.into(),
            realtime_url: "ws://localhost:3001".to_string(),
            auth_header: AuthHeader::default(),
            connect_timeout: Duration::from_secs(10),
            session_path: PathBuf::from("./courier_session.json"),
            realtime: RealtimeConfig::default(),
            location: LocationConfig::default(),
        }
    }

    /// Build the configuration from `COURIER_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("COURIER_API_ROOT")
                .unwrap_or_else(|_| "http://localhost/wp-json/foodime/v1".into()),
        );
        if let Ok(url) = std::env::var("COURIER_REALTIME_URL") {
            config.realtime_url = url;
        }
        if let Ok(path) = std::env::var("COURIER_SESSION_PATH") {
            config.session_path = PathBuf::from(path);
        }
        if let Ok(name) = std::env::var("COURIER_AUTH_HEADER") {
            config.auth_header = AuthHeader::from_name(&name);
        }
        if let Some(secs) = env_secs("COURIER_RECONNECT_MAX_SECS") {
            config.realtime.max_reconnect_delay = secs;
        }
        if let Some(secs) = env_secs("COURIER_LOCATION_INTERVAL_SECS") {
            config.location.interval = secs;
        }
        if let Some(secs) = env_secs("COURIER_LOCATION_TIMEOUT_SECS") {
            config.location.sample_timeout = secs;
        }
        config
    }

    /// Set the realtime endpoint
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = url.into();
        self
    }

    /// Set the token header
    pub fn with_auth_header(mut self, header: AuthHeader) -> Self {
        self.auth_header = header;
        self
    }

    /// Set the session record location
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    /// Set the realtime channel configuration
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Set the location reporter configuration
    pub fn with_location(mut self, location: LocationConfig) -> Self {
        self.location = location;
        self
    }

    /// Full URL of an endpoint below the REST root
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_root.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost/wp-json/foodime/v1")
    }
}

/// Positive whole seconds from `key`; anything else keeps the default
fn env_secs(key: &str) -> Option<Duration> {
    let value = std::env::var(key).ok()?;
    let secs = parse_secs(&value);
    if secs.is_none() {
        tracing::warn!("Ignoring {key}={value}: expected a positive number of seconds");
    }
    secs
}

fn parse_secs(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => None,
    }
}
