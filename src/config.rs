use std::env;
use std::time::Duration;

/// Placeholder substituted with the user id in subscription destinations
pub const USER_PLACEHOLDER: &str = "{userId}";

/// Everything the connection manager needs to know about the endpoint and its policy
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub ws_url: String,
    pub auth_token: Option<String>,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Reconnect attempts allowed before giving up
    pub max_reconnect_attempts: u32,
    /// Outgoing STOMP heart-beat interval; zero disables
    pub heartbeat: Duration,
    pub messages_destination: String,
    pub unread_count_destination: String,
    pub notifications_destination: String,
    pub send_destination: String,
    pub mark_read_destination: String,
}

impl ConnectionSettings {
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Expand a destination template for `user_id`
    pub fn destination_for(template: &str, user_id: &str) -> String {
        template.replace(USER_PLACEHOLDER, user_id)
    }

    /// Host header value for the STOMP CONNECT frame
    pub fn stomp_host(&self) -> String {
        reqwest::Url::parse(&self.ws_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080/ws".to_string(),
            auth_token: None,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: Self::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat: Duration::from_secs(10),
            messages_destination: "/user/{userId}/queue/messages".to_string(),
            unread_count_destination: "/user/{userId}/queue/unread-count".to_string(),
            notifications_destination: "/user/{userId}/queue/notifications".to_string(),
            send_destination: "/app/chat.sendMessage".to_string(),
            mark_read_destination: "/app/chat.markAsRead".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub ws_url: String,
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub echo_tolerance_ms: u64,
    pub heartbeat_ms: u64,
    pub history_page_size: u32,
    pub http_timeout_secs: u64,
    pub user_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let ws_url =
            env::var("REALTIME_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl("REALTIME_WS_URL"));
        }

        let api_base_url =
            env::var("API_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        if reqwest::Url::parse(&api_base_url).is_err() {
            return Err(ConfigError::InvalidUrl("API_BASE_URL"));
        }

        let auth_token = env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        let reconnect_delay_ms = parse_var("RECONNECT_DELAY_MS", 3000)?;
        let max_reconnect_attempts = parse_var("MAX_RECONNECT_ATTEMPTS", 5)?;
        let echo_tolerance_ms = parse_var("ECHO_TOLERANCE_MS", 5000)?;
        let heartbeat_ms = parse_var("HEARTBEAT_MS", 10000)?;
        let history_page_size = parse_var("HISTORY_PAGE_SIZE", 50)?;
        let http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", 30)?;

        let user_id = env::var("CHAT_USER_ID").ok().filter(|u| !u.trim().is_empty());

        Ok(Config {
            ws_url,
            api_base_url,
            auth_token,
            reconnect_delay_ms,
            max_reconnect_attempts,
            echo_tolerance_ms,
            heartbeat_ms,
            history_page_size,
            http_timeout_secs,
            user_id,
        })
    }

    pub fn require_user_id(&self) -> Result<&str, ConfigError> {
        self.user_id.as_deref().ok_or(ConfigError::MissingUserId)
    }

    pub fn echo_tolerance(&self) -> Duration {
        Duration::from_millis(self.echo_tolerance_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ws_url: self.ws_url.clone(),
            auth_token: self.auth_token.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            ..ConnectionSettings::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a non-negative integer")]
    InvalidNumber(&'static str),

    #[error("{0} is not a valid URL")]
    InvalidUrl(&'static str),

    #[error("CHAT_USER_ID environment variable not set")]
    MissingUserId,
}
