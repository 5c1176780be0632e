use rand::Rng;
use std::time::Duration;
use tracing::info;

/// Realtime endpoint used when nothing else is configured.
const DEFAULT_WS_PATH: &str = "/cable";

/// Everything the widget needs to talk to one helpdesk inbox.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Backend origin, e.g. `https://support.example.com`.
    pub api_base: String,
    /// Realtime endpoint, e.g. `wss://support.example.com/cable`.
    pub ws_url: String,
    /// Opaque inbox identifier issued by the backend.
    pub inbox_identifier: String,
    pub account_id: i64,
    /// Token for the account-scoped endpoints (agents, conversation history).
    pub api_access_token: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl WidgetConfig {
    /// Builds a config with the realtime URL derived from `api_base`.
    ///
    /// Priority for the websocket URL: build-time env -> runtime env ->
    /// derived from the API origin.
    pub fn new(api_base: impl Into<String>, inbox_identifier: impl Into<String>, account_id: i64) -> Self {
        let api_base = api_base.into();

        let build_time_url = option_env!("BEACON_WS_URL");
        let runtime_url = std::env::var("BEACON_WS_URL").ok();
        let ws_url = build_time_url
            .map(String::from)
            .or(runtime_url)
            .unwrap_or_else(|| derive_ws_url(&api_base));

        info!(url = %ws_url, "using realtime endpoint");

        Self {
            api_base,
            ws_url,
            inbox_identifier: inbox_identifier.into(),
            account_id,
            api_access_token: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.api_access_token = Some(token.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

fn derive_ws_url(api_base: &str) -> String {
    let origin = api_base.trim_end_matches('/');
    let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        origin.to_string()
    };
    format!("{ws_origin}{DEFAULT_WS_PATH}")
}

/// Backoff policy for the realtime channel.
///
/// Capped exponential backoff with full jitter; `disabled()` gives up after
/// the first failed attempt, which matches the behavior of backends that
/// re-arm the channel themselves by rotating the pubsub token.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let shift = (attempt - 1).min(16);
        let exp = self.base_delay.saturating_mul(1u32 << shift);
        let capped = exp.min(self.max_delay);
        let millis = capped.as_millis() as u64;
        if millis == 0 {
            return Some(Duration::ZERO);
        }
        // Full jitter in the upper half keeps herds apart without collapsing
        // the delay to near-zero.
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Some(Duration::from_millis(jittered))
    }
}
