use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ProxyId;

/// A single upstream HTTP/SOCKS proxy the browser workers rotate through.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proxy {
    pub id: ProxyId,
    pub host: String,
    pub port: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_blocked: bool,
    pub is_in_use: bool,
    pub worker_id: Option<String>,
    pub consecutive_errors: i32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl Proxy {
    /// Number of consecutive transient errors after which a proxy is
    /// permanently blocked rather than merely released.
    pub const MAX_CONSECUTIVE_ERRORS: i32 = 3;

    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{}:{}@{}:{}", u, p, self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}
