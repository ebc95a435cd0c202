use crate::error::{PipelineError, Result};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Full set of environment-variable knobs for every process in the pipeline.
/// Not every process reads every field; each binary pulls what it needs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub database_url: String,
    pub database_max_connections: u32,

    pub total_browser_workers: u32,
    pub total_validation_workers: u32,

    pub catalog_buffer_size: i64,
    pub catalog_max_pages: i32,

    pub heartbeat_timeout_seconds: i64,
    pub heartbeat_update_interval: u64,
    pub heartbeat_sweep_interval_seconds: u64,

    pub min_price: i64,
    pub min_validated_items: i64,
    pub min_seller_reviews: i32,

    pub enable_price_validation: bool,
    pub enable_ai_validation: bool,
    pub require_articulum_in_text: bool,
    pub enable_iqr_price_filter: bool,
    pub skip_object_parsing: bool,

    pub reparse_mode: bool,
    pub min_reparse_interval_hours: i64,

    pub proxy_wait_timeout_seconds: u64,
    pub proxy_rotation_limit: u32,

    pub container_id: String,

    pub ai_validation_endpoint: Option<String>,
    pub ai_validation_api_key: Option<String>,

    /// Base URL of the external browser-automation service consumed via
    /// the `BrowserLibrary` contract. Not part of the browser-driver's own
    /// configuration — this side only needs to know where to send requests.
    pub browser_service_url: String,

    pub engine_port: u16,

    pub worker_id: Option<String>,
}

impl PipelineConfig {
    /// Loads configuration from the environment. Fails loudly when a
    /// required variable (`DATABASE_URL`) is absent rather than guessing.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| PipelineError::Config("DATABASE_URL is required".into()))?;

        let container_id = std::env::var("CONTAINER_ID").unwrap_or_else(|_| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".into());
            format!("{:x}", simple_hash(&hostname))
        });

        Ok(Self {
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),

            total_browser_workers: env_parse("TOTAL_BROWSER_WORKERS", 10),
            total_validation_workers: env_parse("TOTAL_VALIDATION_WORKERS", 2),

            catalog_buffer_size: env_parse("CATALOG_BUFFER_SIZE", 5),
            catalog_max_pages: env_parse("CATALOG_MAX_PAGES", 10),

            heartbeat_timeout_seconds: env_parse("HEARTBEAT_TIMEOUT_SECONDS", 1800),
            heartbeat_update_interval: env_parse("HEARTBEAT_UPDATE_INTERVAL", 30),
            heartbeat_sweep_interval_seconds: env_parse("HEARTBEAT_SWEEP_INTERVAL_SECONDS", 30),

            min_price: env_parse("MIN_PRICE", 1000),
            min_validated_items: env_parse("MIN_VALIDATED_ITEMS", 3),
            min_seller_reviews: env_parse("MIN_SELLER_REVIEWS", 0),

            enable_price_validation: env_flag("ENABLE_PRICE_VALIDATION", true),
            enable_ai_validation: env_flag("ENABLE_AI_VALIDATION", false),
            require_articulum_in_text: env_flag("REQUIRE_ARTICULUM_IN_TEXT", true),
            enable_iqr_price_filter: env_flag("ENABLE_IQR_PRICE_FILTER", true),
            skip_object_parsing: env_flag("SKIP_OBJECT_PARSING", false),

            reparse_mode: env_flag("REPARSE_MODE", false),
            min_reparse_interval_hours: env_parse("MIN_REPARSE_INTERVAL_HOURS", 24),

            proxy_wait_timeout_seconds: env_parse("PROXY_WAIT_TIMEOUT", 10),
            proxy_rotation_limit: env_parse("PROXY_ROTATION_LIMIT", 10),

            container_id,

            ai_validation_endpoint: std::env::var("AI_VALIDATION_ENDPOINT").ok(),
            ai_validation_api_key: std::env::var("AI_VALIDATION_API_KEY").ok(),

            browser_service_url: std::env::var("BROWSER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".into()),

            engine_port: env_parse("ENGINE_PORT", 8080u16),

            worker_id: std::env::var("WORKER_ID").ok(),
        })
    }
}

/// Builds a globally-unique worker id as `{container_id}_{local_index}`.
pub fn worker_id(container_id: &str, local_index: u32) -> String {
    format!("{}_{}", container_id, local_index)
}

fn simple_hash(s: &str) -> u64 {
    // FNV-1a, good enough to fold a hostname into a short container tag.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
