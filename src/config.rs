use std::env;
use std::time::Duration;

/// Which run-lock implementation backs the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockBackend {
    /// Durable lock in Redis, shared by every instance and surviving restarts
    Redis,
    /// Process-local lock; only valid for single-instance deployments
    Memory,
}

impl LockBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub app_env: String,
    pub admin_key: String,

    // Redis
    pub redis_url: String,

    // PostgreSQL
    pub database_url: String,
    pub db_max_connections: u32,

    // Scheduling
    pub lock_backend: LockBackend,
    pub lock_stale_secs: u64,
    pub scheduler_tick_secs: u64,

    // Provider catalog
    pub fetch_timeout_ms: u64,
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            admin_key: env::var("ADMIN_KEY").unwrap_or_else(|_| "admin123".to_string()),

            // Redis
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            // PostgreSQL
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/stream_panel".to_string()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Scheduling
            lock_backend: env::var("LOCK_BACKEND")
                .ok()
                .and_then(|v| LockBackend::parse(&v))
                .unwrap_or(LockBackend::Redis),

            lock_stale_secs: env::var("LOCK_STALE_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1800), // 30 minutes

            scheduler_tick_secs: env::var("SCHEDULER_TICK_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600), // 10 minutes

            // Provider catalog
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60_000),

            // VLC user agent avoids IPTV panel blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
        }
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs.max(1))
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs.max(1))
    }

    /// Provider request timeout, never below one second
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1000))
    }
}
