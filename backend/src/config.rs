use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string. `postgres://...` or `sqlite:...`.
    pub database_url: String,

    pub db_max_connections: u32,

    // =========================
    // Reservation
    // =========================
    /// Hold length for events that do not set their own TTL.
    pub default_booking_ttl: Duration,

    /// Cadence of the expiration sweeper.
    ///
    /// A late or missed tick only delays cancellation of overdue holds;
    /// the next run picks them up.
    pub sweep_interval: Duration,

    // =========================
    // Notification
    // =========================
    /// Overall time budget shared by one post-commit notification batch.
    pub notify_budget: Duration,

    /// Maximum in-flight deliveries within one batch.
    pub notify_concurrency: usize,

    /// HTTP mail relay. The email channel is disabled when unset.
    pub email_relay_url: Option<String>,
    pub email_from: String,

    /// Telegram bot token. The messaging channel is disabled when unset.
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Missing keys take
    /// defaults; malformed numbers take defaults and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            database_url: text("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://event_booker.db?mode=rwc".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 16u32).max(1),

            default_booking_ttl: Duration::from_secs(
                parse_or(&lookup, "DEFAULT_BOOKING_TTL_SECS", 1_800u64).max(1),
            ),
            sweep_interval: Duration::from_secs(
                parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60u64).max(1),
            ),

            notify_budget: Duration::from_secs(
                parse_or(&lookup, "NOTIFY_BUDGET_SECS", 30u64).max(1),
            ),
            notify_concurrency: parse_or(&lookup, "NOTIFY_CONCURRENCY", 8usize).max(1),

            email_relay_url: text("EMAIL_RELAY_URL"),
            email_from: text("EMAIL_FROM").unwrap_or_else(|| "no-reply@event-booker.local".into()),

            telegram_bot_token: text("TELEGRAM_BOT_TOKEN"),
            telegram_api_base: text("TELEGRAM_API_BASE")
                .unwrap_or_else(|| "https://api.telegram.org".into()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "malformed config value; using default");
                default
            }
        },
    }
}
