use sqlx::AnyPool;

/// Creates the tables if missing. Portable across Postgres and SQLite:
/// timestamps are epoch milliseconds, ids are UUID text, flags are 0/1.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Users
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  id TEXT PRIMARY KEY,
  email TEXT NOT NULL,
  telegram TEXT NOT NULL,
  role TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Events
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS events (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  starts_at_ms BIGINT NOT NULL,
  total_seats BIGINT NOT NULL CHECK (total_seats >= 0),
  available BIGINT NOT NULL CHECK (available >= 0),
  booking_ttl_ms BIGINT NOT NULL,
  requires_confirmation BIGINT NOT NULL CHECK (requires_confirmation IN (0,1)),
  status TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL,
  updated_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Bookings
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bookings (
  id TEXT PRIMARY KEY,
  event_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL,
  expires_at_ms BIGINT NOT NULL,
  confirmed_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_bookings_event ON bookings(event_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_bookings_expiry ON bookings(status, expires_at_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
