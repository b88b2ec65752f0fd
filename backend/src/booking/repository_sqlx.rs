use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::booking::model::{Booking, BookingStatus};
use crate::booking::repository::BookingRepository;
use crate::db::SqlxTx;
use crate::db::codec::{from_ms, opt_from_ms, opt_to_ms, parse_uuid, to_ms};

const BOOKING_COLUMNS: &str =
    "id, event_id, user_id, status, created_at_ms, expires_at_ms, confirmed_at_ms";

/// SQLx-backed implementation of BookingRepository.
pub struct SqlxBookingRepository {
    pool: AnyPool,
}

impl SqlxBookingRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository<SqlxTx> for SqlxBookingRepository {
    async fn create(&self, tx: &mut SqlxTx, booking: &Booking) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO bookings (
  id, event_id, user_id, status, created_at_ms, expires_at_ms, confirmed_at_ms
)
VALUES ($1, $2, $3, $4, $5, $6, $7);
"#,
        )
        .bind(booking.id.to_string())
        .bind(booking.event_id.to_string())
        .bind(booking.user_id.to_string())
        .bind(booking.status.to_string())
        .bind(to_ms(booking.created_at))
        .bind(to_ms(booking.expires_at))
        .bind(opt_to_ms(booking.confirmed_at))
        .execute(&mut **tx)
        .await
        .context("failed to insert booking")?;

        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1;");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    async fn get_for_update(&self, tx: &mut SqlxTx, id: &Uuid) -> anyhow::Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1;");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .context("failed to re-read booking")?;

        row.as_ref().map(row_to_booking).transpose()
    }

    async fn update(&self, tx: &mut SqlxTx, booking: &Booking) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
UPDATE bookings
SET status = $1, expires_at_ms = $2, confirmed_at_ms = $3
WHERE id = $4;
"#,
        )
        .bind(booking.status.to_string())
        .bind(to_ms(booking.expires_at))
        .bind(opt_to_ms(booking.confirmed_at))
        .bind(booking.id.to_string())
        .execute(&mut **tx)
        .await
        .context("failed to update booking")?;

        if res.rows_affected() != 1 {
            return Err(anyhow!("booking {} not found for update", booking.id));
        }
        Ok(())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = $1 AND expires_at_ms < $2 ORDER BY expires_at_ms ASC;"
        );
        let rows = sqlx::query(&sql)
            .bind(BookingStatus::Pending.to_string())
            .bind(to_ms(now))
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_booking(&r) {
                Ok(b) => out.push(b),
                Err(e) => {
                    // one bad row must not stall the whole sweep
                    tracing::warn!(error = %e, "skipping malformed booking row");
                }
            }
        }

        Ok(out)
    }

    async fn get_by_event_id(&self, event_id: &Uuid) -> anyhow::Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 ORDER BY created_at_ms ASC;"
        );
        let rows = sqlx::query(&sql)
            .bind(event_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn get_by_event_id_for_update(
        &self,
        tx: &mut SqlxTx,
        event_id: &Uuid,
    ) -> anyhow::Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 ORDER BY created_at_ms ASC;"
        );
        let rows = sqlx::query(&sql)
            .bind(event_id.to_string())
            .fetch_all(&mut **tx)
            .await
            .context("failed to read event bookings")?;

        // Strict: a cascade must see every booking or none.
        rows.iter().map(row_to_booking).collect()
    }
}

fn row_to_booking(r: &sqlx::any::AnyRow) -> anyhow::Result<Booking> {
    let id: String = r.try_get("id")?;
    let event_id: String = r.try_get("event_id")?;
    let user_id: String = r.try_get("user_id")?;
    let status: String = r.try_get("status")?;

    Ok(Booking {
        id: parse_uuid(&id, "booking id")?,
        event_id: parse_uuid(&event_id, "event_id")?,
        user_id: parse_uuid(&user_id, "user_id")?,
        status: status.parse::<BookingStatus>().map_err(|e| anyhow!(e))?,
        created_at: from_ms(r.try_get("created_at_ms")?)?,
        expires_at: from_ms(r.try_get("expires_at_ms")?)?,
        confirmed_at: opt_from_ms(r.try_get("confirmed_at_ms")?)?,
    })
}
