use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::codec::{from_ms, opt_text, parse_uuid, to_ms};
use crate::user::model::{User, UserRole};
use crate::user::repository::UserRepository;

pub struct SqlxUserRepository {
    pool: AnyPool,
}

impl SqlxUserRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO users (id, email, telegram, role, created_at_ms)
VALUES ($1, $2, $3, $4, $5);
"#,
        )
        .bind(user.id.to_string())
        .bind(user.email.clone().unwrap_or_default())
        .bind(user.telegram.clone().unwrap_or_default())
        .bind(user.role.to_string())
        .bind(to_ms(user.created_at))
        .execute(&self.pool)
        .await
        .context("failed to insert user")?;

        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            r#"
SELECT id, email, telegram, role, created_at_ms
FROM users
WHERE id = $1;
"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(r: &sqlx::any::AnyRow) -> anyhow::Result<User> {
    let id: String = r.try_get("id")?;
    let role: String = r.try_get("role")?;

    Ok(User {
        id: parse_uuid(&id, "user id")?,
        email: opt_text(r.try_get("email")?),
        telegram: opt_text(r.try_get("telegram")?),
        role: role.parse::<UserRole>().map_err(|e| anyhow!(e))?,
        created_at: from_ms(r.try_get("created_at_ms")?)?,
    })
}
