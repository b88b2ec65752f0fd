use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::user::model::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>>;
}
