use crate::{
    db::DbPool,
    entities::user::{self, Entity as User, Model as UserModel},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Read-only surface over the identity collaborator's user records.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Resolves the external identity subject to a local user record.
    #[instrument(skip(self), fields(auth_id = %auth_id))]
    pub async fn get_user_by_auth_id(&self, auth_id: &str) -> Result<UserModel, ServiceError> {
        let user = User::find()
            .filter(user::Column::AuthId.eq(auth_id))
            .one(&*self.db)
            .await?;

        user.ok_or_else(|| {
            debug!("Unknown auth subject");
            ServiceError::Unauthorized("Unknown user".to_string())
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserModel, ServiceError> {
        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }
}
