use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::{prelude::User, user};

#[derive(Clone)]
pub struct UserDao {
    db: DatabaseConnection,
}

impl DaoBase for UserDao {
    type Entity = User;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl UserDao {
    pub async fn find_by_email(&self, email: &str) -> DaoResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        created_at: DateTime<FixedOffset>,
    ) -> DaoResult<user::Model> {
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(created_at),
            last_login_at: Set(None),
        };
        model.insert(&self.db).await.map_err(DaoLayerError::Db)
    }

    pub async fn set_last_login(&self, id: &Uuid, at: DateTime<FixedOffset>) -> DaoResult<()> {
        let result = User::update_many()
            .col_expr(user::Column::LastLoginAt, sea_orm::sea_query::Expr::value(at))
            .filter(user::Column::Id.eq(*id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;

        if result.rows_affected == 0 {
            return Err(DaoLayerError::NotFound {
                entity: Self::entity_name(),
                id: *id,
            });
        }
        Ok(())
    }
}
