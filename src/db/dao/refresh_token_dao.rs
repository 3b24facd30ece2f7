use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::refresh_token::{self, Entity as RefreshToken};

/// Fields for a freshly minted refresh-token row. `last_used_at` starts at `issued_at`.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub issued_at: DateTime<FixedOffset>,
    pub absolute_expires_at: DateTime<FixedOffset>,
}

#[derive(Debug)]
pub enum RotationOutcome {
    Rotated(refresh_token::Model),
    /// Another request revoked the presented row first; nothing was written.
    Superseded,
}

#[derive(Clone)]
pub struct RefreshTokenDao {
    db: DatabaseConnection,
}

impl DaoBase for RefreshTokenDao {
    type Entity = RefreshToken;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl RefreshTokenDao {
    pub async fn create(&self, token: NewRefreshToken) -> DaoResult<refresh_token::Model> {
        insert_token(&self.db, token).await
    }

    pub async fn find_by_hash(&self, token_hash: &str) -> DaoResult<Option<refresh_token::Model>> {
        RefreshToken::find()
            .filter(refresh_token::Column::TokenHash.eq(token_hash))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    pub async fn find_family(&self, family_id: Uuid) -> DaoResult<Vec<refresh_token::Model>> {
        RefreshToken::find()
            .filter(refresh_token::Column::FamilyId.eq(family_id))
            .order_by_asc(refresh_token::Column::IssuedAt)
            .all(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    /// Replaces `current` with `replacement` inside one transaction.
    ///
    /// The old row is only revoked while `revoked_at IS NULL`, so of two
    /// concurrent rotations of the same row exactly one commits.
    pub async fn rotate(
        &self,
        current: &refresh_token::Model,
        replacement: NewRefreshToken,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<RotationOutcome> {
        let txn = self.db.begin().await.map_err(DaoLayerError::Db)?;

        let created = insert_token(&txn, replacement).await?;

        let updated = RefreshToken::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .col_expr(refresh_token::Column::ReplacedById, Expr::value(created.id))
            .filter(refresh_token::Column::Id.eq(current.id))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&txn)
            .await
            .map_err(DaoLayerError::Db)?;

        if updated.rows_affected == 0 {
            txn.rollback().await.map_err(DaoLayerError::Db)?;
            return Ok(RotationOutcome::Superseded);
        }

        txn.commit().await.map_err(DaoLayerError::Db)?;
        Ok(RotationOutcome::Rotated(created))
    }

    /// Revokes a single row if it is still active. Returns whether it changed.
    pub async fn revoke(&self, id: Uuid, now: DateTime<FixedOffset>) -> DaoResult<bool> {
        let result = RefreshToken::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(refresh_token::Column::Id.eq(id))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected > 0)
    }

    /// Revokes every still-active row of a family; already revoked rows keep their timestamp.
    pub async fn revoke_family(
        &self,
        family_id: Uuid,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<u64> {
        let result = RefreshToken::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(refresh_token::Column::FamilyId.eq(family_id))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    pub async fn delete_expired(&self, now: DateTime<FixedOffset>) -> DaoResult<u64> {
        let result = RefreshToken::delete_many()
            .filter(refresh_token::Column::AbsoluteExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }
}

async fn insert_token<C>(conn: &C, token: NewRefreshToken) -> DaoResult<refresh_token::Model>
where
    C: ConnectionTrait,
{
    refresh_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(token.user_id),
        token_hash: Set(token.token_hash),
        family_id: Set(token.family_id),
        issued_at: Set(token.issued_at),
        last_used_at: Set(token.issued_at),
        absolute_expires_at: Set(token.absolute_expires_at),
        revoked_at: Set(None),
        replaced_by_id: Set(None),
    }
    .insert(conn)
    .await
    .map_err(DaoLayerError::Db)
}
