use sea_orm::entity::prelude::*;

/// One link in a session family's chain of renewals.
///
/// Only the peppered SHA-256 of the opaque value is stored. A non-null
/// `revoked_at` marks the row terminal; `replaced_by_id` tells a rotation
/// apart from an explicit revocation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub token_hash: String,
    #[sea_orm(indexed)]
    pub family_id: Uuid,
    pub issued_at: DateTimeWithTimeZone,
    pub last_used_at: DateTimeWithTimeZone,
    pub absolute_expires_at: DateTimeWithTimeZone,
    pub revoked_at: Option<DateTimeWithTimeZone>,
    pub replaced_by_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ReplacedById",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    ReplacedBy,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn was_rotated(&self) -> bool {
        self.replaced_by_id.is_some()
    }
}
