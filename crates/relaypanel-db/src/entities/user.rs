//! Account entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `status` value of an account in good standing
pub const STATUS_ACTIVE: i32 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub username: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub is_admin: bool,

    /// Bytes uploaded through all of the account's rules
    pub in_flow: i64,

    /// Bytes downloaded through all of the account's rules
    pub out_flow: i64,

    /// Traffic budget in bytes (0 = unlimited)
    pub flow: i64,

    /// Expiry as unix seconds (0 = never)
    pub exp_time: i64,

    /// 1 = active, anything else = suspended
    pub status: i32,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::forward::Entity")]
    Forwards,

    #[sea_orm(has_many = "super::user_tunnel::Entity")]
    UserTunnels,
}

impl Related<super::forward::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Forwards.def()
    }
}

impl Related<super::user_tunnel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserTunnels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
