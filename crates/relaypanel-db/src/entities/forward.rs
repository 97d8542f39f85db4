//! Forward rule entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a rule reaches its targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ForwardType {
    /// The entry node dials the targets itself
    #[sea_orm(string_value = "direct")]
    Direct,

    /// Traffic is relayed through the tunnel's exit node
    #[sea_orm(string_value = "chain")]
    Chain,
}

/// Whether the rule's services are deployed on the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ForwardStatus {
    #[sea_orm(string_value = "running")]
    Running,

    #[sea_orm(string_value = "paused")]
    Paused,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forwards")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub name: String,

    /// Owning account
    pub user_id: i64,

    pub tunnel_id: i64,

    /// Tunnel assignment the rule is billed against, if any
    pub user_tunnel_id: Option<i64>,

    /// Listen port on the entry node
    pub in_port: i32,

    /// Comma-separated `host:port` targets
    pub remote_addr: String,

    pub forward_type: ForwardType,

    /// Target selection strategy (agent default when unset)
    pub strategy: Option<String>,

    pub interface_name: Option<String>,

    pub speed_limit_id: Option<i64>,

    pub status: ForwardStatus,

    pub sort_order: i32,

    pub in_flow: i64,

    pub out_flow: i64,

    pub created_at: ChronoDateTimeUtc,
}

impl Model {
    /// Base name of the rule's agent services: `{id}_{user_id}_{user_tunnel_id or 0}`
    pub fn service_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.id,
            self.user_id,
            self.user_tunnel_id.unwrap_or(0)
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::tunnel::Entity",
        from = "Column::TunnelId",
        to = "super::tunnel::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Tunnel,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::tunnel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tunnel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
