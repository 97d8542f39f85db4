//! Node entity: one relay host running an agent

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub name: String,

    /// Host of the agent's control API
    pub api_host: String,

    pub api_port: i32,

    pub api_username: String,

    #[serde(skip_serializing)]
    pub api_password: String,

    /// Pre-shared secret the agent presents when uploading usage reports
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub secret: String,

    pub is_active: bool,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Tunnels whose entry side runs on this node
    #[sea_orm(has_many = "super::tunnel::Entity")]
    Tunnels,
}

impl Related<super::tunnel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tunnels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
