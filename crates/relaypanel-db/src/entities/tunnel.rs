//! Tunnel entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tunnels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub name: String,

    /// Listen address for TCP services, e.g. `0.0.0.0`
    pub tcp_listen_addr: String,

    /// Listen address for UDP services
    pub udp_listen_addr: String,

    /// Entry node
    pub node_id: i64,

    /// Billing multiplier applied to reported traffic (<= 0 is treated as 1)
    pub traffic_ratio: f64,

    /// Dialer transport for chain forwarding (`tls`, `ws`, `quic`, ...)
    pub protocol: String,

    /// Exit relay address used by chain-forwarded rules
    pub chain_addr: Option<String>,

    pub interface_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::node::Entity",
        from = "Column::NodeId",
        to = "super::node::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Node,

    #[sea_orm(has_many = "super::forward::Entity")]
    Forwards,
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Node.def()
    }
}

impl Related<super::forward::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Forwards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
