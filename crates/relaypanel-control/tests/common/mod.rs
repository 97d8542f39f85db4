//! Shared fixtures for control plane tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use relaypanel_db::entities::forward::{self, ForwardStatus, ForwardType};
use relaypanel_db::entities::{node, speed_limit, tunnel, user, user_tunnel};
use relaypanel_db::{connect, migrate};
use relaypanel_link::{AgentDispatcher, AgentEndpoint, LinkError, LinkResult};
use relaypanel_proto::AgentCommand;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

/// Dispatcher that records every command and fails for selected nodes
#[derive(Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<(i64, AgentCommand)>>,
    probes: Mutex<Vec<i64>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingDispatcher {
    pub fn fail_node(&self, node_id: i64) {
        self.failing.lock().unwrap().insert(node_id);
    }

    pub fn calls(&self) -> Vec<(i64, AgentCommand)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls().iter().map(|(_, c)| c.method()).collect()
    }

    pub fn probes(&self) -> Vec<i64> {
        self.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentDispatcher for RecordingDispatcher {
    async fn dispatch(&self, endpoint: &AgentEndpoint, command: AgentCommand) -> LinkResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.node_id, command));

        if self.failing.lock().unwrap().contains(&endpoint.node_id) {
            return Err(LinkError::Closed(format!("node {}", endpoint.node_id)));
        }
        Ok(json!({"code": 0, "msg": "OK"}))
    }

    async fn probe(&self, endpoint: &AgentEndpoint) -> LinkResult<()> {
        self.probes.lock().unwrap().push(endpoint.node_id);
        if self.failing.lock().unwrap().contains(&endpoint.node_id) {
            return Err(LinkError::Closed(format!("node {}", endpoint.node_id)));
        }
        Ok(())
    }
}

pub async fn setup_test_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    migrate(&db).await.expect("Failed to run migrations");
    db
}

pub async fn insert_user(db: &DatabaseConnection, username: &str, flow: i64) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set("hash".to_string()),
        is_admin: Set(false),
        in_flow: Set(0),
        out_flow: Set(0),
        flow: Set(flow),
        exp_time: Set(0),
        status: Set(1),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_node(db: &DatabaseConnection, name: &str, secret: &str) -> node::Model {
    node::ActiveModel {
        name: Set(name.to_string()),
        api_host: Set("127.0.0.1".to_string()),
        api_port: Set(18080),
        api_username: Set("admin".to_string()),
        api_password: Set("pw".to_string()),
        secret: Set(secret.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_tunnel(db: &DatabaseConnection, node_id: i64, ratio: f64) -> tunnel::Model {
    tunnel::ActiveModel {
        name: Set(format!("tunnel-{}", node_id)),
        tcp_listen_addr: Set("0.0.0.0".to_string()),
        udp_listen_addr: Set("0.0.0.0".to_string()),
        node_id: Set(node_id),
        traffic_ratio: Set(ratio),
        protocol: Set("tls".to_string()),
        chain_addr: Set(Some("exit.example.com:8443".to_string())),
        interface_name: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_assignment(
    db: &DatabaseConnection,
    user_id: i64,
    tunnel_id: i64,
    flow: i64,
) -> user_tunnel::Model {
    user_tunnel::ActiveModel {
        user_id: Set(user_id),
        tunnel_id: Set(tunnel_id),
        in_flow: Set(0),
        out_flow: Set(0),
        flow: Set(flow),
        exp_time: Set(0),
        status: Set(1),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_forward(
    db: &DatabaseConnection,
    user_id: i64,
    tunnel_id: i64,
    assignment_id: Option<i64>,
    forward_type: ForwardType,
) -> forward::Model {
    forward::ActiveModel {
        name: Set("rule".to_string()),
        user_id: Set(user_id),
        tunnel_id: Set(tunnel_id),
        user_tunnel_id: Set(assignment_id),
        in_port: Set(20000),
        remote_addr: Set("1.2.3.4:80,5.6.7.8:80".to_string()),
        forward_type: Set(forward_type),
        strategy: Set(None),
        interface_name: Set(None),
        speed_limit_id: Set(None),
        status: Set(ForwardStatus::Running),
        sort_order: Set(0),
        in_flow: Set(0),
        out_flow: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_speed_limit(db: &DatabaseConnection, speed: i32) -> speed_limit::Model {
    speed_limit::ActiveModel {
        name: Set(format!("{}MB", speed)),
        speed: Set(speed),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}
