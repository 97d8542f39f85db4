//! Counter updates and lookups used by traffic accounting and agent sync
//!
//! Counter increments are issued as a single relative `UPDATE ... SET x = x + ?`
//! so concurrent reports for the same row never lose an update.

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::forward::{self, ForwardStatus};
use crate::entities::{node, tunnel, user, user_tunnel};

/// Add to a forward rule's counters. Returns false if the rule does not exist.
pub async fn add_forward_flow<C: ConnectionTrait>(
    db: &C,
    forward_id: i64,
    in_bytes: i64,
    out_bytes: i64,
) -> Result<bool, DbErr> {
    let result = forward::Entity::update_many()
        .col_expr(
            forward::Column::InFlow,
            Expr::col(forward::Column::InFlow).add(in_bytes),
        )
        .col_expr(
            forward::Column::OutFlow,
            Expr::col(forward::Column::OutFlow).add(out_bytes),
        )
        .filter(forward::Column::Id.eq(forward_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Add to an account's counters. Returns false if the account does not exist.
pub async fn add_account_flow<C: ConnectionTrait>(
    db: &C,
    account_id: i64,
    in_bytes: i64,
    out_bytes: i64,
) -> Result<bool, DbErr> {
    let result = user::Entity::update_many()
        .col_expr(
            user::Column::InFlow,
            Expr::col(user::Column::InFlow).add(in_bytes),
        )
        .col_expr(
            user::Column::OutFlow,
            Expr::col(user::Column::OutFlow).add(out_bytes),
        )
        .filter(user::Column::Id.eq(account_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Add to a tunnel assignment's counters. Returns false if the assignment does not exist.
pub async fn add_assignment_flow<C: ConnectionTrait>(
    db: &C,
    assignment_id: i64,
    in_bytes: i64,
    out_bytes: i64,
) -> Result<bool, DbErr> {
    let result = user_tunnel::Entity::update_many()
        .col_expr(
            user_tunnel::Column::InFlow,
            Expr::col(user_tunnel::Column::InFlow).add(in_bytes),
        )
        .col_expr(
            user_tunnel::Column::OutFlow,
            Expr::col(user_tunnel::Column::OutFlow).add(out_bytes),
        )
        .filter(user_tunnel::Column::Id.eq(assignment_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

pub async fn reset_forward_flow<C: ConnectionTrait>(db: &C, forward_id: i64) -> Result<bool, DbErr> {
    let result = forward::Entity::update_many()
        .col_expr(forward::Column::InFlow, Expr::value(0i64))
        .col_expr(forward::Column::OutFlow, Expr::value(0i64))
        .filter(forward::Column::Id.eq(forward_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

pub async fn reset_account_flow<C: ConnectionTrait>(db: &C, account_id: i64) -> Result<bool, DbErr> {
    let result = user::Entity::update_many()
        .col_expr(user::Column::InFlow, Expr::value(0i64))
        .col_expr(user::Column::OutFlow, Expr::value(0i64))
        .filter(user::Column::Id.eq(account_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

pub async fn reset_assignment_flow<C: ConnectionTrait>(
    db: &C,
    assignment_id: i64,
) -> Result<bool, DbErr> {
    let result = user_tunnel::Entity::update_many()
        .col_expr(user_tunnel::Column::InFlow, Expr::value(0i64))
        .col_expr(user_tunnel::Column::OutFlow, Expr::value(0i64))
        .filter(user_tunnel::Column::Id.eq(assignment_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Persist a rule's run state. Returns false if the rule does not exist.
pub async fn set_forward_status<C: ConnectionTrait>(
    db: &C,
    forward_id: i64,
    status: ForwardStatus,
) -> Result<bool, DbErr> {
    let result = forward::Entity::update_many()
        .col_expr(forward::Column::Status, Expr::value(status.to_value()))
        .filter(forward::Column::Id.eq(forward_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Every rule owned by an account, in display order
pub async fn forwards_for_account<C: ConnectionTrait>(
    db: &C,
    account_id: i64,
) -> Result<Vec<forward::Model>, DbErr> {
    forward::Entity::find()
        .filter(forward::Column::UserId.eq(account_id))
        .order_by_asc(forward::Column::SortOrder)
        .order_by_asc(forward::Column::Id)
        .all(db)
        .await
}

/// Every rule an assignment covers: the account's rules on the assigned tunnel
pub async fn forwards_for_assignment<C: ConnectionTrait>(
    db: &C,
    assignment: &user_tunnel::Model,
) -> Result<Vec<forward::Model>, DbErr> {
    forward::Entity::find()
        .filter(forward::Column::UserId.eq(assignment.user_id))
        .filter(forward::Column::TunnelId.eq(assignment.tunnel_id))
        .order_by_asc(forward::Column::SortOrder)
        .order_by_asc(forward::Column::Id)
        .all(db)
        .await
}

/// A rule together with the tunnel it runs on
pub async fn forward_with_tunnel<C: ConnectionTrait>(
    db: &C,
    forward_id: i64,
) -> Result<Option<(forward::Model, tunnel::Model)>, DbErr> {
    let found = forward::Entity::find_by_id(forward_id)
        .find_also_related(tunnel::Entity)
        .one(db)
        .await?;

    Ok(found.and_then(|(forward, tunnel)| tunnel.map(|tunnel| (forward, tunnel))))
}

/// The entry node of a tunnel
pub async fn tunnel_node<C: ConnectionTrait>(
    db: &C,
    tunnel_id: i64,
) -> Result<Option<node::Model>, DbErr> {
    let found = tunnel::Entity::find_by_id(tunnel_id)
        .find_also_related(node::Entity)
        .one(db)
        .await?;

    Ok(found.and_then(|(_, node)| node))
}

/// Resolve the node presenting a report secret
pub async fn node_by_secret<C: ConnectionTrait>(
    db: &C,
    secret: &str,
) -> Result<Option<node::Model>, DbErr> {
    node::Entity::find()
        .filter(node::Column::Secret.eq(secret))
        .one(db)
        .await
}

pub async fn active_nodes<C: ConnectionTrait>(db: &C) -> Result<Vec<node::Model>, DbErr> {
    node::Entity::find()
        .filter(node::Column::IsActive.eq(true))
        .order_by_asc(node::Column::Id)
        .all(db)
        .await
}
