//! Initial schema: accounts, nodes, tunnels, assignments, forward rules, speed limits

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(string_len(User::Username, 128).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(boolean(User::IsAdmin).not_null().default(false))
                    .col(big_integer(User::InFlow).not_null().default(0))
                    .col(big_integer(User::OutFlow).not_null().default(0))
                    .col(big_integer(User::Flow).not_null().default(0))
                    .col(big_integer(User::ExpTime).not_null().default(0))
                    .col(integer(User::Status).not_null().default(1))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(User::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Node::Table)
                    .if_not_exists()
                    .col(pk_auto(Node::Id))
                    .col(string_len(Node::Name, 128).not_null().unique_key())
                    .col(string_len(Node::ApiHost, 255).not_null())
                    .col(integer(Node::ApiPort).not_null())
                    .col(string_len(Node::ApiUsername, 128).not_null().default(""))
                    .col(string_len(Node::ApiPassword, 255).not_null().default(""))
                    .col(string_len(Node::Secret, 128).not_null().unique_key())
                    .col(boolean(Node::IsActive).not_null().default(true))
                    .col(
                        timestamp_with_time_zone(Node::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tunnel::Table)
                    .if_not_exists()
                    .col(pk_auto(Tunnel::Id))
                    .col(string_len(Tunnel::Name, 128).not_null())
                    .col(string_len(Tunnel::TcpListenAddr, 255).not_null().default("0.0.0.0"))
                    .col(string_len(Tunnel::UdpListenAddr, 255).not_null().default("0.0.0.0"))
                    .col(big_integer(Tunnel::NodeId).not_null())
                    .col(double(Tunnel::TrafficRatio).not_null().default(1.0))
                    .col(string_len(Tunnel::Protocol, 32).not_null().default("tls"))
                    .col(string_len_null(Tunnel::ChainAddr, 255))
                    .col(string_len_null(Tunnel::InterfaceName, 64))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tunnels_node_id")
                            .from(Tunnel::Table, Tunnel::NodeId)
                            .to(Node::Table, Node::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserTunnel::Table)
                    .if_not_exists()
                    .col(pk_auto(UserTunnel::Id))
                    .col(big_integer(UserTunnel::UserId).not_null())
                    .col(big_integer(UserTunnel::TunnelId).not_null())
                    .col(big_integer(UserTunnel::InFlow).not_null().default(0))
                    .col(big_integer(UserTunnel::OutFlow).not_null().default(0))
                    .col(big_integer(UserTunnel::Flow).not_null().default(0))
                    .col(big_integer(UserTunnel::ExpTime).not_null().default(0))
                    .col(integer(UserTunnel::Status).not_null().default(1))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_tunnels_user_id")
                            .from(UserTunnel::Table, UserTunnel::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_tunnels_tunnel_id")
                            .from(UserTunnel::Table, UserTunnel::TunnelId)
                            .to(Tunnel::Table, Tunnel::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SpeedLimit::Table)
                    .if_not_exists()
                    .col(pk_auto(SpeedLimit::Id))
                    .col(string_len(SpeedLimit::Name, 128).not_null())
                    .col(integer(SpeedLimit::Speed).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Forward::Table)
                    .if_not_exists()
                    .col(pk_auto(Forward::Id))
                    .col(string_len(Forward::Name, 128).not_null())
                    .col(big_integer(Forward::UserId).not_null())
                    .col(big_integer(Forward::TunnelId).not_null())
                    .col(big_integer_null(Forward::UserTunnelId))
                    .col(integer(Forward::InPort).not_null())
                    .col(text(Forward::RemoteAddr).not_null())
                    .col(string_len(Forward::ForwardType, 16).not_null().default("direct"))
                    .col(string_len_null(Forward::Strategy, 32))
                    .col(string_len_null(Forward::InterfaceName, 64))
                    .col(big_integer_null(Forward::SpeedLimitId))
                    .col(string_len(Forward::Status, 16).not_null().default("running"))
                    .col(integer(Forward::SortOrder).not_null().default(0))
                    .col(big_integer(Forward::InFlow).not_null().default(0))
                    .col(big_integer(Forward::OutFlow).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Forward::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forwards_user_id")
                            .from(Forward::Table, Forward::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_forwards_tunnel_id")
                            .from(Forward::Table, Forward::TunnelId)
                            .to(Tunnel::Table, Tunnel::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Enforcement looks rules up by account, and by account + tunnel
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_forwards_user_id_tunnel_id")
                    .table(Forward::Table)
                    .col(Forward::UserId)
                    .col(Forward::TunnelId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnels_node_id")
                    .table(Tunnel::Table)
                    .col(Tunnel::NodeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Forward::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SpeedLimit::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserTunnel::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tunnel::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Node::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    PasswordHash,
    IsAdmin,
    InFlow,
    OutFlow,
    Flow,
    ExpTime,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Node {
    #[sea_orm(iden = "nodes")]
    Table,
    Id,
    Name,
    ApiHost,
    ApiPort,
    ApiUsername,
    ApiPassword,
    Secret,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tunnel {
    #[sea_orm(iden = "tunnels")]
    Table,
    Id,
    Name,
    TcpListenAddr,
    UdpListenAddr,
    NodeId,
    TrafficRatio,
    Protocol,
    ChainAddr,
    InterfaceName,
}

#[derive(DeriveIden)]
enum UserTunnel {
    #[sea_orm(iden = "user_tunnels")]
    Table,
    Id,
    UserId,
    TunnelId,
    InFlow,
    OutFlow,
    Flow,
    ExpTime,
    Status,
}

#[derive(DeriveIden)]
enum SpeedLimit {
    #[sea_orm(iden = "speed_limits")]
    Table,
    Id,
    Name,
    Speed,
}

#[derive(DeriveIden)]
enum Forward {
    #[sea_orm(iden = "forwards")]
    Table,
    Id,
    Name,
    UserId,
    TunnelId,
    UserTunnelId,
    InPort,
    RemoteAddr,
    ForwardType,
    Strategy,
    InterfaceName,
    SpeedLimitId,
    Status,
    SortOrder,
    InFlow,
    OutFlow,
    CreatedAt,
}
