//! Database entities

pub mod forward;
pub mod node;
pub mod speed_limit;
pub mod tunnel;
pub mod user;
pub mod user_tunnel;

pub use forward::Entity as Forward;
pub use node::Entity as Node;
pub use speed_limit::Entity as SpeedLimit;
pub use tunnel::Entity as Tunnel;
pub use user::Entity as User;
pub use user_tunnel::Entity as UserTunnel;

pub mod prelude {
    pub use super::forward::Entity as Forward;
    pub use super::node::Entity as Node;
    pub use super::speed_limit::Entity as SpeedLimit;
    pub use super::tunnel::Entity as Tunnel;
    pub use super::user::Entity as User;
    pub use super::user_tunnel::Entity as UserTunnel;
}
