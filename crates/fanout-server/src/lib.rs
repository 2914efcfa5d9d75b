//! fanout-server
//!
//! Async WebSocket fan-out hub: one hub task owning all routing state,
//! a reader and a writer task per connection, and a line-delimited JSON
//! notification RPC for backend services.

pub mod auth;
pub mod config;
pub mod connection;
pub mod hub_task;
pub mod notify;
pub mod server;
pub mod types;

// these are internal modules, not re-exported
mod acceptor;
mod rpc;

pub use auth::{AllowAll, AuthError, AuthHook, CallContext, TokenValidator};
pub use config::{Config, ConfigError};
pub use connection::ConnectionSettings;
pub use hub_task::{spawn_hub, HubHandle};
pub use notify::{NotifyError, Notifier};
pub use server::{run, Extensions, Server};
pub use types::{HubClosed, HubCommand, TrackedTasks};
