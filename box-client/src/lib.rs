//! Box Admin Client Library
//!
//! Typed administrative commands for a database engine reachable through a
//! call-capable connection: instance information, user and privilege
//! management, and session identity substitution.
//!
//! ## Overview
//!
//! The library offers:
//! - **Instance Info**: `box.info` decoded strictly into [`Info`]
//! - **User Management**: create, drop, exists, passwd, password hashing
//! - **Privileges**: grant, revoke and list, with idempotency options
//! - **Session Su**: switch the connection's effective principal
//!
//! The crate does not own a transport. Anything implementing [`Connection`]
//! can be wrapped in a [`BoxClient`].
//!
//! ## Usage
//!
//! ```no_run
//! use box_client::{BoxClient, BoxResult, Connection, Context};
//! use box_client::{Permission, Privilege, UserCreateOptions, UserGrantOptions};
//! use std::sync::Arc;
//!
//! async fn provision<C: Connection>(conn: Arc<C>) -> BoxResult<()> {
//!     let client = BoxClient::new(conn);
//!     let ctx = Context::background();
//!
//!     let info = client.info(&ctx).await?;
//!     println!("instance {} running {}", info.uuid, info.version);
//!
//!     let users = client.schema().user();
//!     let opts = UserCreateOptions::default().password("s3cret");
//!     users.create(&ctx, "reporter", opts).await?;
//!
//!     let read = Privilege::universe([Permission::Read]);
//!     users
//!         .grant(&ctx, "reporter", &read, UserGrantOptions::default())
//!         .await
//! }
//! ```
//!
//! The `mock` feature adds in-memory connection doubles for tests.

pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod info;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod privilege;
pub mod protocol;
pub mod schema;
pub mod session;

// Re-export main types for convenience
pub use client::BoxClient;
pub use config::BoxConfig;
pub use connection::{BoxFuture, Connection, PendingReply};
pub use context::Context;
pub use error::{BoxError, BoxResult, DecodeError, ErrorCode, RemoteCallError, TransportError};
pub use info::{Downstream, Info, InfoRequest, InfoResponse, Replica, Upstream};
pub use privilege::{Permission, Privilege, PrivilegeType};
pub use protocol::{CallRequest, FieldPath, FromReply, Response};
pub use schema::{
    Schema, SchemaUser, UserCreateOptions, UserDropOptions, UserGrantOptions, UserRevokeOptions,
};
pub use session::{Session, SuFuture, SuRequest};
