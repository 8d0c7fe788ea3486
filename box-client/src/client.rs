//! Entry point bound to one connection

use crate::config::BoxConfig;
use crate::connection::{Caller, Connection};
use crate::context::Context;
use crate::error::BoxResult;
use crate::info::{Info, InfoRequest, InfoResponse};
use crate::schema::Schema;
use crate::session::Session;
use std::sync::Arc;

/// Administrative facade over a shared connection
///
/// Views returned by [`schema`](Self::schema) and [`session`](Self::session)
/// are cheap clones of the same connection handle. Building them does no I/O
/// and cannot fail. Several clients may share one connection; see
/// [`crate::session`] for what that means for `su`.
pub struct BoxClient<C: ?Sized = dyn Connection> {
    caller: Caller<C>,
}

impl<C: ?Sized> Clone for BoxClient<C> {
    fn clone(&self) -> Self {
        Self {
            caller: self.caller.clone(),
        }
    }
}

impl<C: Connection + ?Sized> BoxClient<C> {
    /// Bind to a connection with the default configuration
    pub fn new(conn: Arc<C>) -> Self {
        Self::with_config(conn, BoxConfig::default())
    }

    pub fn with_config(conn: Arc<C>, config: BoxConfig) -> Self {
        Self {
            caller: Caller::new(conn, config),
        }
    }

    pub fn connection(&self) -> &Arc<C> {
        self.caller.connection()
    }

    pub fn config(&self) -> &BoxConfig {
        self.caller.config()
    }

    /// Fetch instance information. Never cached.
    pub async fn info(&self, ctx: &Context) -> BoxResult<Info> {
        let resp: InfoResponse = self.caller.call_typed(ctx, InfoRequest::new().into()).await?;
        Ok(resp.info)
    }

    pub fn schema(&self) -> Schema<C> {
        Schema::new(self.caller.clone())
    }

    pub fn session(&self) -> Session<C> {
        Session::new(self.caller.clone())
    }
}
