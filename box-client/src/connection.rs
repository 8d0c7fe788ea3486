//! Connection capability
//!
//! This crate never opens sockets. It talks to whatever implements
//! [`Connection`]: a real multiplexing client, a pool, or a test double.

use crate::config::BoxConfig;
use crate::context::Context;
use crate::error::{BoxError, BoxResult, TransportError};
use crate::protocol::{CallRequest, FromReply, Response};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Boxed future returned by connections (no async_trait).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can submit a named call and hand back a pending reply.
///
/// Implementations must let many callers submit concurrently and must route
/// each reply to its own request. They make no promise about the order in
/// which concurrently submitted calls are evaluated by the engine.
pub trait Connection: Send + Sync {
    /// Submit a call. The request is in flight once this returns.
    fn submit(&self, request: CallRequest) -> PendingReply;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn submit(&self, request: CallRequest) -> PendingReply {
        (**self).submit(request)
    }
}

/// Reply handle for a submitted call
pub struct PendingReply {
    function: String,
    inner: BoxFuture<'static, Result<Response, TransportError>>,
}

impl PendingReply {
    pub fn new<F>(function: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<Response, TransportError>> + Send + 'static,
    {
        Self {
            function: function.into(),
            inner: Box::pin(fut),
        }
    }

    /// A reply that is already known
    pub fn ready(function: impl Into<String>, result: Result<Response, TransportError>) -> Self {
        Self::new(function, std::future::ready(result))
    }

    /// Name of the function this reply belongs to
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Wait for the envelope
    pub async fn get(self, ctx: &Context) -> Result<Response, TransportError> {
        ctx.run(self.inner).await?
    }

    /// Wait and return the values, turning an engine error into [`BoxError::RemoteCall`]
    pub async fn values(self, ctx: &Context) -> BoxResult<Vec<Value>> {
        let function = self.function.clone();
        let response = self.get(ctx).await?;
        response.into_result().map_err(|err| {
            debug!(function = %function, code = %err.code, "engine rejected call");
            BoxError::RemoteCall(err)
        })
    }

    /// Wait and decode the values into `T`
    pub async fn get_typed<T: FromReply>(self, ctx: &Context) -> BoxResult<T> {
        let data = self.values(ctx).await?;
        Ok(T::from_reply(&data)?)
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

/// Shared connection plus configuration, cloned into every command view
pub(crate) struct Caller<C: ?Sized> {
    conn: Arc<C>,
    config: BoxConfig,
}

impl<C: ?Sized> Clone for Caller<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            config: self.config.clone(),
        }
    }
}

impl<C: Connection + ?Sized> Caller<C> {
    pub(crate) fn new(conn: Arc<C>, config: BoxConfig) -> Self {
        Self { conn, config }
    }

    pub(crate) fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    pub(crate) fn config(&self) -> &BoxConfig {
        &self.config
    }

    /// Submit without waiting; the context that should govern the wait is returned alongside
    pub(crate) fn submit(&self, ctx: &Context, request: CallRequest) -> (PendingReply, Context) {
        // Arguments may carry credentials, so only their count is logged.
        debug!(
            function = request.function(),
            args = request.args().len(),
            "submitting call"
        );
        let ctx = ctx.or_timeout(self.config.call_timeout);
        (self.conn.submit(request), ctx)
    }

    pub(crate) async fn call(&self, ctx: &Context, request: CallRequest) -> BoxResult<Vec<Value>> {
        let (pending, ctx) = self.submit(ctx, request);
        pending.values(&ctx).await
    }

    pub(crate) async fn call_typed<T: FromReply>(
        &self,
        ctx: &Context,
        request: CallRequest,
    ) -> BoxResult<T> {
        let (pending, ctx) = self.submit(ctx, request);
        pending.get_typed(&ctx).await
    }
}
