//! Session identity substitution (`box.session.su`)
//!
//! # Shared state hazard
//!
//! A successful `su` changes the effective principal of the *connection*, not
//! of the caller. Every later request on that connection, from any facade or
//! task sharing it, runs as the new principal until another `su` is issued.
//! The connection does not order concurrently submitted requests, so callers
//! that mix `su` with other traffic on one connection must serialize it
//! themselves. Nothing here locks, caches or rolls back that state.

use crate::connection::{Caller, Connection, PendingReply};
use crate::context::Context;
use crate::error::{BoxError, BoxResult};
use crate::protocol::CallRequest;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const SU: &str = "box.session.su";

/// Substitution request: a principal, optionally with a call to run as it
#[derive(Debug, Clone, PartialEq)]
pub struct SuRequest {
    principal: String,
    call: Option<(String, Vec<Value>)>,
}

impl SuRequest {
    /// Plain substitution for the rest of the connection's lifetime
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            call: None,
        }
    }

    /// Run `function` as the principal and revert afterwards.
    ///
    /// Not supported: [`Session::su`] rejects this shape with
    /// [`BoxError::Unsupported`] and sends nothing.
    pub fn call(mut self, function: impl Into<String>, args: Vec<Value>) -> Self {
        self.call = Some((function.into(), args));
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn is_combined(&self) -> bool {
        self.call.is_some()
    }
}

/// Pending outcome of a submitted substitution.
///
/// Dropping it does not undo anything: the request is already on its way.
#[derive(Debug)]
pub struct SuFuture {
    pending: PendingReply,
    ctx: Context,
}

impl SuFuture {
    /// Wait for the engine's verdict and return whatever it sent back
    pub async fn get(self) -> BoxResult<Vec<Value>> {
        self.pending.values(&self.ctx).await
    }
}

/// Session commands bound to one connection
pub struct Session<C: ?Sized> {
    caller: Caller<C>,
}

impl<C: Connection + ?Sized> Session<C> {
    pub(crate) fn new(caller: Caller<C>) -> Self {
        Self { caller }
    }

    pub fn connection(&self) -> &Arc<C> {
        self.caller.connection()
    }

    /// Switch the connection's effective principal.
    ///
    /// Returns once the request is submitted; await [`SuFuture::get`] for the
    /// result. The context bounds only that wait.
    ///
    /// # Errors
    /// - [`BoxError::Unsupported`] for the combined form
    /// - [`BoxError::ContractViolation`] for an empty principal
    pub fn su(&self, ctx: &Context, request: SuRequest) -> BoxResult<SuFuture> {
        if let Some((function, _)) = &request.call {
            warn!(
                principal = %request.principal,
                function = %function,
                "combined su is not supported"
            );
            return Err(BoxError::unsupported(format!(
                "su with call '{}' is not supported, only plain substitution",
                function
            )));
        }
        if request.principal.is_empty() {
            return Err(BoxError::contract("principal must not be empty"));
        }

        debug!(principal = %request.principal, "substituting session principal");
        let (pending, ctx) = self
            .caller
            .submit(ctx, CallRequest::new(SU).arg(request.principal));
        Ok(SuFuture { pending, ctx })
    }
}
