//! `box.schema` namespace

mod user;

pub use user::{SchemaUser, UserCreateOptions, UserDropOptions, UserGrantOptions, UserRevokeOptions};

use crate::connection::{Caller, Connection};
use std::sync::Arc;

/// Schema commands bound to one connection
pub struct Schema<C: ?Sized> {
    caller: Caller<C>,
}

impl<C: Connection + ?Sized> Schema<C> {
    pub(crate) fn new(caller: Caller<C>) -> Self {
        Self { caller }
    }

    /// User and privilege management
    pub fn user(&self) -> SchemaUser<C> {
        SchemaUser::new(self.caller.clone())
    }

    pub fn connection(&self) -> &Arc<C> {
        self.caller.connection()
    }
}
