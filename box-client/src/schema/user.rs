//! `box.schema.user` commands
//!
//! Each command is one call. The `if_exists` / `if_not_exists` options turn
//! exactly one engine error code into success; every other code propagates.

use crate::connection::{Caller, Connection};
use crate::context::Context;
use crate::error::{BoxError, BoxResult, ErrorCode};
use crate::privilege::{Privilege, PrivilegeType};
use crate::protocol::{decode_single, CallRequest};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

const CREATE: &str = "box.schema.user.create";
const DROP: &str = "box.schema.user.drop";
const EXISTS: &str = "box.schema.user.exists";
const PASSWD: &str = "box.schema.user.passwd";
const PASSWORD: &str = "box.schema.user.password";
const INFO: &str = "box.schema.user.info";
const GRANT: &str = "box.schema.user.grant";
const REVOKE: &str = "box.schema.user.revoke";

/// Options for [`SchemaUser::create`]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserCreateOptions {
    /// Initial password, hashed by the engine
    pub password: Option<String>,
    /// Treat "user already exists" as success
    pub if_not_exists: bool,
}

impl UserCreateOptions {
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }
}

impl fmt::Debug for UserCreateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreateOptions")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("if_not_exists", &self.if_not_exists)
            .finish()
    }
}

/// Options for [`SchemaUser::drop`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserDropOptions {
    /// Treat "no such user" as success
    pub if_exists: bool,
}

/// Options for [`SchemaUser::grant`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserGrantOptions {
    /// Treat "privilege already granted" as success
    pub if_not_exists: bool,
}

/// Options for [`SchemaUser::revoke`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserRevokeOptions {
    /// Treat "privilege not granted" as success
    pub if_exists: bool,
}

fn flag_map(key: &str, value: bool, forward: bool) -> Map<String, Value> {
    let mut map = Map::new();
    if forward {
        map.insert(key.to_string(), Value::Bool(value));
    }
    map
}

fn require_name(what: &str, value: &str) -> BoxResult<()> {
    if value.is_empty() {
        error!(what, "rejected empty argument");
        return Err(BoxError::contract(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn require_permissions(privilege: &Privilege) -> BoxResult<()> {
    if privilege.permissions.is_empty() {
        error!(
            kind = %privilege.kind,
            name = %privilege.name,
            "rejected privilege without permissions"
        );
        return Err(BoxError::contract("privilege must carry at least one permission"));
    }
    Ok(())
}

/// Swallow `expected` when the flag is set; any other outcome passes through.
fn suppress(
    result: BoxResult<()>,
    enabled: bool,
    expected: ErrorCode,
    function: &str,
) -> BoxResult<()> {
    match result {
        Err(err) if enabled && err.is_code(expected) => {
            warn!(function, code = %expected, "engine reported benign state, treating as success");
            Ok(())
        }
        other => other,
    }
}

fn already_granted_code(kind: PrivilegeType) -> ErrorCode {
    match kind {
        PrivilegeType::Role => ErrorCode::ROLE_GRANTED,
        _ => ErrorCode::PRIV_GRANTED,
    }
}

fn not_granted_code(kind: PrivilegeType) -> ErrorCode {
    match kind {
        PrivilegeType::Role => ErrorCode::ROLE_NOT_GRANTED,
        _ => ErrorCode::PRIV_NOT_GRANTED,
    }
}

/// User and privilege commands bound to one connection
pub struct SchemaUser<C: ?Sized> {
    caller: Caller<C>,
}

impl<C: Connection + ?Sized> SchemaUser<C> {
    pub(crate) fn new(caller: Caller<C>) -> Self {
        Self { caller }
    }

    pub fn connection(&self) -> &Arc<C> {
        self.caller.connection()
    }

    fn forward_flags(&self) -> bool {
        self.caller.config().forward_idempotency_flags
    }

    /// Create a user
    ///
    /// # Errors
    /// `USER_EXISTS` unless `if_not_exists` is set.
    pub async fn create(
        &self,
        ctx: &Context,
        username: &str,
        opts: UserCreateOptions,
    ) -> BoxResult<()> {
        require_name("username", username)?;

        let mut options = flag_map("if_not_exists", opts.if_not_exists, self.forward_flags());
        if let Some(password) = opts.password {
            options.insert("password".to_string(), Value::String(password));
        }
        let request = CallRequest::new(CREATE).arg(username).arg(options);

        let result = self.caller.call_typed::<()>(ctx, request).await;
        suppress(result, opts.if_not_exists, ErrorCode::USER_EXISTS, CREATE)
    }

    /// Drop a user
    ///
    /// # Errors
    /// `NO_SUCH_USER` unless `if_exists` is set.
    pub async fn drop(
        &self,
        ctx: &Context,
        username: &str,
        opts: UserDropOptions,
    ) -> BoxResult<()> {
        require_name("username", username)?;

        let options = flag_map("if_exists", opts.if_exists, self.forward_flags());
        let request = CallRequest::new(DROP).arg(username).arg(options);

        let result = self.caller.call_typed::<()>(ctx, request).await;
        suppress(result, opts.if_exists, ErrorCode::NO_SUCH_USER, DROP)
    }

    /// Whether a user with this name exists
    pub async fn exists(&self, ctx: &Context, username: &str) -> BoxResult<bool> {
        require_name("username", username)?;
        self.caller
            .call_typed(ctx, CallRequest::new(EXISTS).arg(username))
            .await
    }

    /// Change the password of the effective user of this connection
    ///
    /// # Errors
    /// `ACCESS_DENIED` when the user may not change its own password.
    pub async fn passwd(&self, ctx: &Context, new_password: &str) -> BoxResult<()> {
        self.caller
            .call_typed(ctx, CallRequest::new(PASSWD).arg(new_password))
            .await
    }

    /// Change another user's password
    ///
    /// # Errors
    /// `NO_SUCH_USER` when the target does not exist.
    pub async fn passwd_for(
        &self,
        ctx: &Context,
        username: &str,
        new_password: &str,
    ) -> BoxResult<()> {
        require_name("username", username)?;
        self.caller
            .call_typed(ctx, CallRequest::new(PASSWD).arg(username).arg(new_password))
            .await
    }

    /// Hash a plaintext password the way the engine stores it
    pub async fn password(&self, ctx: &Context, plain: &str) -> BoxResult<String> {
        require_name("password", plain)?;
        self.caller
            .call_typed(ctx, CallRequest::new(PASSWORD).arg(plain))
            .await
    }

    /// Privileges held by a user.
    ///
    /// Either the full list or an error; never a partial list.
    pub async fn info(&self, ctx: &Context, username: &str) -> BoxResult<Vec<Privilege>> {
        require_name("username", username)?;
        let data = self
            .caller
            .call(ctx, CallRequest::new(INFO).arg(username))
            .await?;
        Ok(decode_single::<Vec<Privilege>>(&data)?)
    }

    /// Grant a privilege
    ///
    /// # Errors
    /// `PRIV_GRANTED` (`ROLE_GRANTED` for roles) unless `if_not_exists` is set.
    /// A missing target object or missing rights always fail.
    pub async fn grant(
        &self,
        ctx: &Context,
        username: &str,
        privilege: &Privilege,
        opts: UserGrantOptions,
    ) -> BoxResult<()> {
        require_name("username", username)?;
        require_permissions(privilege)?;

        let [permissions, kind, name] = privilege.to_args();
        let options = flag_map("if_not_exists", opts.if_not_exists, self.forward_flags());
        let request = CallRequest::new(GRANT)
            .arg(username)
            .arg(permissions)
            .arg(kind)
            .arg(name)
            .arg(options);

        let result = self.caller.call_typed::<()>(ctx, request).await;
        suppress(result, opts.if_not_exists, already_granted_code(privilege.kind), GRANT)
    }

    /// Revoke a privilege
    ///
    /// # Errors
    /// `PRIV_NOT_GRANTED` (`ROLE_NOT_GRANTED` for roles) unless `if_exists` is set.
    /// A missing target object or missing rights always fail.
    pub async fn revoke(
        &self,
        ctx: &Context,
        username: &str,
        privilege: &Privilege,
        opts: UserRevokeOptions,
    ) -> BoxResult<()> {
        require_name("username", username)?;
        require_permissions(privilege)?;

        let [permissions, kind, name] = privilege.to_args();
        let options = flag_map("if_exists", opts.if_exists, self.forward_flags());
        let request = CallRequest::new(REVOKE)
            .arg(username)
            .arg(permissions)
            .arg(kind)
            .arg(name)
            .arg(options);

        let result = self.caller.call_typed::<()>(ctx, request).await;
        suppress(result, opts.if_exists, not_granted_code(privilege.kind), REVOKE)
    }
}
