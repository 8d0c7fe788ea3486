use crate::connection::{Connection, PendingReply};
use crate::error::{ErrorCode, RemoteCallError, TransportError};
use crate::privilege::{Permission, Privilege, PrivilegeType};
use crate::protocol::{CallRequest, Response};
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const DEFAULT_UUID: &str = "0d5bd431-7f89-4968-82e3-8e4c1f4de2c5";
const DEFAULT_VERSION: &str = "2.11.1-0-fake";
const BAD_CREDENTIALS: &str = "User not found or supplied credentials are invalid";

type Grants = BTreeMap<(PrivilegeType, String), BTreeSet<Permission>>;
type CallResult = Result<Vec<Value>, RemoteCallError>;

struct Principal {
    role: bool,
    password: Option<String>,
    grants: Grants,
}

impl Principal {
    fn user(password: Option<String>) -> Self {
        let mut grants = Grants::new();
        grants.insert((PrivilegeType::Role, "public".to_string()), [Permission::Execute].into());
        grants.insert(
            (PrivilegeType::Universe, String::new()),
            [Permission::Session, Permission::Usage].into(),
        );
        Self {
            role: false,
            password,
            grants,
        }
    }

    fn role() -> Self {
        Self {
            role: true,
            password: None,
            grants: Grants::new(),
        }
    }
}

struct EngineState {
    uuid: String,
    version: String,
    lsn: u64,
    principals: BTreeMap<String, Principal>,
    spaces: BTreeSet<String>,
    functions: BTreeSet<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fail(code: ErrorCode, message: impl Into<String>) -> RemoteCallError {
    RemoteCallError::new(code, message)
}

fn arg_str<'a>(args: &'a [Value], index: usize, what: &str) -> Result<&'a str, RemoteCallError> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        fail(
            ErrorCode::ILLEGAL_PARAMS,
            format!("Illegal parameters, {} should be a string", what),
        )
    })
}

fn arg_opts(args: &[Value], index: usize) -> Result<Option<&Map<String, Value>>, RemoteCallError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(fail(
            ErrorCode::ILLEGAL_PARAMS,
            "Illegal parameters, options should be a table",
        )),
    }
}

fn flag(opts: Option<&Map<String, Value>>, key: &str) -> bool {
    opts.and_then(|m| m.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn hash_password(plain: &str) -> String {
    let mut hasher = DefaultHasher::new();
    "box-fake-salt".hash(&mut hasher);
    plain.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn describe(kind: PrivilegeType, name: &str) -> String {
    format!("{} '{}'", kind, name)
}

impl EngineState {
    fn is_user(&self, name: &str) -> bool {
        self.principals.get(name).is_some_and(|p| !p.role)
    }

    fn is_role(&self, name: &str) -> bool {
        self.principals.get(name).is_some_and(|p| p.role)
    }

    /// Universe permissions including those inherited through directly granted roles
    fn universe(&self, name: &str) -> BTreeSet<Permission> {
        let mut perms = BTreeSet::new();
        let Some(principal) = self.principals.get(name) else {
            return perms;
        };
        for ((kind, object), granted) in &principal.grants {
            match kind {
                PrivilegeType::Universe => perms.extend(granted.iter().copied()),
                PrivilegeType::Role => {
                    let universe = (PrivilegeType::Universe, String::new());
                    if let Some(inherited) = self
                        .principals
                        .get(object)
                        .and_then(|role| role.grants.get(&universe))
                    {
                        perms.extend(inherited.iter().copied());
                    }
                }
                _ => {}
            }
        }
        perms
    }

    fn is_super(&self, name: &str) -> bool {
        self.principals
            .get(name)
            .is_some_and(|p| p.grants.contains_key(&(PrivilegeType::Role, "super".to_string())))
            || name == "admin"
    }

    fn require(
        &self,
        actor: &str,
        perm: Permission,
        action: &str,
        object: &str,
    ) -> Result<(), RemoteCallError> {
        if self.is_super(actor) || self.universe(actor).contains(&perm) {
            return Ok(());
        }
        Err(fail(
            ErrorCode::ACCESS_DENIED,
            format!("{} access to {} is denied for user '{}'", action, object, actor),
        ))
    }

    fn require_super(
        &self,
        actor: &str,
        action: &str,
        object: &str,
    ) -> Result<(), RemoteCallError> {
        if self.is_super(actor) {
            return Ok(());
        }
        Err(fail(
            ErrorCode::ACCESS_DENIED,
            format!("{} access to {} is denied for user '{}'", action, object, actor),
        ))
    }

    fn dispatch(&mut self, actor: &mut String, request: &CallRequest) -> CallResult {
        let args = request.args();
        match request.function() {
            "box.info" => Ok(vec![self.info()]),
            "box.schema.user.create" => self.create(actor, args),
            "box.schema.user.drop" => self.drop_user(actor, args),
            "box.schema.user.exists" => {
                let name = arg_str(args, 0, "name")?;
                Ok(vec![Value::Bool(self.is_user(name))])
            }
            "box.schema.user.passwd" => self.passwd(actor, args),
            "box.schema.user.password" => {
                let plain = arg_str(args, 0, "password")?;
                Ok(vec![Value::String(hash_password(plain))])
            }
            "box.schema.user.info" => self.user_info(args),
            "box.schema.user.grant" => self.grant(actor, args),
            "box.schema.user.revoke" => self.revoke(actor, args),
            "box.session.su" => self.su(actor, args),
            other => Err(fail(
                ErrorCode::NO_SUCH_PROC,
                format!("Procedure '{}' is not defined", other),
            )),
        }
    }

    fn info(&self) -> Value {
        json!({
            "version": self.version,
            "id": 1,
            "ro": false,
            "uuid": self.uuid,
            "pid": std::process::id(),
            "status": "running",
            "lsn": self.lsn,
            "replication": {
                "1": {"id": 1, "uuid": self.uuid, "lsn": self.lsn}
            }
        })
    }

    fn create(&mut self, actor: &str, args: &[Value]) -> CallResult {
        let name = arg_str(args, 0, "name")?;
        let opts = arg_opts(args, 1)?;

        if self.principals.contains_key(name) {
            if flag(opts, "if_not_exists") {
                return Ok(Vec::new());
            }
            return Err(fail(ErrorCode::USER_EXISTS, format!("User '{}' already exists", name)));
        }
        self.require(actor, Permission::Create, "Create", "user ''")?;

        let password = opts
            .and_then(|m| m.get("password"))
            .and_then(Value::as_str)
            .map(str::to_string);
        self.principals.insert(name.to_string(), Principal::user(password));
        self.lsn += 1;
        Ok(Vec::new())
    }

    fn drop_user(&mut self, actor: &str, args: &[Value]) -> CallResult {
        let name = arg_str(args, 0, "name")?;
        let opts = arg_opts(args, 1)?;

        if !self.is_user(name) {
            if flag(opts, "if_exists") {
                return Ok(Vec::new());
            }
            return Err(fail(ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", name)));
        }
        if name == "admin" || name == "guest" {
            return Err(fail(
                ErrorCode::DROP_USER,
                format!("Failed to drop user or role '{}': the user or the role is a system", name),
            ));
        }
        self.require(actor, Permission::Drop, "Drop", &format!("user '{}'", name))?;

        self.principals.remove(name);
        for principal in self.principals.values_mut() {
            principal.grants.remove(&(PrivilegeType::User, name.to_string()));
        }
        self.lsn += 1;
        Ok(Vec::new())
    }

    fn passwd(&mut self, actor: &str, args: &[Value]) -> CallResult {
        let (target, password) = match args.len() {
            1 => (actor.to_string(), arg_str(args, 0, "password")?),
            2 => (arg_str(args, 0, "name")?.to_string(), arg_str(args, 1, "password")?),
            _ => {
                return Err(fail(
                    ErrorCode::ILLEGAL_PARAMS,
                    "Usage: box.schema.user.passwd([user,] password)",
                ))
            }
        };

        if !self.is_user(&target) {
            return Err(fail(ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", target)));
        }
        self.require(actor, Permission::Alter, "Alter", &format!("user '{}'", target))?;

        if let Some(principal) = self.principals.get_mut(&target) {
            principal.password = Some(password.to_string());
        }
        self.lsn += 1;
        Ok(Vec::new())
    }

    fn user_info(&self, args: &[Value]) -> CallResult {
        let name = arg_str(args, 0, "name")?;
        let principal = self
            .principals
            .get(name)
            .ok_or_else(|| fail(ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", name)))?;

        let listing: Vec<Value> = principal
            .grants
            .iter()
            .map(|((kind, object), perms)| {
                let privilege = Privilege::new(perms.iter().copied(), *kind, object.clone());
                let [perms, kind, object] = privilege.to_args();
                // The engine reports universal grants with an empty name rather than nil.
                let object = if object.is_null() { json!("") } else { object };
                json!([perms, kind, object])
            })
            .collect();
        Ok(vec![Value::Array(listing)])
    }

    /// Shared validation of grant/revoke: grantee, privilege and target object
    fn resolve_privilege(&self, args: &[Value]) -> Result<(String, Privilege), RemoteCallError> {
        let grantee = arg_str(args, 0, "user")?;
        if !self.is_user(grantee) {
            return Err(fail(ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", grantee)));
        }

        let raw = arg_str(args, 1, "privileges")?;
        let mut permissions = BTreeSet::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let perm = Permission::from_name(token).ok_or_else(|| {
                fail(ErrorCode::ILLEGAL_PARAMS, format!("Unknown privilege '{}'", token))
            })?;
            permissions.insert(perm);
        }
        if permissions.is_empty() {
            return Err(fail(ErrorCode::ILLEGAL_PARAMS, "Illegal parameters, privileges are empty"));
        }

        let kind_name = arg_str(args, 2, "object type")?;
        let kind = PrivilegeType::from_name(kind_name).ok_or_else(|| {
            fail(
                ErrorCode::UNSUPPORTED,
                format!("Unknown object type '{}'", kind_name),
            )
        })?;

        let object = match args.get(3) {
            None | Some(Value::Null) => String::new(),
            Some(_) => arg_str(args, 3, "object name")?.to_string(),
        };
        let object = match kind {
            PrivilegeType::Universe => String::new(),
            _ => object,
        };

        if !object.is_empty() {
            let missing = match kind {
                PrivilegeType::Space if !self.spaces.contains(&object) => {
                    Some((ErrorCode::NO_SUCH_SPACE, format!("Space '{}' does not exist", object)))
                }
                PrivilegeType::Function if !self.functions.contains(&object) => Some((
                    ErrorCode::NO_SUCH_FUNCTION,
                    format!("Function '{}' does not exist", object),
                )),
                PrivilegeType::Role if !self.is_role(&object) => {
                    Some((ErrorCode::NO_SUCH_ROLE, format!("Role '{}' is not found", object)))
                }
                PrivilegeType::User if !self.is_user(&object) => {
                    Some((ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", object)))
                }
                _ => None,
            };
            if let Some((code, message)) = missing {
                return Err(fail(code, message));
            }
        }

        Ok((grantee.to_string(), Privilege::new(permissions, kind, object)))
    }

    fn held(&self, grantee: &str, privilege: &Privilege) -> BTreeSet<Permission> {
        self.principals
            .get(grantee)
            .and_then(|p| p.grants.get(&(privilege.kind, privilege.name.clone())))
            .cloned()
            .unwrap_or_default()
    }

    fn grant(&mut self, actor: &str, args: &[Value]) -> CallResult {
        let (grantee, privilege) = self.resolve_privilege(args)?;
        let opts = arg_opts(args, 4)?;

        if self.held(&grantee, &privilege).is_superset(&privilege.permissions) {
            if flag(opts, "if_not_exists") {
                return Ok(Vec::new());
            }
            return Err(match privilege.kind {
                PrivilegeType::Role => fail(
                    ErrorCode::ROLE_GRANTED,
                    format!("User '{}' already has role '{}'", grantee, privilege.name),
                ),
                _ => fail(
                    ErrorCode::PRIV_GRANTED,
                    format!(
                        "User '{}' already has {} access on {}",
                        grantee,
                        privilege.permissions_string(),
                        describe(privilege.kind, &privilege.name)
                    ),
                ),
            });
        }
        self.require_super(actor, "Grant", &describe(privilege.kind, &privilege.name))?;

        if let Some(principal) = self.principals.get_mut(&grantee) {
            principal
                .grants
                .entry((privilege.kind, privilege.name.clone()))
                .or_default()
                .extend(privilege.permissions.iter().copied());
        }
        self.lsn += 1;
        Ok(Vec::new())
    }

    fn revoke(&mut self, actor: &str, args: &[Value]) -> CallResult {
        let (grantee, privilege) = self.resolve_privilege(args)?;
        let opts = arg_opts(args, 4)?;

        if !self.held(&grantee, &privilege).is_superset(&privilege.permissions) {
            if flag(opts, "if_exists") {
                return Ok(Vec::new());
            }
            return Err(match privilege.kind {
                PrivilegeType::Role => fail(
                    ErrorCode::ROLE_NOT_GRANTED,
                    format!("User '{}' does not have role '{}'", grantee, privilege.name),
                ),
                _ => fail(
                    ErrorCode::PRIV_NOT_GRANTED,
                    format!(
                        "User '{}' does not have {} access on {}",
                        grantee,
                        privilege.permissions_string(),
                        describe(privilege.kind, &privilege.name)
                    ),
                ),
            });
        }
        self.require_super(actor, "Revoke", &describe(privilege.kind, &privilege.name))?;

        if let Some(principal) = self.principals.get_mut(&grantee) {
            let key = (privilege.kind, privilege.name.clone());
            if let Some(held) = principal.grants.get_mut(&key) {
                held.retain(|p| !privilege.permissions.contains(p));
                if held.is_empty() {
                    principal.grants.remove(&key);
                }
            }
        }
        self.lsn += 1;
        Ok(Vec::new())
    }

    fn su(&mut self, actor: &mut String, args: &[Value]) -> CallResult {
        if args.len() != 1 {
            return Err(fail(
                ErrorCode::UNSUPPORTED,
                "box.session.su with a function is not available over this connection",
            ));
        }
        let target = arg_str(args, 0, "user")?;
        if !self.is_user(target) {
            return Err(fail(ErrorCode::NO_SUCH_USER, format!("User '{}' is not found", target)));
        }
        self.require(actor, Permission::Execute, "Session su", &format!("user '{}'", target))?;

        *actor = target.to_string();
        Ok(Vec::new())
    }
}

/// In-memory engine double
///
/// Starts with the `guest` and `admin` users and the `public`, `super` and
/// `replication` roles. Each [`FakeConnection`] tracks its own effective
/// principal, so `su` on one connection is invisible to the others.
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        let mut principals = BTreeMap::new();

        principals.insert("guest".to_string(), Principal::user(None));

        let mut admin = Principal::user(None);
        admin.grants.clear();
        admin
            .grants
            .insert((PrivilegeType::Universe, String::new()), Permission::ALL.into());
        principals.insert("admin".to_string(), admin);

        principals.insert("public".to_string(), Principal::role());
        principals.insert("replication".to_string(), Principal::role());
        let mut super_role = Principal::role();
        super_role
            .grants
            .insert((PrivilegeType::Universe, String::new()), Permission::ALL.into());
        principals.insert("super".to_string(), super_role);

        Self {
            state: Arc::new(Mutex::new(EngineState {
                uuid: DEFAULT_UUID.to_string(),
                version: DEFAULT_VERSION.to_string(),
                lsn: 0,
                principals,
                spaces: BTreeSet::new(),
                functions: BTreeSet::new(),
            })),
        }
    }

    pub fn with_uuid(self, uuid: impl Into<String>) -> Self {
        lock(&self.state).uuid = uuid.into();
        self
    }

    pub fn with_space(self, name: impl Into<String>) -> Self {
        lock(&self.state).spaces.insert(name.into());
        self
    }

    pub fn with_function(self, name: impl Into<String>) -> Self {
        lock(&self.state).functions.insert(name.into());
        self
    }

    pub fn with_role(self, name: impl Into<String>) -> Self {
        lock(&self.state)
            .principals
            .insert(name.into(), Principal::role());
        self
    }

    /// Add a user with the default grants plus `privileges`
    pub fn with_user(
        self,
        name: impl Into<String>,
        password: impl Into<String>,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        let mut user = Principal::user(Some(password.into()));
        for privilege in privileges {
            user.grants
                .entry((privilege.kind, privilege.name))
                .or_default()
                .extend(privilege.permissions);
        }
        lock(&self.state).principals.insert(name.into(), user);
        self
    }

    /// Open a connection authenticated as `user`
    pub fn connect(
        &self,
        user: &str,
        password: &str,
    ) -> Result<Arc<FakeConnection>, RemoteCallError> {
        let state = lock(&self.state);
        let principal = state
            .principals
            .get(user)
            .filter(|p| !p.role)
            .ok_or_else(|| fail(ErrorCode::CREDS_MISMATCH, BAD_CREDENTIALS))?;

        let matches = match &principal.password {
            Some(stored) => stored == password,
            None => password.is_empty(),
        };
        if !matches {
            return Err(fail(ErrorCode::CREDS_MISMATCH, BAD_CREDENTIALS));
        }
        if !state.is_super(user) && !state.universe(user).contains(&Permission::Session) {
            return Err(fail(
                ErrorCode::ACCESS_DENIED,
                format!("Session access to universe '' is denied for user '{}'", user),
            ));
        }
        drop(state);

        debug!(user, "fake connection opened");
        Ok(Arc::new(FakeConnection {
            engine: self.clone(),
            principal: Mutex::new(user.to_string()),
            closed: AtomicBool::new(false),
        }))
    }

    /// Open a connection as `guest`
    pub fn connect_guest(&self) -> Result<Arc<FakeConnection>, RemoteCallError> {
        self.connect("guest", "")
    }

    pub fn uuid(&self) -> String {
        lock(&self.state).uuid.clone()
    }
}

/// Connection to a [`FakeEngine`]
pub struct FakeConnection {
    engine: FakeEngine,
    principal: Mutex<String>,
    closed: AtomicBool,
}

impl FakeConnection {
    /// Effective principal of this connection
    pub fn principal(&self) -> String {
        lock(&self.principal).clone()
    }

    /// Every later submit fails with [`TransportError::Closed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Connection for FakeConnection {
    fn submit(&self, request: CallRequest) -> PendingReply {
        let function = request.function().to_string();
        if self.closed.load(Ordering::SeqCst) {
            return PendingReply::ready(function, Err(TransportError::Closed));
        }

        let mut principal = lock(&self.principal);
        let result = lock(&self.engine.state).dispatch(&mut principal, &request);
        let response = match result {
            Ok(data) => Response::success(data),
            Err(err) => Response::Error { error: err },
        };
        PendingReply::ready(function, Ok(response))
    }
}
