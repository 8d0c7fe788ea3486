//! Privilege values shared by grant, revoke and the privilege listing

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// A capability granted over an object.
///
/// Variant order is the canonical serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Execute,
    Session,
    Usage,
    Create,
    Drop,
    Alter,
    Reference,
    Trigger,
    Insert,
    Update,
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 13] = [
        Permission::Read,
        Permission::Write,
        Permission::Execute,
        Permission::Session,
        Permission::Usage,
        Permission::Create,
        Permission::Drop,
        Permission::Alter,
        Permission::Reference,
        Permission::Trigger,
        Permission::Insert,
        Permission::Update,
        Permission::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Execute => "execute",
            Permission::Session => "session",
            Permission::Usage => "usage",
            Permission::Create => "create",
            Permission::Drop => "drop",
            Permission::Alter => "alter",
            Permission::Reference => "reference",
            Permission::Trigger => "trigger",
            Permission::Insert => "insert",
            Permission::Update => "update",
            Permission::Delete => "delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of object a privilege applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeType {
    Universe,
    Space,
    Function,
    Sequence,
    Role,
    User,
    LuaEval,
    LuaCall,
    Sql,
}

impl PrivilegeType {
    pub const ALL: [PrivilegeType; 9] = [
        PrivilegeType::Universe,
        PrivilegeType::Space,
        PrivilegeType::Function,
        PrivilegeType::Sequence,
        PrivilegeType::Role,
        PrivilegeType::User,
        PrivilegeType::LuaEval,
        PrivilegeType::LuaCall,
        PrivilegeType::Sql,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrivilegeType::Universe => "universe",
            PrivilegeType::Space => "space",
            PrivilegeType::Function => "function",
            PrivilegeType::Sequence => "sequence",
            PrivilegeType::Role => "role",
            PrivilegeType::User => "user",
            PrivilegeType::LuaEval => "lua_eval",
            PrivilegeType::LuaCall => "lua_call",
            PrivilegeType::Sql => "sql",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for PrivilegeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions over one object, or over every object of a kind when `name`
/// is empty.
///
/// The same value is sent by grant/revoke and returned by the listing, so
/// equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Privilege {
    pub permissions: BTreeSet<Permission>,
    pub kind: PrivilegeType,
    pub name: String,
}

impl Privilege {
    pub fn new(
        permissions: impl IntoIterator<Item = Permission>,
        kind: PrivilegeType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
            kind,
            name: name.into(),
        }
    }

    /// Permissions over the whole instance
    pub fn universe(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::new(permissions, PrivilegeType::Universe, "")
    }

    /// Membership in a role
    pub fn role(name: impl Into<String>) -> Self {
        Self::new([Permission::Execute], PrivilegeType::Role, name)
    }

    pub fn is_universal(&self) -> bool {
        self.name.is_empty()
    }

    /// Comma-separated permissions in canonical order, e.g. `read,write`
    pub fn permissions_string(&self) -> String {
        self.permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The three positional arguments of grant/revoke; an empty name is sent as nil
    pub fn to_args(&self) -> [Value; 3] {
        let name = if self.name.is_empty() {
            Value::Null
        } else {
            Value::String(self.name.clone())
        };
        [
            Value::String(self.permissions_string()),
            Value::String(self.kind.as_str().to_string()),
            name,
        ]
    }
}

/// Comma-separated permission list as it appears on the wire
struct PermissionList(BTreeSet<Permission>);

impl<'de> Deserialize<'de> for PermissionList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                Permission::from_name(token).ok_or_else(|| {
                    de::Error::invalid_value(Unexpected::Str(token), &"a permission name")
                })
            })
            .collect::<Result<_, _>>()
            .map(PermissionList)
    }
}

impl<'de> Deserialize<'de> for Privilege {
    /// Decodes the listing triple `[permissions, kind, name]`
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (PermissionList(permissions), kind, name) =
            <(PermissionList, PrivilegeType, Option<String>)>::deserialize(deserializer)?;
        Ok(Self {
            permissions,
            kind,
            name: name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_value, FieldPath};
    use serde_json::json;

    #[test]
    fn test_names_round_trip() {
        for p in Permission::ALL {
            assert_eq!(Permission::from_name(p.as_str()), Some(p));
        }
        for t in PrivilegeType::ALL {
            assert_eq!(PrivilegeType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(Permission::from_name("fly"), None);
    }

    #[test]
    fn test_canonical_permission_order() {
        let a = Privilege::new(
            [Permission::Write, Permission::Read, Permission::Execute],
            PrivilegeType::Space,
            "s",
        );
        let b = Privilege::new(
            [Permission::Execute, Permission::Write, Permission::Read],
            PrivilegeType::Space,
            "s",
        );
        assert_eq!(a, b);
        assert_eq!(a.permissions_string(), "read,write,execute");
    }

    #[test]
    fn test_to_args() {
        let p = Privilege::new([Permission::Read], PrivilegeType::Space, "space1");
        assert_eq!(p.to_args(), [json!("read"), json!("space"), json!("space1")]);

        let p = Privilege::universe([Permission::Usage, Permission::Session]);
        assert!(p.is_universal());
        assert_eq!(p.to_args(), [json!("session,usage"), json!("universe"), json!(null)]);
    }

    #[test]
    fn test_decode_listing_entry() {
        let p: Privilege = serde_json::from_value(json!(["execute", "role", "public"])).unwrap();
        assert_eq!(p, Privilege::role("public"));

        // Server order and an empty name both normalize.
        let p: Privilege =
            serde_json::from_value(json!(["usage,session", "universe", ""])).unwrap();
        assert_eq!(p, Privilege::universe([Permission::Session, Permission::Usage]));

        let p: Privilege = serde_json::from_value(json!(["read", "space", null])).unwrap();
        assert_eq!(p.name, "");

        let p: Privilege = serde_json::from_value(json!(["read", "lua_eval", null])).unwrap();
        assert_eq!(p.kind, PrivilegeType::LuaEval);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let root = FieldPath::root().index(0).index(1);

        let err = decode_value::<Privilege>(&json!(["read", "space"]), &root).unwrap_err();
        assert_eq!(err.path, "$[0][1]");
        assert!(err.reason.contains("invalid length 2"), "{}", err.reason);

        let err = decode_value::<Privilege>(&json!(["read,fly", "space", "s"]), &root).unwrap_err();
        assert_eq!(err.path, "$[0][1][0]");
        assert!(err.reason.contains("\"fly\""), "{}", err.reason);

        let err = decode_value::<Privilege>(&json!(["read", "galaxy", "s"]), &root).unwrap_err();
        assert_eq!(err.path, "$[0][1][1]");

        let err = decode_value::<Privilege>(&json!(["read", "space", 5]), &root).unwrap_err();
        assert_eq!(err.path, "$[0][1][2]");
    }
}
