//! Instance information (`box.info`)

use crate::error::DecodeError;
use crate::protocol::{decode_single, CallRequest, FromReply};
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub(crate) const INFO_FUNCTION: &str = "box.info";

/// Snapshot of instance state as reported by the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Info {
    /// Instance UUID in canonical 36-character form
    #[serde(deserialize_with = "canonical_uuid")]
    pub uuid: String,
    #[serde(deserialize_with = "non_empty")]
    pub version: String,
    #[serde(deserialize_with = "positive_pid")]
    pub pid: u32,
    /// Replica id of this instance; absent on anonymous replicas
    pub id: Option<u32>,
    pub ro: Option<bool>,
    pub status: Option<String>,
    pub lsn: Option<u64>,
    /// Replica set members keyed by 1-based replica id
    #[serde(deserialize_with = "replication_table")]
    pub replication: BTreeMap<u32, Replica>,
}

impl Info {
    /// The replication entry describing this instance
    pub fn local_replica(&self) -> Option<&Replica> {
        self.replication.values().find(|r| r.uuid == self.uuid)
    }
}

/// One member of the replica set
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Replica {
    pub id: u32,
    #[serde(deserialize_with = "canonical_uuid")]
    pub uuid: String,
    pub lsn: u64,
    pub name: Option<String>,
    pub upstream: Option<Upstream>,
    pub downstream: Option<Downstream>,
}

/// Status of the connection from this instance to the replica
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Upstream {
    pub status: String,
    pub idle: Option<f64>,
    pub peer: Option<String>,
    pub lag: Option<f64>,
    pub message: Option<String>,
}

/// Status of the connection from the replica to this instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Downstream {
    pub status: String,
    pub idle: Option<f64>,
    pub lag: Option<f64>,
    pub message: Option<String>,
}

fn canonical_uuid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match uuid::Uuid::try_parse(&raw) {
        // try_parse also takes the simple, braced and urn forms
        Ok(_) if raw.len() == 36 => Ok(raw),
        _ => Err(de::Error::invalid_value(
            Unexpected::Str(&raw),
            &"a canonical 36-character UUID",
        )),
    }
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if raw.is_empty() {
        return Err(de::Error::invalid_length(0, &"a non-empty string"));
    }
    Ok(raw)
}

fn positive_pid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match u32::deserialize(deserializer)? {
        0 => Err(de::Error::invalid_value(
            Unexpected::Unsigned(0),
            &"a positive process id",
        )),
        pid => Ok(pid),
    }
}

/// The engine encodes a dense id table as an array and a sparse one as a map.
fn replication_table<'de, D>(deserializer: D) -> Result<BTreeMap<u32, Replica>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ReplicationVisitor)
}

struct ReplicationVisitor;

impl<'de> Visitor<'de> for ReplicationVisitor {
    type Value = BTreeMap<u32, Replica>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a replica table as an array or an id-keyed map")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut table = BTreeMap::new();
        let mut id: u32 = 0;
        loop {
            id = id
                .checked_add(1)
                .ok_or_else(|| <A::Error as de::Error>::custom("replica table is too large"))?;
            match seq.next_element_seed(ReplicaSlot { id })? {
                // Freed ids leave nil holes in the dense form
                Some(None) => {}
                Some(Some(replica)) => {
                    table.insert(id, replica);
                }
                None => return Ok(table),
            }
        }
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut table = BTreeMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let id = key.parse::<u32>().map_err(|_| {
                let unexpected = Unexpected::Str(&key);
                <A::Error as de::Error>::invalid_value(unexpected, &"a numeric replica id")
            })?;
            if let Some(replica) = map.next_value_seed(ReplicaSlot { id })? {
                table.insert(id, replica);
            }
        }
        Ok(table)
    }
}

/// One entry of the replica table, which must describe the id it is stored under
struct ReplicaSlot {
    id: u32,
}

impl<'de> DeserializeSeed<'de> for ReplicaSlot {
    type Value = Option<Replica>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        match Option::<Replica>::deserialize(deserializer)? {
            Some(replica) if replica.id != self.id => Err(de::Error::custom(format!(
                "replica id {} stored under id {}",
                replica.id, self.id
            ))),
            slot => Ok(slot),
        }
    }
}

/// Standalone `box.info` request for callers that drive the connection themselves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoRequest;

impl InfoRequest {
    pub fn new() -> Self {
        Self
    }
}

impl From<InfoRequest> for CallRequest {
    fn from(_: InfoRequest) -> Self {
        CallRequest::new(INFO_FUNCTION)
    }
}

/// Decoded `box.info` reply
#[derive(Debug, Clone, PartialEq)]
pub struct InfoResponse {
    pub info: Info,
}

impl FromReply for InfoResponse {
    fn from_reply(data: &[Value]) -> Result<Self, DecodeError> {
        Ok(Self {
            info: decode_single(data)?,
        })
    }
}
