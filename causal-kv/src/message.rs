//! Wire types shared by the façade and the peer transport.
//!
//! Field names follow the protocol the cluster speaks over HTTP:
//! `causal-metadata` carries a [`VectorClock`], `socket-address` names a
//! replica. Replica-to-replica messages additionally carry a `forwarded`
//! marker and the `origin` address; the marker is what stops a broadcast
//! from being forwarded a second hop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::VectorClock;

/// Body of a `PUT`/`GET`/`DELETE` on `/kvs/{key}`.
///
/// Client requests set `value` (for writes) and optionally
/// `causal-metadata`; `forwarded`/`origin` are only present on messages
/// relayed between replicas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(rename = "causal-metadata", default)]
    pub causal_metadata: Option<VectorClock>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forwarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Ack half of a `/kvs` response; the broadcaster merges the peer's
/// post-merge clock out of this.
#[derive(Debug, Clone, Deserialize)]
pub struct KvAckBody {
    #[serde(rename = "causal-metadata", default)]
    pub causal_metadata: Option<VectorClock>,
}

/// Body of a `PUT`/`DELETE` on `/view`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewRequestBody {
    #[serde(rename = "socket-address")]
    pub socket_address: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forwarded: bool,
}

/// A replicated mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } => key,
            WriteOp::Delete { key } => key,
        }
    }
}

/// What the broadcaster sends to each peer after a local mutation: the
/// operation, the post-increment clock, the originating replica, and the
/// rebroadcast marker. Receivers apply marked envelopes and never forward
/// them again, which bounds propagation to one hop.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub op: WriteOp,
    pub clock: VectorClock,
    pub origin: String,
    pub forwarded: bool,
}

/// Bulk state-transfer payload: the whole table plus the sender's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: BTreeMap<String, Value>,
    #[serde(rename = "causal-metadata")]
    pub clock: VectorClock,
}
