//! Outbound peer RPC.
//!
//! The broadcaster and the resync path talk to peers only through
//! [`PeerTransport`], so the whole replication engine can be exercised with
//! an in-memory fake instead of real sockets. [`HttpTransport`] is the
//! production implementation: one `reqwest` client with a short request
//! timeout, speaking the same `/kvs`, `/view` and `/sync` routes the façade
//! serves.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::clock::VectorClock;
use crate::message::{Envelope, KvAckBody, KvRequestBody, Snapshot, ViewRequestBody, WriteOp};

/// Bound on every peer RPC. A single unreachable peer stalls a broadcast
/// fan-out by at most this long per attempt.
pub const PEER_TIMEOUT: Duration = Duration::from_millis(300);

/// Capability for delivering protocol messages to one peer.
///
/// Every method's `Err` means the peer was unreachable (connection failure
/// or timeout); the broadcaster turns repeated `Err`s into an eviction.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Delivers a broadcast envelope.
    ///
    /// `Ok(Some(clock))` is an acknowledgement carrying the peer's
    /// post-merge clock; `Ok(None)` means the peer was reachable but did not
    /// return one (it rejected the write), which is not grounds for
    /// eviction.
    async fn send_write(&self, peer: &str, envelope: &Envelope) -> Result<Option<VectorClock>>;

    /// Asks `peer` to add `addr` to its view (startup announcement).
    async fn send_view_add(&self, peer: &str, addr: &str) -> Result<()>;

    /// Propagates an eviction of `addr`, marked forwarded so the receiver
    /// removes the member without re-broadcasting.
    async fn send_view_delete(&self, peer: &str, addr: &str) -> Result<()>;

    /// Pushes a full state transfer to a joining replica.
    async fn send_snapshot(&self, peer: &str, snapshot: &Snapshot) -> Result<()>;
}

/// HTTP implementation of [`PeerTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send_write(&self, peer: &str, envelope: &Envelope) -> Result<Option<VectorClock>> {
        let body = KvRequestBody {
            value: match &envelope.op {
                WriteOp::Put { value, .. } => Some(value.clone()),
                WriteOp::Delete { .. } => None,
            },
            causal_metadata: Some(envelope.clock.clone()),
            forwarded: envelope.forwarded,
            origin: Some(envelope.origin.clone()),
        };
        let url = format!("http://{peer}/kvs/{}", envelope.op.key());
        let request = match &envelope.op {
            WriteOp::Put { .. } => self.client.put(&url),
            WriteOp::Delete { .. } => self.client.delete(&url),
        };
        let response = request
            .json(&body)
            .send()
            .await
            .with_context(|| format!("write to {peer} failed"))?;

        if !response.status().is_success() {
            return Ok(None);
        }
        let ack: KvAckBody = response
            .json()
            .await
            .with_context(|| format!("bad ack from {peer}"))?;
        Ok(ack.causal_metadata)
    }

    async fn send_view_add(&self, peer: &str, addr: &str) -> Result<()> {
        let body = ViewRequestBody {
            socket_address: addr.to_string(),
            forwarded: false,
        };
        self.client
            .put(format!("http://{peer}/view"))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("view add to {peer} failed"))?;
        Ok(())
    }

    async fn send_view_delete(&self, peer: &str, addr: &str) -> Result<()> {
        let body = ViewRequestBody {
            socket_address: addr.to_string(),
            forwarded: true,
        };
        self.client
            .delete(format!("http://{peer}/view"))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("view delete to {peer} failed"))?;
        Ok(())
    }

    async fn send_snapshot(&self, peer: &str, snapshot: &Snapshot) -> Result<()> {
        self.client
            .put(format!("http://{peer}/sync"))
            .json(snapshot)
            .send()
            .await
            .with_context(|| format!("state transfer to {peer} failed"))?;
        Ok(())
    }
}
