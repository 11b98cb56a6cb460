//! Replicated, in-memory key-value store with causal consistency.
//!
//! A small, mostly fixed cluster of replicas keeps a shared key-value table
//! in sync over HTTP. Each replica tracks causality with a vector clock (one
//! slot per seed replica), gates incoming reads and writes on a dominance
//! check against the attached causal metadata, and broadcasts every locally
//! admitted mutation to the rest of the view. Unreachable peers are evicted
//! from the view after bounded retries, and a joining (or rejoining) replica
//! is brought up to date with a single full state transfer.
//!
//! Data is volatile: nothing survives a restart. Concurrent writes to the
//! same key are not reconciled through the clock; the last admitted write
//! wins.
//!
//! # Modules
//!
//! - [`clock`]: vector clocks over fixed replica slots
//! - [`store`]: the in-memory key-value table
//! - [`view`]: the seed list and the live membership set
//! - [`message`]: wire bodies, broadcast envelope, snapshot payload
//! - [`transport`]: the `PeerTransport` seam and its HTTP implementation
//! - [`replica`]: admission gate, broadcaster, and state transfer
//! - [`server`]: the axum façade
//! - [`cli`]: bootstrap flags and environment fallback

pub mod cli;
pub mod clock;
pub mod message;
pub mod replica;
pub mod server;
pub mod store;
pub mod transport;
pub mod view;
