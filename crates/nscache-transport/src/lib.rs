//! Generic request/reply RPC transport used by the refresh worker to talk to
//! the control service.
//!
//! This crate knows nothing about the control service's actual RPC events or
//! payload shapes: it only provides the [`Transport`]/[`TransportConnector`]
//! seam, a [`Remote`] endpoint list with rotation, and an [`RpcClient`] that
//! retries once across a reconnect. The `nscache` crate supplies the event
//! names and interprets replies.

mod client;
mod error;
mod remote;
mod transport;

pub use client::RpcClient;
pub use error::TransportError;
pub use remote::{parse_remotes, Remote, RemoteRing, RemotesEmpty, DEFAULT_PORT};
pub use transport::{Transport, TransportConnector};

#[cfg(any(test, feature = "test-support"))]
pub use client::stub;
