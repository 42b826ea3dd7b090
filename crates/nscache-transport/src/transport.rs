use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::remote::Remote;

/// One open session to a single control-service endpoint.
///
/// The wire-level contract (send event name, stream one msgpack-packed
/// argument chunk, receive one reply chunk, receive close) is an external
/// collaborator's concern; this crate only needs the request/reply shape of
/// it, already decoded to a dynamic JSON value.
#[async_trait]
pub trait Transport: Send {
	async fn enqueue(
		&mut self,
		event: &str,
		args: serde_json::Value,
		deadline: Duration,
	) -> Result<serde_json::Value, TransportError>;
}

/// Establishes [`Transport`] sessions against a given remote. The embedder
/// supplies the real implementation (handshake, authentication, whatever
/// the underlying RPC framework needs); this crate ships only an in-memory
/// stub for tests, gated behind the `test-support` feature.
#[async_trait]
pub trait TransportConnector: Send + Sync {
	type Session: Transport;

	async fn connect(&self, remote: &Remote, deadline: Duration) -> Result<Self::Session, TransportError>;
}
