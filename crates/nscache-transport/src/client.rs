use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::TransportError;
use crate::remote::{Remote, RemoteRing, RemotesEmpty};
use crate::transport::{Transport, TransportConnector};

/// A request/reply RPC client over a rotating pool of endpoints.
///
/// Holds at most one live [`Transport`] session at a time: the refresh
/// worker is this client's sole user, so there is nothing to share. On
/// connection loss it reconnects by walking the remote ring starting at the
/// rotating cursor; `enqueue_with_reconnect` retries exactly once after a
/// single reconnect.
pub struct RpcClient<C: TransportConnector> {
	connector: C,
	remotes: RemoteRing,
	session: Option<C::Session>,
	reconnect_timeout: Duration,
	trace_counter: AtomicU64,
}

impl<C: TransportConnector> RpcClient<C> {
	pub fn new(connector: C, remotes: Vec<Remote>, reconnect_timeout: Duration) -> Result<Self, RemotesEmpty> {
		Ok(Self {
			connector,
			remotes: RemoteRing::new(remotes)?,
			session: None,
			reconnect_timeout,
			trace_counter: AtomicU64::new(0),
		})
	}

	pub fn is_connected(&self) -> bool {
		self.session.is_some()
	}

	fn next_trace_id(&self) -> u64 {
		self.trace_counter.fetch_add(1, Ordering::Relaxed)
	}

	/// Walks the remote ring starting at the cursor, attempting a bounded
	/// handshake against each. Advances the cursor past whichever remote
	/// succeeded so the next reconnect starts elsewhere.
	pub async fn connect(&mut self) -> Result<(), TransportError> {
		let candidates: Vec<Remote> = self.remotes.iter_from_cursor().cloned().collect();
		let mut last_err = None;

		for remote in &candidates {
			tracing::info!(remote = %remote, "attempting to connect");
			match self.connector.connect(remote, self.reconnect_timeout).await {
				Ok(session) => {
					tracing::info!(remote = %remote, "connected");
					self.session = Some(session);
					self.remotes.advance_past(remote);
					return Ok(());
				}
				Err(err) => {
					tracing::warn!(remote = %remote, error = %err, "connect attempt failed");
					last_err = Some(err);
				}
			}
		}

		self.session = None;
		Err(last_err.unwrap_or(TransportError::Connect {
			remote: "<no remotes>".to_string(),
			message: "remote ring was empty".to_string(),
		}))
	}

	/// One attempt on the current session, tagged with a trace id and logged
	/// at entry and exit.
	pub async fn enqueue(
		&mut self,
		event: &str,
		args: serde_json::Value,
		deadline: Duration,
	) -> Result<serde_json::Value, TransportError> {
		let trace_id = self.next_trace_id();
		let _span = tracing::info_span!("rpc_enqueue", trace_id, event).entered();
		tracing::debug!("sending");

		let Some(session) = self.session.as_mut() else {
			return Err(TransportError::Connect {
				remote: "<disconnected>".to_string(),
				message: "no active session".to_string(),
			});
		};

		let result = session.enqueue(event, args, deadline).await;
		match &result {
			Ok(_) => tracing::debug!("received reply"),
			Err(err) => tracing::warn!(error = %err, "rpc failed"),
		}
		result
	}

	/// `enqueue`, then on a connection failure reconnect once and retry
	/// once. A second failure (either the reconnect itself or the retried
	/// call) surfaces to the caller.
	pub async fn enqueue_with_reconnect(
		&mut self,
		event: &str,
		args: serde_json::Value,
		deadline: Duration,
	) -> Result<serde_json::Value, TransportError> {
		match self.enqueue(event, args.clone(), deadline).await {
			Ok(value) => Ok(value),
			Err(err) if err.is_connection_failure() => {
				tracing::warn!(event, error = %err, "enqueue failed, reconnecting");
				self.connect().await?;
				self.enqueue(event, args, deadline).await
			}
			Err(err) => Err(err),
		}
	}
}

#[cfg(any(test, feature = "test-support"))]
pub mod stub {
	use std::collections::VecDeque;
	use std::sync::Arc;

	use async_trait::async_trait;
	use parking_lot::Mutex;

	use super::*;

	/// Scripted reply or failure for one `enqueue` call.
	pub enum StubStep {
		Reply(serde_json::Value),
		ServerError(String),
	}

	/// A `TransportConnector` that either always fails to connect (for a
	/// "bad" remote), fails its first `N` connect attempts before succeeding
	/// (for simulating a down primary behind a reachable secondary), or hands
	/// out a session that replays a fixed script of replies (for a "good"
	/// remote), shared across clones via `Arc<Mutex<_>>`.
	#[derive(Clone)]
	pub struct StubConnector {
		refuse: bool,
		fail_first: u64,
		script: Arc<Mutex<VecDeque<StubStep>>>,
		connect_count: Arc<Mutex<u64>>,
	}

	impl StubConnector {
		pub fn refusing() -> Self {
			Self {
				refuse: true,
				fail_first: 0,
				script: Arc::new(Mutex::new(VecDeque::new())),
				connect_count: Arc::new(Mutex::new(0)),
			}
		}

		pub fn scripted(steps: Vec<StubStep>) -> Self {
			Self {
				refuse: false,
				fail_first: 0,
				script: Arc::new(Mutex::new(steps.into_iter().collect())),
				connect_count: Arc::new(Mutex::new(0)),
			}
		}

		/// Refuses the first `fail_first` connect attempts, then succeeds and
		/// replays `steps` as usual.
		pub fn flaky(fail_first: u64, steps: Vec<StubStep>) -> Self {
			Self {
				refuse: false,
				fail_first,
				script: Arc::new(Mutex::new(steps.into_iter().collect())),
				connect_count: Arc::new(Mutex::new(0)),
			}
		}

		pub fn push(&self, step: StubStep) {
			self.script.lock().push_back(step);
		}

		pub fn connect_count(&self) -> u64 {
			*self.connect_count.lock()
		}
	}

	pub struct StubSession {
		script: Arc<Mutex<VecDeque<StubStep>>>,
	}

	#[async_trait]
	impl Transport for StubSession {
		async fn enqueue(
			&mut self,
			event: &str,
			_args: serde_json::Value,
			_deadline: Duration,
		) -> Result<serde_json::Value, TransportError> {
			match self.script.lock().pop_front() {
				Some(StubStep::Reply(value)) => Ok(value),
				Some(StubStep::ServerError(message)) => Err(TransportError::Server {
					remote: "stub".to_string(),
					event: event.to_string(),
					message,
				}),
				None => Err(TransportError::Server {
					remote: "stub".to_string(),
					event: event.to_string(),
					message: "script exhausted".to_string(),
				}),
			}
		}
	}

	#[async_trait]
	impl TransportConnector for StubConnector {
		type Session = StubSession;

		async fn connect(&self, remote: &Remote, _deadline: Duration) -> Result<StubSession, TransportError> {
			let attempt = {
				let mut count = self.connect_count.lock();
				*count += 1;
				*count
			};
			if self.refuse || attempt <= self.fail_first {
				return Err(TransportError::Connect {
					remote: remote.to_string(),
					message: "connection refused".to_string(),
				});
			}
			Ok(StubSession { script: self.script.clone() })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::stub::{StubConnector, StubStep};
	use super::*;

	#[tokio::test]
	async fn connects_and_enqueues() {
		let connector = StubConnector::scripted(vec![StubStep::Reply(serde_json::json!({"ok": true}))]);
		let remotes = crate::remote::parse_remotes("h1").unwrap();
		let mut client = RpcClient::new(connector, remotes, Duration::from_millis(100)).unwrap();
		client.connect().await.unwrap();
		let reply = client
			.enqueue_with_reconnect("ping", serde_json::Value::Null, Duration::from_millis(100))
			.await
			.unwrap();
		assert_eq!(reply, serde_json::json!({"ok": true}));
	}

	#[tokio::test]
	async fn refusing_connector_surfaces_connect_error() {
		let connector = StubConnector::refusing();
		let remotes = crate::remote::parse_remotes("bad1,bad2").unwrap();
		let mut client = RpcClient::new(connector, remotes, Duration::from_millis(50)).unwrap();
		let err = client.connect().await.unwrap_err();
		assert!(matches!(err, TransportError::Connect { .. }));
		assert_eq!(client.connector.connect_count(), 2);
	}

	#[tokio::test]
	async fn reconnect_retries_once_then_surfaces_error() {
		let connector = StubConnector::scripted(vec![
			StubStep::ServerError("boom".into()),
		]);
		let remotes = crate::remote::parse_remotes("h1").unwrap();
		let mut client = RpcClient::new(connector, remotes, Duration::from_millis(50)).unwrap();
		client.connect().await.unwrap();
		let err = client
			.enqueue_with_reconnect("get", serde_json::Value::Null, Duration::from_millis(50))
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::Server { .. }));
	}
}
