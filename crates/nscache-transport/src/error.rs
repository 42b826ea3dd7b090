use thiserror::Error;

/// Recoverable transport failures. Never propagated to façade readers: the
/// refresh worker logs and either retries (once) or skips the step for this
/// tick.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("connection to {remote} failed: {message}")]
	Connect { remote: String, message: String },

	#[error("deadline exceeded talking to {remote}")]
	DeadlineExceeded { remote: String },

	#[error("{remote} rejected event '{event}': {message}")]
	Server { remote: String, event: String, message: String },
}

impl TransportError {
	/// Deadline exceeded is treated as a connection failure by callers: both
	/// trigger a reconnect, only a server-side error is a
	/// recoverable-but-connected failure.
	pub fn is_connection_failure(&self) -> bool {
		!matches!(self, Self::Server { .. })
	}
}
