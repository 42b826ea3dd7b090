use std::fmt;

use thiserror::Error;

/// Default control-service port when a remote spec omits one.
pub const DEFAULT_PORT: u16 = 10053;

/// One control-service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Remote {
	pub host: String,
	pub port: u16,
}

impl fmt::Display for Remote {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Construction failed because the remotes list was empty.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("remotes list is empty")]
pub struct RemotesEmpty;

/// Parses a comma- and colon-separated `host[:port]` list, e.g.
/// `"host-a:20053,host-b,host-c:20053"`.
pub fn parse_remotes(spec: &str) -> Result<Vec<Remote>, RemotesEmpty> {
	let remotes: Vec<Remote> = spec
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(|entry| match entry.split_once(':') {
			Some((host, port)) => Remote {
				host: host.to_string(),
				port: port.parse().unwrap_or(DEFAULT_PORT),
			},
			None => Remote {
				host: entry.to_string(),
				port: DEFAULT_PORT,
			},
		})
		.collect();

	if remotes.is_empty() {
		Err(RemotesEmpty)
	} else {
		Ok(remotes)
	}
}

/// Rotates through a fixed ordered list of remotes, starting at a cursor
/// that advances on every successful connect so clients fan out across
/// endpoints instead of hammering the first one.
pub struct RemoteRing {
	remotes: Vec<Remote>,
	next: usize,
}

impl RemoteRing {
	pub fn new(remotes: Vec<Remote>) -> Result<Self, RemotesEmpty> {
		if remotes.is_empty() {
			return Err(RemotesEmpty);
		}
		Ok(Self { remotes, next: 0 })
	}

	pub fn len(&self) -> usize {
		self.remotes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.remotes.is_empty()
	}

	/// Iterate starting at the current cursor, wrapping once around.
	pub fn iter_from_cursor(&self) -> impl Iterator<Item = &Remote> + '_ {
		let len = self.remotes.len();
		(0..len).map(move |i| &self.remotes[(self.next + i) % len])
	}

	/// Advance the cursor past the remote that was just used successfully.
	pub fn advance_past(&mut self, used: &Remote) {
		if let Some(pos) = self.remotes.iter().position(|r| r == used) {
			self.next = (pos + 1) % self.remotes.len();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_mixed_host_and_host_port() {
		let remotes = parse_remotes("h1:20053,h2, h3:20054").unwrap();
		assert_eq!(
			remotes,
			vec![
				Remote { host: "h1".into(), port: 20053 },
				Remote { host: "h2".into(), port: DEFAULT_PORT },
				Remote { host: "h3".into(), port: 20054 },
			]
		);
	}

	#[test]
	fn empty_spec_is_rejected() {
		assert!(parse_remotes("").is_err());
		assert!(parse_remotes(" , ,").is_err());
	}

	#[test]
	fn ring_rotates_after_successful_connect() {
		let remotes = parse_remotes("h1,h2,h3").unwrap();
		let mut ring = RemoteRing::new(remotes).unwrap();
		let first: Vec<_> = ring.iter_from_cursor().cloned().collect();
		assert_eq!(first[0].host, "h1");

		ring.advance_past(&Remote { host: "h1".into(), port: DEFAULT_PORT });
		let second: Vec<_> = ring.iter_from_cursor().cloned().collect();
		assert_eq!(second[0].host, "h2");
	}
}
