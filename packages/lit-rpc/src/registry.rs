use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use serde_json::Value;
use tokio::{sync::oneshot, time::Instant};

use crate::{
	Error, Result,
	envelope::{InboundFrame, ReplyStatus},
};

pub type CallOutcome = Result<Value>;

struct PendingCall {
	sender: oneshot::Sender<CallOutcome>,
	created_at: Instant,
	deadline: Instant,
}

/// What the reader loop did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
	Resolved { correlation_id: String },
	/// A reply whose correlation id is not (or no longer) registered.
	Unmatched { correlation_id: String },
	/// A well-formed frame that is not a reply.
	Ignored { kind: String },
	Malformed { message: String },
}

/// Correlation id to waiter map shared by every call on a connection.
///
/// Removal is idempotent: whichever of reply, timeout, or connection loss removes an
/// entry first wins, and the others observe an absent entry.
#[derive(Default)]
pub struct PendingRegistry {
	calls: Mutex<HashMap<String, PendingCall>>,
}
impl PendingRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(
		&self,
		correlation_id: &str,
		timeout: Duration,
	) -> Result<oneshot::Receiver<CallOutcome>> {
		let mut calls = self.calls.lock().unwrap_or_else(|err| err.into_inner());

		if calls.contains_key(correlation_id) {
			return Err(Error::DuplicateCorrelationId {
				correlation_id: correlation_id.to_string(),
			});
		}

		let (sender, receiver) = oneshot::channel();
		let created_at = Instant::now();

		calls.insert(
			correlation_id.to_string(),
			PendingCall { sender, created_at, deadline: created_at + timeout },
		);

		Ok(receiver)
	}

	/// Completes the waiter for `correlation_id`. Returns `false` when nothing was pending.
	pub fn resolve(&self, correlation_id: &str, outcome: CallOutcome) -> bool {
		let Some(call) = self.take(correlation_id) else { return false };
		let now = Instant::now();

		tracing::debug!(
			correlation_id,
			elapsed_ms = now.duration_since(call.created_at).as_millis() as u64,
			past_deadline = now > call.deadline,
			"Resolved pending call."
		);

		// The waiter may already be gone; that is the same as an absent entry.
		let _ = call.sender.send(outcome);

		true
	}

	/// Drops the entry without resolving it. Returns `false` when it was already gone.
	pub fn remove(&self, correlation_id: &str) -> bool {
		self.take(correlation_id).is_some()
	}

	pub fn contains(&self, correlation_id: &str) -> bool {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).contains_key(correlation_id)
	}

	pub fn len(&self) -> usize {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Fails every pending call with an error built by `make_error`.
	pub fn fail_all<F>(&self, make_error: F) -> usize
	where
		F: Fn() -> Error,
	{
		let drained: Vec<PendingCall> = {
			let mut calls = self.calls.lock().unwrap_or_else(|err| err.into_inner());

			calls.drain().map(|(_, call)| call).collect()
		};
		let count = drained.len();

		for call in drained {
			let _ = call.sender.send(Err(make_error()));
		}

		count
	}

	/// Parses one inbound frame and routes it to its waiter.
	pub fn dispatch(&self, raw: &str) -> Dispatch {
		let frame: InboundFrame = match serde_json::from_str(raw) {
			Ok(frame) => frame,
			Err(err) => return Dispatch::Malformed { message: err.to_string() },
		};

		if !frame.is_reply() {
			return Dispatch::Ignored { kind: frame.kind };
		}

		let Some(correlation_id) = frame.correlation_id.clone() else {
			return Dispatch::Malformed {
				message: "Reply frame is missing correlation_id.".to_string(),
			};
		};
		let outcome = match frame.status {
			Some(ReplyStatus::Failed) => Err(Error::Remote { message: frame.failure_message() }),
			_ => Ok(frame.result),
		};

		if self.resolve(&correlation_id, outcome) {
			Dispatch::Resolved { correlation_id }
		} else {
			Dispatch::Unmatched { correlation_id }
		}
	}

	fn take(&self, correlation_id: &str) -> Option<PendingCall> {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).remove(correlation_id)
	}
}

/// Removes its registry entry when a caller is dropped mid-call.
pub(crate) struct PendingGuard {
	pub(crate) registry: Arc<PendingRegistry>,
	pub(crate) correlation_id: String,
	pub(crate) armed: bool,
}
impl Drop for PendingGuard {
	fn drop(&mut self) {
		if self.armed {
			self.registry.remove(&self.correlation_id);
		}
	}
}
