use std::{
	io::ErrorKind,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use tokio::{
	io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader},
	sync::{Mutex, oneshot},
	task::JoinHandle,
};

use crate::{
	Error, Result,
	envelope::{CallRequest, OutboundEnvelope},
	framing,
	registry::{CallOutcome, Dispatch, PendingGuard, PendingRegistry},
};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
	pub client_id: String,
	pub max_frame_bytes: usize,
}

/// One live duplex connection shared by many concurrent calls.
///
/// A single reader task routes every inbound reply to its waiter by correlation id, so
/// callers may issue requests concurrently and receive replies in any order.
pub struct RpcChannel {
	registry: Arc<PendingRegistry>,
	writer: Mutex<BoxedWriter>,
	connected: Arc<AtomicBool>,
	reader: JoinHandle<()>,
	options: ChannelOptions,
}
impl RpcChannel {
	pub fn open<S>(stream: S, options: ChannelOptions) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (read_half, write_half) = tokio::io::split(stream);
		let registry = Arc::new(PendingRegistry::new());
		let connected = Arc::new(AtomicBool::new(true));
		let reader = tokio::spawn(read_loop(
			BufReader::new(read_half),
			registry.clone(),
			connected.clone(),
			options.max_frame_bytes,
		));

		Self {
			registry,
			writer: Mutex::new(Box::new(write_half)),
			connected,
			reader,
			options,
		}
	}

	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	pub fn registry(&self) -> &Arc<PendingRegistry> {
		&self.registry
	}

	/// Sends `request` under `correlation_id` and waits for the matching reply.
	///
	/// The waiter is registered before the frame is written, so a reply can never arrive
	/// ahead of its registration. On every exit path the registry entry is gone.
	pub async fn call(
		&self,
		request: &CallRequest,
		correlation_id: &str,
		timeout: Duration,
	) -> Result<Value> {
		let mut receiver = self.registry.register(correlation_id, timeout)?;
		let mut guard = PendingGuard {
			registry: self.registry.clone(),
			correlation_id: correlation_id.to_string(),
			armed: true,
		};

		// Checked after registering: the reader marks the channel closed before draining the
		// registry, so an entry added past the drain is caught here and dropped by the guard.
		if !self.is_connected() {
			return Err(Error::NotConnected);
		}

		let envelope = OutboundEnvelope::new(request, correlation_id, &self.options.client_id);
		let frame = serde_json::to_vec(&envelope)?;

		{
			let mut writer = self.writer.lock().await;

			if let Err(err) = framing::write_frame(&mut *writer, &frame).await {
				self.connected.store(false, Ordering::SeqCst);

				tracing::warn!(error = %err, correlation_id, "Failed to write RPC frame.");

				return Err(Error::Io(err));
			}
		}

		tracing::debug!(correlation_id, action = %request.action, "Sent RPC call.");

		let waited = tokio::time::timeout(timeout, &mut receiver).await;

		match waited {
			Ok(Ok(outcome)) => {
				guard.armed = false;

				outcome
			},
			Ok(Err(_)) => Err(Error::ConnectionLost),
			Err(_) => {
				guard.armed = false;

				settle_expired(&self.registry, correlation_id, receiver, timeout)
			},
		}
	}
}

impl Drop for RpcChannel {
	fn drop(&mut self) {
		self.reader.abort();
		self.connected.store(false, Ordering::SeqCst);
		self.registry.fail_all(|| Error::ConnectionLost);
	}
}

/// Outcome of a call whose deadline fired. A reply resolved between the deadline and the
/// removal of the entry still wins.
fn settle_expired(
	registry: &PendingRegistry,
	correlation_id: &str,
	mut receiver: oneshot::Receiver<CallOutcome>,
	timeout: Duration,
) -> Result<Value> {
	let timed_out = || Error::Timeout {
		correlation_id: correlation_id.to_string(),
		timeout_ms: timeout.as_millis() as u64,
	};

	if registry.remove(correlation_id) {
		return Err(timed_out());
	}

	receiver.try_recv().unwrap_or_else(|_| Err(timed_out()))
}

async fn read_loop<R>(
	mut reader: R,
	registry: Arc<PendingRegistry>,
	connected: Arc<AtomicBool>,
	max_frame_bytes: usize,
) where
	R: AsyncBufRead + Unpin,
{
	let mut line = String::new();

	loop {
		line.clear();

		match framing::read_frame_bounded(&mut reader, &mut line, max_frame_bytes).await {
			Ok(0) => break,
			Ok(_) => {
				let frame = line.trim();

				if frame.is_empty() {
					continue;
				}

				match registry.dispatch(frame) {
					Dispatch::Resolved { .. } => {},
					Dispatch::Unmatched { correlation_id } => {
						tracing::debug!(
							correlation_id,
							"Dropped reply for unknown or expired call."
						);
					},
					Dispatch::Ignored { kind } => {
						tracing::trace!(kind, "Ignored non-reply frame.");
					},
					Dispatch::Malformed { message } => {
						tracing::warn!(error = %message, "Dropped malformed RPC frame.");
					},
				}
			},
			Err(err) if err.kind() == ErrorKind::InvalidData => {
				tracing::warn!(error = %err, "Dropped oversized RPC frame.");
			},
			Err(err) => {
				tracing::warn!(error = %err, "RPC read failed.");

				break;
			},
		}
	}

	connected.store(false, Ordering::SeqCst);

	let failed = registry.fail_all(|| Error::ConnectionLost);

	tracing::warn!(failed, "RPC connection closed.");
}
