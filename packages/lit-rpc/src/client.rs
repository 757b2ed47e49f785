use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{
	io::{AsyncRead, AsyncWrite},
	net::TcpStream,
	sync::Mutex,
};

use crate::{
	BoxFuture, Error, Result,
	channel::{ChannelOptions, RpcChannel},
	envelope::CallRequest,
};

pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn Stream>;

/// Opens the underlying duplex connection.
pub trait Dialer: Send + Sync {
	fn dial<'a>(&'a self) -> BoxFuture<'a, Result<BoxedStream>>;

	fn describe(&self) -> String;
}

pub struct TcpDialer {
	addr: String,
}
impl TcpDialer {
	pub fn new(addr: impl Into<String>) -> Self {
		Self { addr: addr.into() }
	}
}

impl Dialer for TcpDialer {
	fn dial<'a>(&'a self) -> BoxFuture<'a, Result<BoxedStream>> {
		Box::pin(async move {
			let stream = TcpStream::connect(&self.addr)
				.await
				.map_err(|err| Error::Connect {
					addr: self.addr.clone(),
					message: err.to_string(),
				})?;

			stream.set_nodelay(true)?;

			Ok(Box::new(stream) as BoxedStream)
		})
	}

	fn describe(&self) -> String {
		self.addr.clone()
	}
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
	pub client_id: String,
	pub agent_type: String,
	pub call_kind: String,
	pub timeout: Duration,
	pub max_frame_bytes: usize,
	pub reconnect_attempts: u32,
	pub reconnect_backoff: Duration,
}
impl ClientOptions {
	pub fn from_config(cfg: &lit_config::Rpc) -> Self {
		Self {
			client_id: cfg.client_id.clone(),
			agent_type: cfg.agent_type.clone(),
			call_kind: cfg.call_kind.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
			max_frame_bytes: cfg.max_frame_bytes,
			reconnect_attempts: cfg.reconnect_attempts,
			reconnect_backoff: Duration::from_millis(cfg.reconnect_backoff_ms),
		}
	}
}

/// Request/response client over a lazily (re)opened shared channel.
///
/// A dead channel is replaced on the next call. Calls that were in flight on the dead
/// channel fail with `ConnectionLost` and are never replayed.
pub struct RpcClient {
	dialer: Arc<dyn Dialer>,
	options: ClientOptions,
	channel: Mutex<Option<Arc<RpcChannel>>>,
}
impl RpcClient {
	pub fn new(dialer: Arc<dyn Dialer>, options: ClientOptions) -> Self {
		Self { dialer, options, channel: Mutex::new(None) }
	}

	pub fn tcp(cfg: &lit_config::Rpc) -> Self {
		Self::new(Arc::new(TcpDialer::new(cfg.addr.clone())), ClientOptions::from_config(cfg))
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	pub fn request(&self, context_id: &str, action: &str, payload: Value) -> CallRequest {
		CallRequest {
			call_kind: self.options.call_kind.clone(),
			context_id: context_id.to_string(),
			agent_type: self.options.agent_type.clone(),
			action: action.to_string(),
			payload,
		}
	}

	pub async fn call(&self, request: CallRequest, timeout: Duration) -> Result<Value> {
		let channel = self.connect().await?;
		let correlation_id = crate::correlation_id(&request.action);

		channel.call(&request, &correlation_id, timeout).await
	}

	/// Issues `action` with the configured default timeout.
	pub async fn call_default(
		&self,
		context_id: &str,
		action: &str,
		payload: Value,
	) -> Result<Value> {
		let request = self.request(context_id, action, payload);

		self.call(request, self.options.timeout).await
	}

	/// Returns the live channel, dialing a new one if none is open.
	pub async fn connect(&self) -> Result<Arc<RpcChannel>> {
		let mut slot = self.channel.lock().await;

		if let Some(channel) = slot.as_ref()
			&& channel.is_connected()
		{
			return Ok(channel.clone());
		}

		*slot = None;

		let attempts = self.options.reconnect_attempts.max(1);
		let mut last_err = None;

		for attempt in 0..attempts {
			if attempt > 0 {
				tokio::time::sleep(self.options.reconnect_backoff).await;
			}

			match self.dialer.dial().await {
				Ok(stream) => {
					let channel = Arc::new(RpcChannel::open(
						stream,
						ChannelOptions {
							client_id: self.options.client_id.clone(),
							max_frame_bytes: self.options.max_frame_bytes,
						},
					));

					tracing::info!(
						peer = %self.dialer.describe(),
						attempt,
						"RPC channel connected."
					);

					*slot = Some(channel.clone());

					return Ok(channel);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						peer = %self.dialer.describe(),
						attempt,
						"RPC connect attempt failed."
					);

					last_err = Some(err);
				},
			}
		}

		Err(last_err.unwrap_or(Error::NotConnected))
	}
}
