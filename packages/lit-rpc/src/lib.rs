pub mod channel;
pub mod client;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod registry;

pub use channel::{ChannelOptions, RpcChannel};
pub use client::{BoxedStream, ClientOptions, Dialer, RpcClient, Stream, TcpDialer};
pub use envelope::{CallRequest, InboundFrame, OutboundEnvelope, ReplyStatus, TASK_RESULT};
pub use error::{Error, Result};
pub use registry::{Dispatch, PendingRegistry};

use std::{future::Future, pin::Pin};

use uuid::Uuid;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mints a fresh correlation id of the form `{action}-{uuid}`.
pub fn correlation_id(action: &str) -> String {
	format!("{action}-{}", Uuid::new_v4())
}
