mod error;

pub use error::{Error, Result};

use std::{
	future::IntoFuture,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};

use axum::Router;
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream},
	net::TcpListener,
	sync::oneshot::{self, Sender},
};

use lit_rpc::{BoxFuture, BoxedStream, Dialer, InboundFrame, OutboundEnvelope};

/// An axum router served on an ephemeral local port until dropped.
pub struct StubServer {
	base_url: String,
	shutdown: Option<Sender<()>>,
}
impl StubServer {
	pub async fn start(app: Router) -> Result<Self> {
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let (tx, rx) = oneshot::channel();
		let server = axum::serve(listener, app).with_graceful_shutdown(async move {
			let _ = rx.await;
		});

		tokio::spawn(async move {
			let _ = server.into_future().await;
		});

		Ok(Self { base_url: format!("http://{addr}"), shutdown: Some(tx) })
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}
}

impl Drop for StubServer {
	fn drop(&mut self) {
		if let Some(tx) = self.shutdown.take() {
			let _ = tx.send(());
		}
	}
}

type Responder = dyn Fn(&OutboundEnvelope) -> Option<InboundFrame> + Send + Sync;

/// Dialer that answers each call in-process over `tokio::io::duplex`.
///
/// The responder sees every outbound envelope; returning `None` leaves the call
/// unanswered.
pub struct LoopbackDialer {
	responder: Arc<Responder>,
	dials: AtomicUsize,
}
impl LoopbackDialer {
	pub fn new<F>(responder: F) -> Self
	where
		F: Fn(&OutboundEnvelope) -> Option<InboundFrame> + Send + Sync + 'static,
	{
		Self { responder: Arc::new(responder), dials: AtomicUsize::new(0) }
	}

	pub fn dials(&self) -> usize {
		self.dials.load(Ordering::SeqCst)
	}
}

impl Dialer for LoopbackDialer {
	fn dial<'a>(&'a self) -> BoxFuture<'a, lit_rpc::Result<BoxedStream>> {
		Box::pin(async move {
			let (local, remote) = tokio::io::duplex(256 * 1024);

			self.dials.fetch_add(1, Ordering::SeqCst);

			tokio::spawn(serve_peer(remote, self.responder.clone()));

			Ok(Box::new(local) as BoxedStream)
		})
	}

	fn describe(&self) -> String {
		"loopback".to_string()
	}
}

async fn serve_peer(stream: DuplexStream, responder: Arc<Responder>) {
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut lines = BufReader::new(read_half).lines();

	while let Ok(Some(line)) = lines.next_line().await {
		let Ok(envelope) = serde_json::from_str::<OutboundEnvelope>(&line) else { continue };
		let Some(reply) = responder(&envelope) else { continue };
		let Ok(mut raw) = serde_json::to_vec(&reply) else { continue };

		raw.push(b'\n');

		if write_half.write_all(&raw).await.is_err() {
			break;
		}
	}
}

/// Configuration whose sources all point at `base_url/{source}` with pacing and backoff
/// disabled.
pub fn stub_config(base_url: &str) -> Result<lit_config::Config> {
	let raw = format!(
		r#"
[service]
log_level = "debug"

[rpc]
addr       = "127.0.0.1:0"
client_id  = "lit-test"
timeout_ms = 2000

[retry]
max_retries     = 3
base_backoff_ms = 1
call_timeout_ms = 5000

[sources.pubmed]
enabled         = true
api_base        = "{base_url}/pubmed"
min_interval_ms = 0
timeout_ms      = 2000
max_results     = 10

[sources.arxiv]
enabled         = true
api_base        = "{base_url}/arxiv"
min_interval_ms = 0
timeout_ms      = 2000
max_results     = 10

[sources.openalex]
enabled         = true
api_base        = "{base_url}/openalex"
contact_email   = "tests@example.org"
min_interval_ms = 0
timeout_ms      = 2000
max_results     = 10

[sources.core]
enabled         = true
api_base        = "{base_url}/core"
api_key         = "core-key"
min_interval_ms = 0
timeout_ms      = 2000
max_results     = 10

[sources.semantic_scholar]
enabled         = true
api_base        = "{base_url}/s2"
min_interval_ms = 0
timeout_ms      = 2000
max_results     = 10

[embedding]
mode       = "http"
api_base   = "{base_url}/embed"
model      = "test-embedding"
dimensions = 4
timeout_ms = 2000

[scoring]
quantile        = 0.8
top_k_terms     = 8
fallback_prefix = 25

[expansion]
rounds          = 2
limit_per_paper = 5
max_candidates  = 50
citation_source = "openalex"

[storage]
enabled = false
"#
	);

	Ok(lit_config::from_toml_str(&raw)?)
}
