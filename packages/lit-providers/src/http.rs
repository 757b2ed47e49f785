use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use reqwest::{Client, RequestBuilder, Response, StatusCode, header::HeaderMap};
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};

use crate::{Error, Result};
use lit_domain::SourceTag;

const MAX_BACKOFF_EXP: u32 = 10;
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Enforces a minimum spacing between requests issued by one connector.
///
/// The lock is held across the wait, so concurrent callers of the same connector are
/// serialized while other connectors proceed independently.
pub struct Pacer {
	interval: Duration,
	last: Mutex<Option<Instant>>,
}
impl Pacer {
	pub fn new(interval: Duration) -> Self {
		Self { interval, last: Mutex::new(None) }
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	pub async fn wait(&self) {
		let mut last = self.last.lock().await;

		if let Some(previous) = *last {
			let ready_at = previous + self.interval;

			if ready_at > Instant::now() {
				tokio::time::sleep_until(ready_at).await;
			}
		}

		*last = Some(Instant::now());
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &lit_config::Retry) -> Self {
		Self {
			max_retries: cfg.max_retries,
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
		}
	}

	/// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
	pub fn backoff(&self, attempt: u32) -> Duration {
		self.base_backoff.saturating_mul(1_u32 << attempt.min(MAX_BACKOFF_EXP))
	}
}

#[derive(Debug, Default)]
pub struct ConnectorStats {
	requests: AtomicU64,
	rate_limited: AtomicU64,
	failures: AtomicU64,
}
impl ConnectorStats {
	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			rate_limited: self.rate_limited.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
	pub requests: u64,
	pub rate_limited: u64,
	pub failures: u64,
}

/// Paced, retrying HTTP access shared by every connector.
pub struct HttpFetcher {
	source: SourceTag,
	client: Client,
	pacer: Pacer,
	retry: RetryPolicy,
	stats: Arc<ConnectorStats>,
}
impl HttpFetcher {
	pub fn new(
		source: SourceTag,
		cfg: &lit_config::SourceConfig,
		retry: RetryPolicy,
		headers: HeaderMap,
	) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.user_agent(concat!("lit/", env!("CARGO_PKG_VERSION")))
			.default_headers(headers)
			.build()?;

		Ok(Self {
			source,
			client,
			pacer: Pacer::new(Duration::from_millis(cfg.min_interval_ms)),
			retry,
			stats: Arc::new(ConnectorStats::default()),
		})
	}

	pub fn stats(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}

	pub fn min_interval(&self) -> Duration {
		self.pacer.interval()
	}

	/// Sends the request built by `build`, retrying 429s and transient failures.
	///
	/// Any other 4xx aborts immediately with [`Error::Permanent`].
	pub async fn send<F>(&self, build: F) -> Result<Response>
	where
		F: Fn(&Client) -> RequestBuilder,
	{
		let attempts = self.retry.max_retries + 1;
		let mut last_err = None;

		for attempt in 0..attempts {
			if attempt > 0 {
				tokio::time::sleep(self.retry.backoff(attempt - 1)).await;
			}

			self.pacer.wait().await;
			self.stats.requests.fetch_add(1, Ordering::Relaxed);

			match build(&self.client).send().await {
				Ok(res) => {
					let status = res.status();

					if status.is_success() {
						return Ok(res);
					}
					if status == StatusCode::TOO_MANY_REQUESTS {
						self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);

						tracing::warn!(source = %self.source, attempt, "Rate limited by source.");

						last_err = Some(Error::RateLimited { attempts: attempt + 1 });

						continue;
					}

					let message = error_body(res).await;

					if status.is_server_error() {
						tracing::warn!(
							source = %self.source,
							status = status.as_u16(),
							attempt,
							"Source returned a server error."
						);

						last_err = Some(Error::Exhausted { attempts: attempt + 1, message });

						continue;
					}

					self.stats.failures.fetch_add(1, Ordering::Relaxed);

					return Err(Error::Permanent { status: status.as_u16(), message });
				},
				Err(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
					tracing::warn!(
						error = %err,
						source = %self.source,
						attempt,
						"Source request failed."
					);

					last_err =
						Some(Error::Exhausted { attempts: attempt + 1, message: err.to_string() });
				},
				Err(err) => {
					self.stats.failures.fetch_add(1, Ordering::Relaxed);

					return Err(err.into());
				},
			}
		}

		self.stats.failures.fetch_add(1, Ordering::Relaxed);

		Err(last_err.unwrap_or(Error::Exhausted {
			attempts,
			message: "No request was attempted.".to_string(),
		}))
	}

	pub async fn get_json<F>(&self, build: F) -> Result<Value>
	where
		F: Fn(&Client) -> RequestBuilder,
	{
		let res = self.send(build).await?;

		Ok(res.json().await?)
	}

	pub async fn get_text<F>(&self, build: F) -> Result<String>
	where
		F: Fn(&Client) -> RequestBuilder,
	{
		let res = self.send(build).await?;

		Ok(res.text().await?)
	}
}

async fn error_body(res: Response) -> String {
	let body = res.text().await.unwrap_or_default();

	body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
