pub mod error;
pub mod expansion;
pub mod pipeline;
pub mod scoring;
pub mod sources;
pub mod terms;

pub use error::{Error, Result};
pub use lit_providers::BoxFuture;
pub use pipeline::{Pipeline, PipelineState};
pub use scoring::{Scorer, cosine_similarity, filter_by_quantile};
pub use sources::SourceSet;

use std::sync::Arc;

use lit_config::Config;
use lit_domain::{ScoredDocument, SearchQuery, SearchReport};
use lit_providers::{SourceConnector, embedding, oracle};
use lit_rpc::RpcClient;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a lit_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Destination for the final records of a run.
pub trait RecordSink
where
	Self: Send + Sync,
{
	fn store<'a>(
		&'a self,
		query: &'a SearchQuery,
		record: &'a ScoredDocument,
	) -> BoxFuture<'a, Result<()>>;
}

/// OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedding;
impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a lit_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

/// Scoring oracle reached over the shared RPC channel.
pub struct RpcEmbedding {
	client: Arc<RpcClient>,
	context_id: String,
}
impl RpcEmbedding {
	pub fn new(client: Arc<RpcClient>, context_id: impl Into<String>) -> Self {
		Self { client, context_id: context_id.into() }
	}
}

impl EmbeddingProvider for RpcEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a lit_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Ok(oracle::embed(&self.client, cfg, &self.context_id, texts).await?)
		})
	}
}

/// Writes each record through the storage service with one RPC call per record.
pub struct RpcRecordSink {
	client: Arc<RpcClient>,
	action: String,
}
impl RpcRecordSink {
	pub fn new(client: Arc<RpcClient>, cfg: &lit_config::Storage) -> Self {
		Self { client, action: cfg.action.clone() }
	}
}

impl RecordSink for RpcRecordSink {
	fn store<'a>(
		&'a self,
		query: &'a SearchQuery,
		record: &'a ScoredDocument,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let payload = serde_json::json!({
				"review_id": query.review_id,
				"plan_id": query.plan_id,
				"record": record,
			});

			self.client.call_default(&query.review_id, &self.action, payload).await?;

			Ok(())
		})
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub sink: Option<Arc<dyn RecordSink>>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, sink: Option<Arc<dyn RecordSink>>) -> Self {
		Self { embedding, sink }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(HttpEmbedding), sink: None }
	}
}

pub struct LiteratureService {
	pub cfg: Config,
	pub sources: SourceSet,
	pub providers: Providers,
}
impl LiteratureService {
	pub fn new(cfg: Config, connectors: Vec<Arc<dyn SourceConnector>>) -> Self {
		Self::with_providers(cfg, connectors, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		connectors: Vec<Arc<dyn SourceConnector>>,
		providers: Providers,
	) -> Self {
		Self { cfg, sources: SourceSet::new(connectors), providers }
	}

	pub fn scorer(&self) -> Scorer {
		Scorer::new(self.providers.embedding.clone(), self.cfg.embedding.clone())
	}

	/// Runs one pipeline to completion. Only an invalid query fails the run.
	pub async fn search(&self, query: SearchQuery) -> Result<SearchReport> {
		Pipeline::new(self).run(query).await
	}
}
