use std::{fs, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use lit_config::{Config, EmbeddingMode};
use lit_domain::SearchQuery;
use lit_rpc::RpcClient;
use lit_service::{
	EmbeddingProvider, HttpEmbedding, LiteratureService, Providers, RecordSink, RpcEmbedding,
	RpcRecordSink,
};

#[derive(Debug, Parser)]
#[command(
	version = lit_cli::VERSION,
	rename_all = "kebab",
	styles = lit_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON search query: review and plan ids, research plan, terms, sources, limits.
	#[arg(long, short = 'q', value_name = "FILE")]
	pub query: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lit_config::load(&args.config)?;

	init_tracing(&config);

	let query = read_query(&args.query)?;
	let connectors = lit_providers::build_connectors(&config)?;
	let providers = build_providers(&config, &query.review_id);

	tracing::info!(
		sources = connectors.len(),
		embedding = ?config.embedding.mode,
		storage = config.storage.enabled,
		"Runner configured."
	);

	let service = LiteratureService::with_providers(config, connectors, providers);
	let report = service.search(query).await?;

	println!("{}", serde_json::to_string_pretty(&report)?);

	Ok(())
}

pub fn read_query(path: &std::path::Path) -> color_eyre::Result<SearchQuery> {
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read query file {}: {err}.", path.display()))?;

	parse_query(&raw)
}

pub fn parse_query(raw: &str) -> color_eyre::Result<SearchQuery> {
	serde_json::from_str(raw).map_err(|err| eyre::eyre!("Failed to parse query: {err}."))
}

/// The RPC channel is only dialed when the embedding oracle or the storage sink needs it.
pub fn build_providers(config: &Config, context_id: &str) -> Providers {
	let needs_rpc = config.embedding.mode == EmbeddingMode::Rpc || config.storage.enabled;
	let client = needs_rpc.then(|| Arc::new(RpcClient::tcp(&config.rpc)));
	let embedding: Arc<dyn EmbeddingProvider> = match (&config.embedding.mode, &client) {
		(EmbeddingMode::Rpc, Some(client)) =>
			Arc::new(RpcEmbedding::new(client.clone(), context_id)),
		_ => Arc::new(HttpEmbedding),
	};
	let sink = client.filter(|_| config.storage.enabled).map(|client| {
		Arc::new(RpcRecordSink::new(client, &config.storage)) as Arc<dyn RecordSink>
	});

	Providers::new(embedding, sink)
}

fn init_tracing(config: &Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
}
