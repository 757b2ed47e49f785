use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub rpc: Rpc,
	pub retry: Retry,
	pub sources: Sources,
	pub embedding: Embedding,
	pub scoring: Scoring,
	pub expansion: Expansion,
	pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rpc {
	pub addr: String,
	pub client_id: String,
	#[serde(default = "default_agent_type")]
	pub agent_type: String,
	#[serde(default = "default_call_kind")]
	pub call_kind: String,
	pub timeout_ms: u64,
	#[serde(default = "default_max_frame_bytes")]
	pub max_frame_bytes: usize,
	#[serde(default = "default_reconnect_attempts")]
	pub reconnect_attempts: u32,
	#[serde(default = "default_reconnect_backoff_ms")]
	pub reconnect_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
	pub max_retries: u32,
	pub base_backoff_ms: u64,
	/// Upper bound for a single connector call, retries and pacing included.
	#[serde(default = "default_call_timeout_ms")]
	pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sources {
	pub pubmed: SourceConfig,
	pub arxiv: SourceConfig,
	pub openalex: SourceConfig,
	pub core: SourceConfig,
	pub semantic_scholar: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
	pub enabled: bool,
	pub api_base: String,
	pub api_key: Option<String>,
	pub contact_email: Option<String>,
	pub min_interval_ms: u64,
	pub timeout_ms: u64,
	pub max_results: u32,
	pub year_from: Option<i32>,
	pub year_to: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
	Http,
	Rpc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedding {
	pub mode: EmbeddingMode,
	#[serde(default)]
	pub api_base: String,
	pub api_key: Option<String>,
	#[serde(default = "default_embedding_path")]
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_embedding_action")]
	pub rpc_action: String,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scoring {
	pub quantile: f32,
	pub top_k_terms: u32,
	/// Number of fetched documents passed through unscored when the oracle is unavailable.
	#[serde(default = "default_fallback_prefix")]
	pub fallback_prefix: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Expansion {
	pub rounds: u32,
	pub limit_per_paper: u32,
	pub max_candidates: u32,
	pub citation_source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub enabled: bool,
	#[serde(default = "default_storage_action")]
	pub action: String,
}

fn default_agent_type() -> String {
	"literature_agent".to_string()
}

fn default_call_kind() -> String {
	"agent_task".to_string()
}

fn default_max_frame_bytes() -> usize {
	8 * 1024 * 1024
}

fn default_reconnect_attempts() -> u32 {
	3
}

fn default_reconnect_backoff_ms() -> u64 {
	500
}

fn default_call_timeout_ms() -> u64 {
	120_000
}

fn default_embedding_path() -> String {
	"/embeddings".to_string()
}

fn default_embedding_action() -> String {
	"ai_chat_completion".to_string()
}

fn default_fallback_prefix() -> u32 {
	25
}

fn default_storage_action() -> String {
	"create_literature_record".to_string()
}
