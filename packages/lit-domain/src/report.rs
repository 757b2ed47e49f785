use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::scored::ScoredDocument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
	pub round: u32,
	pub phase: String,
	pub fetched: usize,
	pub unique: usize,
	pub kept: usize,
	pub cutoff: f32,
}

/// Outcome of one pipeline run. Assembled once when the run reaches `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
	pub review_id: String,
	pub plan_id: String,
	pub fetched: usize,
	pub unique: usize,
	pub duplicates: usize,
	pub per_source: BTreeMap<String, usize>,
	pub rate_limited: u64,
	pub rounds: Vec<RoundSummary>,
	pub errors: Vec<String>,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub finished_at: OffsetDateTime,
	pub records: Vec<ScoredDocument>,
}
