use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{plan::ResearchPlan, record::SourceTag};

static OR_COMBINATOR: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)\s+OR\s+").expect("Static regex must compile."));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
	pub review_id: String,
	pub plan_id: String,
	pub plan: ResearchPlan,
	pub terms: Vec<String>,
	/// Empty means every configured source.
	#[serde(default)]
	pub sources: Vec<SourceTag>,
	pub max_results: u32,
	/// Number of citation expansion rounds requested after the initial search.
	#[serde(default)]
	pub search_depth: u32,
}
impl SearchQuery {
	/// Rewrites legacy OR-combined terms into individual terms. Applied once, before the
	/// first round.
	pub fn with_split_terms(self) -> Self {
		let terms = split_or_terms(&self.terms);

		Self { terms, ..self }
	}

	pub fn targets(&self, source: SourceTag) -> bool {
		self.sources.is_empty() || self.sources.contains(&source)
	}
}

/// Splits `a OR b` style terms, strips wrapping quotes and parentheses, and drops empty
/// and case-insensitively repeated terms while keeping first-seen order.
pub fn split_or_terms(terms: &[String]) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for term in terms {
		for part in OR_COMBINATOR.split(term) {
			let cleaned = part
				.trim()
				.trim_matches(|ch: char| matches!(ch, '(' | ')' | '"' | '\''))
				.trim();

			if cleaned.is_empty() {
				continue;
			}
			if seen.insert(cleaned.to_lowercase()) {
				out.push(cleaned.to_string());
			}
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_legacy_or_terms() {
		let terms = vec![
			"(\"ai ethics\" OR \"algorithmic fairness\")".to_string(),
			"AI Ethics".to_string(),
			"  ".to_string(),
			"healthcare bias or clinical bias".to_string(),
		];

		assert_eq!(
			split_or_terms(&terms),
			vec!["ai ethics", "algorithmic fairness", "healthcare bias", "clinical bias"]
		);
	}

	#[test]
	fn words_containing_or_are_not_split() {
		let terms = vec!["organ donor ORIGIN".to_string()];

		assert_eq!(split_or_terms(&terms), vec!["organ donor ORIGIN"]);
	}
}
