use std::sync::Arc;

use lit_domain::{NormalizedRecord, ScoredDocument, quantile, split_or_terms};

use crate::{EmbeddingProvider, Error, Result};

const EMBED_BATCH: usize = 64;
/// Score given to every document when the oracle cannot score the batch.
pub const FALLBACK_DOCUMENT_SCORE: f32 = 0.5;
/// Score given to every phrase when ranking is impossible.
pub const FALLBACK_PHRASE_SCORE: f32 = 1.0;

/// Embedding-based relevance against a research plan.
#[derive(Clone)]
pub struct Scorer {
	provider: Arc<dyn EmbeddingProvider>,
	cfg: lit_config::Embedding,
}
impl Scorer {
	pub fn new(provider: Arc<dyn EmbeddingProvider>, cfg: lit_config::Embedding) -> Self {
		Self { provider, cfg }
	}

	/// Embeds one text. Blank input and oracle failures both yield a zero vector, which
	/// callers treat as unscorable.
	pub async fn embed(&self, text: &str) -> Vec<f32> {
		let trimmed = text.trim();

		if trimmed.is_empty() {
			return self.zero_vector();
		}

		match self.embed_batch(&[trimmed.to_string()]).await {
			Ok(vectors) => vectors.into_iter().next().unwrap_or_else(|| self.zero_vector()),
			Err(err) => {
				tracing::warn!(error = %err, "Embedding failed. Using a zero vector.");

				self.zero_vector()
			},
		}
	}

	/// Embeds `texts` in provider-sized batches, keeping input order.
	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let mut out = Vec::with_capacity(texts.len());

		for chunk in texts.chunks(EMBED_BATCH) {
			let vectors = self.provider.embed(&self.cfg, chunk).await?;

			if vectors.len() != chunk.len() {
				return Err(Error::Provider {
					message: format!(
						"Embedding provider returned {} vectors for {} inputs.",
						vectors.len(),
						chunk.len()
					),
				});
			}

			out.extend(vectors);
		}

		Ok(out)
	}

	/// Ranks phrases by similarity to the plan, highest first, ties in input order.
	///
	/// OR-combined phrases are split first. When the oracle fails or the plan cannot be
	/// embedded, the first `top_k` phrases are returned in input order with a uniform
	/// score.
	pub async fn rank_phrases(
		&self,
		plan_text: &str,
		phrases: &[String],
		top_k: usize,
	) -> Vec<(String, f32)> {
		let phrases = split_or_terms(phrases);

		if phrases.is_empty() || top_k == 0 {
			return Vec::new();
		}

		let mut texts = Vec::with_capacity(phrases.len() + 1);

		texts.push(plan_text.to_string());
		texts.extend(phrases.iter().cloned());

		let vectors = match self.embed_batch(&texts).await {
			Ok(vectors) => vectors,
			Err(err) => {
				tracing::warn!(error = %err, "Phrase ranking failed. Keeping input order.");

				return uniform(phrases, top_k);
			},
		};
		let Some((plan, phrase_vectors)) = vectors.split_first() else {
			return uniform(phrases, top_k);
		};

		if is_zero(plan) {
			tracing::warn!("Plan embedding is a zero vector. Keeping input order.");

			return uniform(phrases, top_k);
		}

		let mut ranked: Vec<(String, f32)> = phrases
			.into_iter()
			.zip(phrase_vectors)
			.map(|(phrase, vector)| {
				let score = cosine_similarity(plan, vector).unwrap_or(0.0);

				(phrase, score)
			})
			.collect();

		// `sort_by` is stable, so equal scores keep input order.
		ranked.sort_by(|lhs, rhs| rhs.1.total_cmp(&lhs.1));
		ranked.truncate(top_k);

		ranked
	}

	/// Cosine similarity of each document's `title. abstract` to the plan.
	///
	/// Zero vectors on either side score 0.0. Errors only when the oracle call itself
	/// fails.
	pub async fn document_scores(
		&self,
		plan_text: &str,
		documents: &[NormalizedRecord],
	) -> Result<Vec<f32>> {
		if documents.is_empty() {
			return Ok(Vec::new());
		}

		let mut texts = Vec::with_capacity(documents.len() + 1);

		texts.push(plan_text.to_string());
		texts.extend(documents.iter().map(NormalizedRecord::embedding_text));

		let vectors = self.embed_batch(&texts).await?;
		let Some((plan, document_vectors)) = vectors.split_first() else {
			return Err(Error::Provider { message: "Plan embedding is missing.".to_string() });
		};

		Ok(document_vectors
			.iter()
			.map(|vector| cosine_similarity(plan, vector).unwrap_or(0.0))
			.collect())
	}

	/// Scores every document. A failed oracle call gives the whole batch a uniform
	/// fallback score.
	pub async fn score_documents(
		&self,
		plan_text: &str,
		documents: Vec<NormalizedRecord>,
	) -> Vec<ScoredDocument> {
		match self.document_scores(plan_text, &documents).await {
			Ok(scores) => documents
				.into_iter()
				.zip(scores)
				.map(|(record, score)| ScoredDocument::new(record, score))
				.collect(),
			Err(err) => {
				tracing::warn!(
					error = %err,
					documents = documents.len(),
					"Document scoring failed. Using a uniform score."
				);

				documents
					.into_iter()
					.map(|record| ScoredDocument::new(record, FALLBACK_DOCUMENT_SCORE))
					.collect()
			},
		}
	}

	fn zero_vector(&self) -> Vec<f32> {
		vec![0.0; (self.cfg.dimensions as usize).max(1)]
	}
}

/// Keeps documents scoring at or above the linearly interpolated `quantile` of the
/// score distribution.
///
/// Empty, flat, or non-finite distributions keep everything with a cutoff of 0.0.
pub fn filter_by_quantile(
	documents: Vec<ScoredDocument>,
	quantile: f32,
) -> (Vec<ScoredDocument>, f32) {
	let scores: Vec<f32> = documents.iter().map(|document| document.score).collect();

	if quantile::is_degenerate(&scores) {
		if !documents.is_empty() {
			tracing::debug!(documents = documents.len(), "Score distribution is degenerate.");
		}

		return (documents, 0.0);
	}

	let Some(cutoff) = quantile::linear(&scores, quantile) else {
		tracing::warn!(quantile, "Quantile cutoff could not be computed. Keeping every document.");

		return (documents, 0.0);
	};
	let kept = documents.into_iter().filter(|document| document.score >= cutoff).collect();

	(kept, cutoff)
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

fn is_zero(vector: &[f32]) -> bool {
	vector.iter().all(|value| *value == 0.0)
}

fn uniform(phrases: Vec<String>, top_k: usize) -> Vec<(String, f32)> {
	phrases.into_iter().take(top_k).map(|phrase| (phrase, FALLBACK_PHRASE_SCORE)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use lit_domain::{ExternalIds, SourceTag};

	fn doc(title: &str, score: f32) -> ScoredDocument {
		let record = NormalizedRecord {
			id: uuid_for(title),
			source: SourceTag::OpenAlex,
			title: title.to_string(),
			authors: Vec::new(),
			abstract_text: "Abstract.".to_string(),
			external_id: format!("openalex:{title}"),
			ids: ExternalIds::default(),
			year: None,
			journal: None,
			url: None,
			citation_count: None,
			publication_type: None,
			tags: Vec::new(),
			raw: serde_json::Value::Null,
			retrieved_at: time::OffsetDateTime::UNIX_EPOCH,
		};

		ScoredDocument::new(record, score)
	}

	fn uuid_for(title: &str) -> uuid::Uuid {
		uuid::Uuid::from_u128(title.len() as u128)
	}

	#[test]
	fn cosine_similarity_rejects_zero_and_mismatched_vectors() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
		assert_eq!(cosine_similarity(&[], &[]), None);
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), Some(-1.0));
	}

	#[test]
	fn quantile_filter_keeps_top_fraction() {
		let docs = [0.9, 0.8, 0.7, 0.6, 0.1]
			.into_iter()
			.enumerate()
			.map(|(idx, score)| doc(&"d".repeat(idx + 1), score))
			.collect();
		let (kept, cutoff) = filter_by_quantile(docs, 0.8);

		assert!((cutoff - 0.82).abs() < 1e-6, "cutoff was {cutoff}");
		assert_eq!(kept.len(), 1);
		assert_eq!(kept[0].score, 0.9);
	}

	#[test]
	fn kept_fraction_never_exceeds_complement() {
		let scores = [0.12, 0.55, 0.31, 0.98, 0.77, 0.42, 0.66, 0.05, 0.89, 0.23];

		for quantile in [0.0_f32, 0.25, 0.5, 0.8, 0.9, 1.0] {
			let docs = scores
				.iter()
				.enumerate()
				.map(|(idx, score)| doc(&"d".repeat(idx + 1), *score))
				.collect();
			let (kept, _) = filter_by_quantile(docs, quantile);
			let fraction = kept.len() as f32 / scores.len() as f32;

			// One document may sit exactly on the cutoff when the position is integral.
			assert!(
				fraction <= 1.0 - quantile + 1.0 / scores.len() as f32 + 1e-6,
				"quantile {quantile} kept {fraction}"
			);
		}
	}

	#[test]
	fn degenerate_distributions_fail_open() {
		let flat = vec![doc("a", 0.5), doc("bb", 0.5), doc("ccc", 0.5)];
		let (kept, cutoff) = filter_by_quantile(flat, 0.8);

		assert_eq!(kept.len(), 3);
		assert_eq!(cutoff, 0.0);

		let (kept, cutoff) = filter_by_quantile(Vec::new(), 0.8);

		assert!(kept.is_empty());
		assert_eq!(cutoff, 0.0);

		let (kept, cutoff) = filter_by_quantile(vec![doc("a", f32::NAN), doc("bb", 0.3)], 0.5);

		assert_eq!(kept.len(), 2);
		assert_eq!(cutoff, 0.0);
	}
}
