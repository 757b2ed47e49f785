use lit_domain::split_or_terms;

use crate::Scorer;

/// Cleans candidate terms and keeps the `top_k` most relevant to the plan.
///
/// Terms are trimmed, OR-combined terms split, and case-insensitive repeats dropped.
/// Ranking only runs when there are more terms than `top_k`.
pub async fn prepare_terms(
	scorer: &Scorer,
	plan_text: &str,
	terms: &[String],
	top_k: usize,
) -> Vec<String> {
	let cleaned = split_or_terms(terms);

	if cleaned.len() <= top_k {
		return cleaned;
	}

	let ranked = scorer.rank_phrases(plan_text, &cleaned, top_k).await;

	tracing::debug!(
		candidates = cleaned.len(),
		kept = ranked.len(),
		"Ranked search terms against the plan."
	);

	ranked.into_iter().map(|(phrase, _)| phrase).collect()
}
