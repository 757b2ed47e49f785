use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
	time::Duration,
};

use serde_json::Value;
use time::OffsetDateTime;

use lit_domain::{
	ExpansionCandidate, NormalizedRecord, Provenance, RawRecord, ScoredDocument, SourceTag,
	normalize::{clean_doi, url_suffix},
	normalize_one,
};
use lit_providers::SourceConnector;

use crate::{
	Scorer, SourceSet,
	scoring::{self, FALLBACK_DOCUMENT_SCORE},
	sources,
};

/// Reference ids found in each document's raw payload, in canonical `prefix:id` form.
///
/// OpenAlex lists references as work URLs; Semantic Scholar as `{ paperId }` objects;
/// PubMed as reference-list entries, taken by PMID and else by DOI. Ids naming the
/// document itself are left out.
pub fn extract_references(documents: &[ScoredDocument]) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for document in documents {
		let own: HashSet<String> = document.record.known_ids().into_iter().collect();

		for id in references_of(&document.record) {
			if !own.contains(&id) && seen.insert(id.clone()) {
				out.push(id);
			}
		}
	}

	out
}

fn references_of(record: &NormalizedRecord) -> Vec<String> {
	let Some(payload) = record.raw.get("payload") else { return Vec::new() };

	match record.source {
		SourceTag::OpenAlex => payload
			.get("referenced_works")
			.and_then(Value::as_array)
			.map(|works| {
				works
					.iter()
					.filter_map(Value::as_str)
					.filter_map(url_suffix)
					.map(|id| format!("openalex:{id}"))
					.collect()
			})
			.unwrap_or_default(),
		SourceTag::SemanticScholar => payload
			.get("references")
			.and_then(Value::as_array)
			.map(|references| {
				references
					.iter()
					.filter_map(|reference| reference.get("paperId").and_then(Value::as_str))
					.filter(|paper_id| !paper_id.trim().is_empty())
					.map(|paper_id| format!("s2:{paper_id}"))
					.collect()
			})
			.unwrap_or_default(),
		SourceTag::PubMed => payload
			.get("references")
			.and_then(Value::as_array)
			.map(|references| references.iter().filter_map(pubmed_reference_id).collect())
			.unwrap_or_default(),
		_ => Vec::new(),
	}
}

fn pubmed_reference_id(reference: &Value) -> Option<String> {
	let field = |key: &str| {
		reference.get(key).and_then(Value::as_str).map(str::trim).filter(|id| !id.is_empty())
	};

	if let Some(pmid) = field("pmid") {
		return Some(format!("pmid:{pmid}"));
	}

	field("doi").and_then(clean_doi).map(|doi| format!("doi:{doi}"))
}

/// Unions reference and citing ids into tagged candidates.
///
/// Ids in `exclude` are dropped. Candidates found through both links come first, then
/// the rest in discovery order, capped at `max_candidates`.
pub fn merge_candidates(
	references: &[String],
	citing: &[String],
	exclude: &HashSet<String>,
	max_candidates: usize,
) -> Vec<ExpansionCandidate> {
	let mut positions: HashMap<&str, usize> = HashMap::new();
	let mut tags: Vec<(&str, Provenance)> = Vec::new();

	for (ids, provenance) in [(references, Provenance::Reference), (citing, Provenance::Citation)] {
		for id in ids {
			if exclude.contains(id) {
				continue;
			}

			match positions.get(id.as_str()) {
				Some(&position) => tags[position].1 = tags[position].1.merge(provenance),
				None => {
					positions.insert(id.as_str(), tags.len());
					tags.push((id.as_str(), provenance));
				},
			}
		}
	}

	tags.sort_by_key(|(_, provenance)| *provenance != Provenance::Both);

	tags.into_iter()
		.take(max_candidates)
		.map(|(id, provenance)| ExpansionCandidate { id: id.to_string(), provenance })
		.collect()
}

/// Scores expansion records and applies the quantile filter.
///
/// When the oracle fails the round keeps a bounded prefix of the input with a uniform
/// score instead of dropping everything.
pub async fn score_candidates(
	scorer: &Scorer,
	plan_text: &str,
	records: Vec<(NormalizedRecord, Provenance)>,
	quantile: f32,
	fallback_prefix: usize,
) -> (Vec<ScoredDocument>, f32) {
	let (records, provenance): (Vec<_>, Vec<_>) = records.into_iter().unzip();

	match scorer.document_scores(plan_text, &records).await {
		Ok(scores) => {
			let scored = records
				.into_iter()
				.zip(scores)
				.zip(provenance)
				.map(|((record, score), tag)| {
					ScoredDocument::new(record, score).with_provenance(tag)
				})
				.collect();

			scoring::filter_by_quantile(scored, quantile)
		},
		Err(err) => {
			tracing::warn!(
				error = %err,
				documents = records.len(),
				kept = fallback_prefix.min(records.len()),
				"Expansion scoring failed. Keeping an unscored prefix."
			);

			let prefix = records
				.into_iter()
				.zip(provenance)
				.take(fallback_prefix)
				.map(|(record, tag)| {
					ScoredDocument::new(record, FALLBACK_DOCUMENT_SCORE).with_provenance(tag)
				})
				.collect();

			(prefix, 0.0)
		},
	}
}

/// A record fetched for an expansion candidate.
#[derive(Debug, Clone)]
pub struct Fetched {
	pub raw: RawRecord,
	pub provenance: Provenance,
}

/// Results of a batch of connector lookups, plus the ids whose lookup ran out of time.
#[derive(Debug, Clone, Default)]
pub struct Lookup<T> {
	pub found: T,
	pub timed_out: Vec<String>,
}

/// Walks the citation graph around a scored set through the configured connectors.
pub struct Expander<'a> {
	sources: &'a SourceSet,
	citation_source: SourceTag,
	limit_per_paper: u32,
	max_candidates: usize,
	call_timeout: Duration,
}
impl<'a> Expander<'a> {
	pub fn new(sources: &'a SourceSet, cfg: &lit_config::Config) -> Self {
		Self {
			sources,
			citation_source: SourceTag::parse(&cfg.expansion.citation_source)
				.unwrap_or(SourceTag::OpenAlex),
			limit_per_paper: cfg.expansion.limit_per_paper,
			max_candidates: cfg.expansion.max_candidates as usize,
			call_timeout: Duration::from_millis(cfg.retry.call_timeout_ms),
		}
	}

	pub fn citation_source(&self) -> SourceTag {
		self.citation_source
	}

	/// Ids of papers citing each document, at most `limit_per_paper` per document.
	///
	/// Documents from a citation-capable source are looked up natively; others go to the
	/// citation source by DOI. A failed lookup only loses that document's citations.
	pub async fn extract_citing_papers(
		&self,
		documents: &[ScoredDocument],
	) -> Lookup<Vec<String>> {
		let calls = documents
			.iter()
			.enumerate()
			.filter_map(|(index, document)| {
				let (connector, id) = self.citation_lookup(&document.record)?;

				Some((connector, (index, id)))
			})
			.collect();
		let limit = self.limit_per_paper;
		let outcomes =
			sources::fan_out(calls, self.call_timeout, |connector, (_, id): (usize, String)| {
				async move { connector.citing_papers(&id, limit).await }
			})
			.await;
		let mut lookup: Lookup<Vec<String>> = Lookup::default();
		let mut seen = HashSet::new();

		for (connector, (index, id), outcome) in outcomes {
			let Some(citing) = outcome else {
				tracing::warn!(
					source = %connector.tag(),
					id = %id,
					"Citing paper lookup timed out."
				);

				lookup.timed_out.push(id);

				continue;
			};
			let own: HashSet<String> = documents[index].record.known_ids().into_iter().collect();

			for citing_id in citing
				.into_iter()
				.filter(|citing_id| !own.contains(citing_id))
				.take(limit as usize)
			{
				if seen.insert(citing_id.clone()) {
					lookup.found.push(citing_id);
				}
			}
		}

		lookup
	}

	/// Reference and citation candidates for the next round, minus ids already seen.
	pub async fn candidates(
		&self,
		documents: &[ScoredDocument],
		exclude: &HashSet<String>,
	) -> Lookup<Vec<ExpansionCandidate>> {
		let references = extract_references(documents);
		let citing = self.extract_citing_papers(documents).await;
		let candidates =
			merge_candidates(&references, &citing.found, exclude, self.max_candidates);

		tracing::debug!(
			references = references.len(),
			citing = citing.found.len(),
			candidates = candidates.len(),
			"Collected expansion candidates."
		);

		Lookup { found: candidates, timed_out: citing.timed_out }
	}

	/// Resolves candidates through the connector named by each id. Unresolvable ids are
	/// skipped; timed-out ones are reported.
	pub async fn fetch(&self, candidates: &[ExpansionCandidate]) -> Lookup<Vec<Fetched>> {
		let calls = candidates
			.iter()
			.filter_map(|candidate| {
				let Some(connector) = self.sources.for_id(&candidate.id, self.citation_source)
				else {
					tracing::debug!(id = %candidate.id, "No connector can resolve candidate.");

					return None;
				};

				Some((connector, candidate.clone()))
			})
			.collect();
		let outcomes =
			sources::fan_out(calls, self.call_timeout, |connector, candidate: ExpansionCandidate| {
				async move { connector.fetch_by_id(&candidate.id).await }
			})
			.await;
		let mut lookup: Lookup<Vec<Fetched>> = Lookup::default();

		for (_, candidate, outcome) in outcomes {
			match outcome {
				Some(Some(raw)) =>
					lookup.found.push(Fetched { raw, provenance: candidate.provenance }),
				Some(None) => {},
				None => {
					tracing::warn!(id = %candidate.id, "Candidate fetch timed out.");

					lookup.timed_out.push(candidate.id);
				},
			}
		}

		lookup
	}

	/// Fetches, normalizes, scores, and filters one batch of candidates. Records without
	/// an abstract are dropped during normalization.
	pub async fn fetch_and_score(
		&self,
		candidates: &[ExpansionCandidate],
		scorer: &Scorer,
		plan_text: &str,
		quantile: f32,
		fallback_prefix: usize,
	) -> (Vec<ScoredDocument>, f32) {
		let fetched = self.fetch(candidates).await;
		let records = normalize_fetched(&fetched.found);

		score_candidates(scorer, plan_text, records, quantile, fallback_prefix).await
	}

	fn citation_lookup(
		&self,
		record: &NormalizedRecord,
	) -> Option<(&'a Arc<dyn SourceConnector>, String)> {
		if record.source.supports_citations()
			&& let Some(native) = record.ids.native(record.source)
			&& let Some(connector) = self.sources.get(record.source)
		{
			return Some((connector, format!("{}:{native}", record.source.id_prefix())));
		}

		let connector = self.sources.get(self.citation_source)?;

		if let Some(native) = record.ids.native(self.citation_source) {
			return Some((connector, format!("{}:{native}", self.citation_source.id_prefix())));
		}

		record.ids.doi.as_ref().map(|doi| (connector, format!("doi:{doi}")))
	}
}

pub fn normalize_fetched(fetched: &[Fetched]) -> Vec<(NormalizedRecord, Provenance)> {
	let now = OffsetDateTime::now_utc();

	fetched
		.iter()
		.filter_map(|item| normalize_one(&item.raw, now).map(|record| (record, item.provenance)))
		.collect()
}
