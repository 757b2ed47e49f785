use std::{
	collections::{BTreeMap, HashSet},
	time::Duration,
};

use time::OffsetDateTime;

use lit_domain::{
	Deduplicator, NormalizedRecord, Provenance, RawRecord, RoundSummary, ScoredDocument,
	SearchQuery, SearchReport, SourceTag,
};

use crate::{
	Error, LiteratureService, Result, Scorer,
	expansion::{self, Expander},
	scoring, sources, terms,
};

/// Pipeline progress. Rounds after 0 are expansion rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
	Initializing,
	Searching,
	Scoring { round: u32 },
	Expanding { round: u32 },
	Done,
}
impl PipelineState {
	pub fn label(self) -> &'static str {
		match self {
			Self::Initializing => "initializing",
			Self::Searching => "searching",
			Self::Scoring { .. } => "scoring",
			Self::Expanding { .. } => "expanding",
			Self::Done => "done",
		}
	}

	/// Next state once the `Scoring` state of `round` kept `kept` documents.
	pub fn after_scoring(round: u32, kept: usize, max_rounds: u32) -> Self {
		if kept == 0 || round >= max_rounds {
			Self::Done
		} else {
			Self::Expanding { round: round + 1 }
		}
	}
}

/// Accumulators for one run. Folded into the report once the run is done.
struct Run {
	plan_text: String,
	terms: Vec<String>,
	pending: Vec<(NormalizedRecord, Provenance)>,
	pending_phase: &'static str,
	round_fetched: usize,
	fetched: usize,
	unique: usize,
	per_source: BTreeMap<String, usize>,
	dedup: Deduplicator,
	seen_ids: HashSet<String>,
	last_kept: Vec<ScoredDocument>,
	records: Vec<ScoredDocument>,
	rounds: Vec<RoundSummary>,
	errors: Vec<String>,
}
impl Run {
	fn new(plan_text: String) -> Self {
		Self {
			plan_text,
			terms: Vec::new(),
			pending: Vec::new(),
			pending_phase: "searching",
			round_fetched: 0,
			fetched: 0,
			unique: 0,
			per_source: BTreeMap::new(),
			dedup: Deduplicator::new(),
			seen_ids: HashSet::new(),
			last_kept: Vec::new(),
			records: Vec::new(),
			rounds: Vec::new(),
			errors: Vec::new(),
		}
	}

	fn count_fetched(&mut self, source: SourceTag, count: usize) {
		self.round_fetched += count;
		self.fetched += count;
		*self.per_source.entry(source.as_str().to_string()).or_default() += count;
	}
}

/// Sequences search, scoring, and expansion rounds for one query.
pub struct Pipeline<'a> {
	service: &'a LiteratureService,
	scorer: Scorer,
	expander: Expander<'a>,
	call_timeout: Duration,
}
impl<'a> Pipeline<'a> {
	pub fn new(service: &'a LiteratureService) -> Self {
		Self {
			service,
			scorer: service.scorer(),
			expander: Expander::new(&service.sources, &service.cfg),
			call_timeout: Duration::from_millis(service.cfg.retry.call_timeout_ms),
		}
	}

	/// Runs every state until `Done` and assembles the report.
	///
	/// Fails only on an invalid query. Source, scoring, and storage failures degrade the
	/// result and are listed in the report's `errors`.
	pub async fn run(&self, query: SearchQuery) -> Result<SearchReport> {
		let query = query.with_split_terms();

		self.validate(&query)?;

		let started_at = OffsetDateTime::now_utc();
		let rate_limited_before = self.service.sources.rate_limited();
		let max_rounds = query.search_depth.min(self.service.cfg.expansion.rounds);
		let mut run = Run::new(query.plan.to_text());
		let mut state = PipelineState::Initializing;

		tracing::info!(
			review_id = %query.review_id,
			plan_id = %query.plan_id,
			terms = query.terms.len(),
			max_rounds,
			"Literature search started."
		);

		loop {
			tracing::debug!(state = state.label(), "Pipeline state entered.");

			state = match state {
				PipelineState::Initializing => {
					run.terms = terms::prepare_terms(
						&self.scorer,
						&run.plan_text,
						&query.terms,
						self.service.cfg.scoring.top_k_terms as usize,
					)
					.await;

					PipelineState::Searching
				},
				PipelineState::Searching => {
					run.pending_phase = state.label();

					self.search(&query, &mut run).await;

					PipelineState::Scoring { round: 0 }
				},
				PipelineState::Scoring { round } => {
					let kept = self.score_round(round, &mut run).await;

					PipelineState::after_scoring(round, kept, max_rounds)
				},
				PipelineState::Expanding { round } => {
					run.pending_phase = state.label();

					self.expand(&mut run).await;

					PipelineState::Scoring { round }
				},
				PipelineState::Done => break,
			};
		}

		self.store(&query, &mut run).await;

		let report = SearchReport {
			review_id: query.review_id,
			plan_id: query.plan_id,
			fetched: run.fetched,
			unique: run.unique,
			duplicates: run.dedup.duplicates(),
			per_source: run.per_source,
			rate_limited: self.service.sources.rate_limited().saturating_sub(rate_limited_before),
			rounds: run.rounds,
			errors: run.errors,
			started_at,
			finished_at: OffsetDateTime::now_utc(),
			records: run.records,
		};

		tracing::info!(
			review_id = %report.review_id,
			fetched = report.fetched,
			unique = report.unique,
			kept = report.records.len(),
			errors = report.errors.len(),
			"Literature search finished."
		);

		Ok(report)
	}

	fn validate(&self, query: &SearchQuery) -> Result<()> {
		if query.plan.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Research plan must be non-empty.".to_string(),
			});
		}
		if query.terms.is_empty() {
			return Err(Error::InvalidRequest {
				message: "At least one non-empty search term is required.".to_string(),
			});
		}
		if query.max_results == 0 {
			return Err(Error::InvalidRequest {
				message: "max_results must be greater than zero.".to_string(),
			});
		}
		if self.service.sources.targeted(query).next().is_none() {
			return Err(Error::InvalidRequest {
				message: "No enabled source matches the requested sources.".to_string(),
			});
		}

		Ok(())
	}

	/// Round 0: every targeted source is queried with every term. Each call is bounded by
	/// the call timeout so one slow source cannot stall the round.
	async fn search(&self, query: &SearchQuery, run: &mut Run) {
		let max_results = query.max_results;
		let calls = self
			.service
			.sources
			.targeted(query)
			.flat_map(|connector| run.terms.iter().map(move |term| (connector, term.clone())))
			.collect();
		let outcomes = sources::fan_out(calls, self.call_timeout, |connector, term| async move {
			connector.query(&term, max_results).await
		})
		.await;
		let mut by_source: BTreeMap<SourceTag, Vec<RawRecord>> = self
			.service
			.sources
			.targeted(query)
			.map(|connector| (connector.tag(), Vec::new()))
			.collect();
		let mut answered = HashSet::new();

		for (connector, term, outcome) in outcomes {
			let source = connector.tag();

			match outcome {
				Some(records) => {
					answered.insert(source);
					by_source.entry(source).or_default().extend(records);
				},
				None => {
					tracing::warn!(source = %source, term = %term, "Source query timed out.");

					run.errors.push(format!("Source {source} timed out for term \"{term}\"."));
				},
			}
		}

		for (source, raw) in by_source {
			run.count_fetched(source, raw.len());

			if raw.is_empty() {
				// A source that timed out on every term already has its errors.
				if answered.contains(&source) {
					run.errors.push(format!("Source {source} returned no records."));
				}

				continue;
			}

			let normalized = lit_domain::normalize(&raw, source);

			tracing::debug!(
				source = %source,
				fetched = raw.len(),
				normalized = normalized.len(),
				"Source results normalized."
			);

			run.pending.extend(normalized.into_iter().map(|record| (record, Provenance::None)));
		}
	}

	/// Dedupes, scores, and filters the records gathered for `round`. Returns how many
	/// documents survived.
	async fn score_round(&self, round: u32, run: &mut Run) -> usize {
		let pending = std::mem::take(&mut run.pending);
		let fetched = std::mem::take(&mut run.round_fetched);

		for (record, _) in &pending {
			run.seen_ids.extend(record.known_ids());
		}

		let unique: Vec<(NormalizedRecord, Provenance)> =
			pending.into_iter().filter(|(record, _)| run.dedup.accept(record)).collect();
		let unique_count = unique.len();
		let scoring_cfg = &self.service.cfg.scoring;
		let (kept, cutoff) = if round == 0 {
			let records = unique.into_iter().map(|(record, _)| record).collect();
			let scored = self.scorer.score_documents(&run.plan_text, records).await;

			scoring::filter_by_quantile(scored, scoring_cfg.quantile)
		} else {
			expansion::score_candidates(
				&self.scorer,
				&run.plan_text,
				unique,
				scoring_cfg.quantile,
				scoring_cfg.fallback_prefix as usize,
			)
			.await
		};

		run.unique += unique_count;
		run.rounds.push(RoundSummary {
			round,
			phase: run.pending_phase.to_string(),
			fetched,
			unique: unique_count,
			kept: kept.len(),
			cutoff,
		});

		tracing::info!(
			round,
			fetched,
			unique = unique_count,
			kept = kept.len(),
			cutoff,
			"Round scored."
		);

		let kept_count = kept.len();

		if kept_count > 0 {
			run.records.extend(kept.iter().cloned());
			run.last_kept = kept;
		}

		kept_count
	}

	/// Gathers the next round's records from the citation graph around the last kept set.
	async fn expand(&self, run: &mut Run) {
		let candidates = self.expander.candidates(&run.last_kept, &run.seen_ids).await;

		if !candidates.timed_out.is_empty() {
			run.errors.push(format!(
				"Citing paper lookups timed out: {}.",
				candidates.timed_out.len()
			));
		}
		if candidates.found.is_empty() {
			tracing::info!("No expansion candidates found.");

			return;
		}

		let fetched = self.expander.fetch(&candidates.found).await;

		if !fetched.timed_out.is_empty() {
			run.errors.push(format!("Candidate fetches timed out: {}.", fetched.timed_out.len()));
		}

		for item in &fetched.found {
			run.count_fetched(item.raw.source(), 1);
		}

		run.pending = expansion::normalize_fetched(&fetched.found);
	}

	async fn store(&self, query: &SearchQuery, run: &mut Run) {
		if !self.service.cfg.storage.enabled {
			return;
		}

		let Some(sink) = self.service.providers.sink.as_ref() else {
			tracing::warn!("Storage is enabled but no record sink is configured.");

			return;
		};

		for record in &run.records {
			if let Err(err) = sink.store(query, record).await {
				tracing::warn!(
					error = %err,
					external_id = %record.record.external_id,
					"Storage write failed."
				);

				run.errors.push(format!(
					"Storage write failed for {}: {err}",
					record.record.external_id
				));
			}
		}
	}
}
