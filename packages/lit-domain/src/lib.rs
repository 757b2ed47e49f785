pub mod dedupe;
pub mod normalize;
pub mod plan;
pub mod quantile;
pub mod query;
pub mod record;
pub mod report;
pub mod scored;
pub mod time_serde;

pub use dedupe::{Deduplicator, dedupe, title_key};
pub use normalize::{normalize, normalize_one};
pub use plan::ResearchPlan;
pub use query::{SearchQuery, split_or_terms};
pub use record::{
	AbstractSection, ArxivEntry, ExternalIds, NormalizedRecord, PubMedArticle, PubMedReference,
	RawRecord, SourceTag,
};
pub use report::{RoundSummary, SearchReport};
pub use scored::{ExpansionCandidate, Provenance, ScoredDocument};
