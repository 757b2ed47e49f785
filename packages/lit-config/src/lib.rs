mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Embedding, EmbeddingMode, Expansion, Retry, Rpc, Scoring, Service, SourceConfig,
	Sources, Storage,
};

use std::{fs, path::Path};

pub const CITATION_SOURCES: [&str; 2] = ["openalex", "semantic_scholar"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.rpc.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "rpc.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.rpc.max_frame_bytes == 0 {
		return Err(Error::Validation {
			message: "rpc.max_frame_bytes must be greater than zero.".to_string(),
		});
	}
	if cfg.rpc.client_id.trim().is_empty() {
		return Err(Error::Validation { message: "rpc.client_id must be non-empty.".to_string() });
	}
	if cfg.retry.call_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "retry.call_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, source) in sources(cfg) {
		if !source.enabled {
			continue;
		}
		if source.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("sources.{label}.api_base must be non-empty."),
			});
		}
		if source.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("sources.{label}.timeout_ms must be greater than zero."),
			});
		}
		if source.max_results == 0 {
			return Err(Error::Validation {
				message: format!("sources.{label}.max_results must be greater than zero."),
			});
		}

		if let (Some(from), Some(to)) = (source.year_from, source.year_to)
			&& from > to
		{
			return Err(Error::Validation {
				message: format!("sources.{label}.year_from must not be after year_to."),
			});
		}
	}

	if !sources(cfg).iter().any(|(_, source)| source.enabled) {
		return Err(Error::Validation {
			message: "At least one source must be enabled.".to_string(),
		});
	}
	if cfg.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.mode == EmbeddingMode::Http && cfg.embedding.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "embedding.api_base must be non-empty when embedding.mode is http."
				.to_string(),
		});
	}
	if cfg.embedding.mode == EmbeddingMode::Rpc && cfg.embedding.rpc_action.trim().is_empty() {
		return Err(Error::Validation {
			message: "embedding.rpc_action must be non-empty when embedding.mode is rpc."
				.to_string(),
		});
	}
	if !cfg.scoring.quantile.is_finite() {
		return Err(Error::Validation {
			message: "scoring.quantile must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.scoring.quantile) {
		return Err(Error::Validation {
			message: "scoring.quantile must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.scoring.top_k_terms == 0 {
		return Err(Error::Validation {
			message: "scoring.top_k_terms must be greater than zero.".to_string(),
		});
	}
	if cfg.expansion.limit_per_paper == 0 {
		return Err(Error::Validation {
			message: "expansion.limit_per_paper must be greater than zero.".to_string(),
		});
	}
	if cfg.expansion.max_candidates == 0 {
		return Err(Error::Validation {
			message: "expansion.max_candidates must be greater than zero.".to_string(),
		});
	}
	if !CITATION_SOURCES.contains(&cfg.expansion.citation_source.as_str()) {
		return Err(Error::Validation {
			message: "expansion.citation_source must be one of openalex or semantic_scholar."
				.to_string(),
		});
	}

	let citation_enabled = match cfg.expansion.citation_source.as_str() {
		"openalex" => cfg.sources.openalex.enabled,
		_ => cfg.sources.semantic_scholar.enabled,
	};

	if cfg.expansion.rounds > 0 && !citation_enabled {
		return Err(Error::Validation {
			message: format!(
				"sources.{} must be enabled when expansion.rounds is greater than zero.",
				cfg.expansion.citation_source
			),
		});
	}
	if cfg.storage.enabled && cfg.storage.action.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.action must be non-empty when storage is enabled.".to_string(),
		});
	}

	Ok(())
}

fn sources(cfg: &Config) -> [(&'static str, &SourceConfig); 5] {
	[
		("pubmed", &cfg.sources.pubmed),
		("arxiv", &cfg.sources.arxiv),
		("openalex", &cfg.sources.openalex),
		("core", &cfg.sources.core),
		("semantic_scholar", &cfg.sources.semantic_scholar),
	]
}

fn normalize(cfg: &mut Config) {
	for source in [
		&mut cfg.sources.pubmed,
		&mut cfg.sources.arxiv,
		&mut cfg.sources.openalex,
		&mut cfg.sources.core,
		&mut cfg.sources.semantic_scholar,
	] {
		if source.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
			source.api_key = None;
		}
		if source.contact_email.as_deref().map(|email| email.trim().is_empty()).unwrap_or(false)
		{
			source.contact_email = None;
		}
	}

	if cfg.embedding.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.embedding.api_key = None;
	}
}

/// Parses and validates configuration from an in-memory TOML document.
pub fn from_toml_str(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw).map_err(|err| Error::ParseConfig {
		path: std::path::PathBuf::from("<inline>"),
		source: err,
	})?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}
