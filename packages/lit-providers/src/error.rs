pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Xml(#[from] quick_xml::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error(transparent)]
	Rpc(#[from] lit_rpc::Error),
	#[error("Search term must be non-empty.")]
	InvalidTerm,
	#[error("Still rate limited after {attempts} attempts.")]
	RateLimited { attempts: u32 },
	#[error("Request failed with permanent status {status}: {message}")]
	Permanent { status: u16, message: String },
	#[error("Request failed after {attempts} attempts: {message}")]
	Exhausted { attempts: u32, message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
