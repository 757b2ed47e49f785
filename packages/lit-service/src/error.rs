pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("RPC error: {message}")]
	Rpc { message: String },
}
impl From<lit_providers::Error> for Error {
	fn from(err: lit_providers::Error) -> Self {
		match err {
			lit_providers::Error::Rpc(inner) => Self::Rpc { message: inner.to_string() },
			other => Self::Provider { message: other.to_string() },
		}
	}
}

impl From<lit_rpc::Error> for Error {
	fn from(err: lit_rpc::Error) -> Self {
		Self::Rpc { message: err.to_string() }
	}
}
