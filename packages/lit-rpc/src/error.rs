pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("RPC call {correlation_id} timed out after {timeout_ms} ms.")]
	Timeout { correlation_id: String, timeout_ms: u64 },
	#[error("RPC connection lost.")]
	ConnectionLost,
	#[error("RPC channel is not connected.")]
	NotConnected,
	#[error("Correlation id {correlation_id} is already in flight.")]
	DuplicateCorrelationId { correlation_id: String },
	#[error("Remote call failed: {message}")]
	Remote { message: String },
	#[error("Failed to connect to {addr}: {message}")]
	Connect { addr: String, message: String },
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
