use thiserror::Error;

/// Various errors that can happen while talking to the inference service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(ureq::Error),

    #[error("Server rejected the request ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Server reported an error: {0}")]
    Remote(String),

    #[error("Unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("Unable to encode message: {0}")]
    Encode(serde_json::Error),

    #[error("Invalid response JSON: {0}")]
    InvalidResponseJSON(serde_json::Error),

    #[error("The channel was closed by the server")]
    ConnectionClosed,
}

/// Body the server sends alongside a non-2xx status.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiError {
    /// Splits `ureq`'s status errors out so that the server's own message survives.
    pub(crate) fn from_ureq(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_json::<ErrorBody>()
                    .ok()
                    .and_then(|body| body.error)
                    .unwrap_or_else(|| format!("HTTP {status}"));

                Self::Server { status, message }
            },

            other => Self::Request(other),
        }
    }
}
