use reqwest::StatusCode;

/// Failure of a single upstream fetch attempt.
///
/// Every variant is transient from the service's point of view: the next
/// scheduled or request-triggered refresh simply tries again.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("rate limited by {url}")]
    RateLimited { url: String },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("failed to fetch any {0}")]
    Empty(&'static str),
}

impl FetchError {
    pub fn request(url: &str, source: reqwest::Error) -> Self {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        FetchError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request { source, .. } if source.is_timeout())
    }
}

/// Turns a non-success response into [`FetchError::Status`].
pub fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(response)
}
