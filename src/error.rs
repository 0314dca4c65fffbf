use std::fmt;

use thiserror::Error;

/// Which management-API fetch a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Usage,
    Credentials,
    Quota,
}

impl fmt::Display for Fetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fetch::Usage => "usage stats",
            Fetch::Credentials => "credential list",
            Fetch::Quota => "credential quota",
        };
        f.write_str(name)
    }
}

/// Errors that abort a single report invocation.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to fetch {fetch}: could not reach the service")]
    Transport {
        fetch: Fetch,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to fetch {fetch}: admin secret rejected (HTTP {status})")]
    Auth { fetch: Fetch, status: u16 },
    #[error("failed to fetch {fetch}: unexpected HTTP {status}")]
    Status { fetch: Fetch, status: u16 },
    #[error("failed to read {fetch}: {detail}")]
    Format { fetch: Fetch, detail: String },
}

impl QueryError {
    pub fn format(fetch: Fetch, detail: impl Into<String>) -> Self {
        QueryError::Format {
            fetch,
            detail: detail.into(),
        }
    }

    pub fn fetch(&self) -> Fetch {
        match self {
            QueryError::Transport { fetch, .. }
            | QueryError::Auth { fetch, .. }
            | QueryError::Status { fetch, .. }
            | QueryError::Format { fetch, .. } => *fetch,
        }
    }
}
