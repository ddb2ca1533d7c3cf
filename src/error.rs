use thiserror::Error;

pub type AppResult<T> = Result<T, Error>;

/// Everything in this crate fails by value; nothing aborts the process.
///
/// `code()` is the machine-readable side of each variant, mirroring the
/// `{data, error}` envelopes of the hosted services this crate talks to.
#[derive(Debug, Error)]
pub enum Error {
    /// Caught before any network call is made.
    #[error("{0}")]
    Validation(String),

    /// The operation needs an authenticated session and there is none.
    #[error("no active session")]
    NoSession,

    /// Distinguished single-row miss. The only error used as control flow:
    /// room provisioning creates on this and aborts on everything else.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A row or object already exists where a fresh insert was required.
    #[error("{0} already exists")]
    Conflict(String),

    /// Rejection from a backend service, with its machine-readable code.
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    /// The realtime channel was released or the transport went away.
    #[error("realtime channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl Error {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation",
            Error::NoSession => "no_session",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Rejected { code, .. } => code,
            Error::ChannelClosed => "channel_closed",
            Error::Db(_) => "db_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Validation(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Validation(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_the_only_recoverable_code() {
        assert!(Error::NotFound("room").is_not_found());
        assert!(!Error::rejected("db_error", "boom").is_not_found());
        assert!(!Error::Conflict("room u1_u2".into()).is_not_found());
    }

    #[test]
    fn rejections_keep_their_backend_code() {
        let err = Error::rejected("invalid_credentials", "invalid login credentials");
        assert_eq!(err.code(), "invalid_credentials");
        assert_eq!(err.to_string(), "invalid_credentials: invalid login credentials");
    }
}
