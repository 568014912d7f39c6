use thiserror::Error;

/// Broad classification of [`Error`], used by callers that only need to know
/// whether the document or their own parameters were at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed XML at position {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("missing <{0}> element")]
    MissingElement(&'static str),

    #[error("track point {index} is missing the `{attribute}` attribute")]
    MissingAttribute {
        index: usize,
        attribute: &'static str,
    },

    #[error("track point {index}: `{field}` is not a number: {value:?}")]
    InvalidNumber {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("track point {index} has no <time> element")]
    MissingTime { index: usize },

    #[error("track point {index}: invalid timestamp {value:?}")]
    InvalidTime { index: usize, value: String },

    #[error("invalid maximum distance {0}: expected a finite number of meters greater than 0")]
    InvalidMaxDistance(f64),

    #[error("cannot split a {distance} m gap into steps of {max_distance} m")]
    UnboundedInterpolation { distance: f64, max_distance: f64 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMaxDistance(_) | Error::UnboundedInterpolation { .. } => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Parse,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
