use thiserror::Error;

/// Enumerates the different types of errors
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum TfError {
    /// A frame name was never published, an id is out of range, or the
    /// traversal exceeded the depth limit (the tree contains a loop).
    #[error("tf_buffer_core: LookupError, {0}")]
    Lookup(String),
    /// Both endpoints exist but no path links them.
    #[error("tf_buffer_core: ConnectivityError, {0}")]
    Connectivity(String),
    /// A path exists but the requested time falls outside the configured
    /// extrapolation tolerance for some step.
    #[error("tf_buffer_core: ExtrapolationError, {0}")]
    Extrapolation(String),
    /// Malformed inputs, e.g. an empty frame name in a query.
    #[error("tf_buffer_core: InvalidArgument, {0}")]
    InvalidArgument(String),
}

/// Numeric error codes for callers that report results over a boundary
/// where a typed error cannot travel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TfErrorCode {
    NoError = 0,
    LookupError = 1,
    ConnectivityError = 2,
    ExtrapolationError = 3,
    InvalidArgumentError = 4,
}

impl TfError {
    pub fn code(&self) -> TfErrorCode {
        match self {
            TfError::Lookup(_) => TfErrorCode::LookupError,
            TfError::Connectivity(_) => TfErrorCode::ConnectivityError,
            TfError::Extrapolation(_) => TfErrorCode::ExtrapolationError,
            TfError::InvalidArgument(_) => TfErrorCode::InvalidArgumentError,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TfErrorCode::NoError as u8, 0);
        assert_eq!(
            TfError::Lookup("x".to_string()).code(),
            TfErrorCode::LookupError
        );
        assert_eq!(
            TfError::Connectivity("x".to_string()).code(),
            TfErrorCode::ConnectivityError
        );
        assert_eq!(
            TfError::Extrapolation("x".to_string()).code(),
            TfErrorCode::ExtrapolationError
        );
        assert_eq!(
            TfError::InvalidArgument("x".to_string()).code(),
            TfErrorCode::InvalidArgumentError
        );
    }
}
