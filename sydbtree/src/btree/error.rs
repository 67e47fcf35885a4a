//! B-tree parameter errors
//!

use thiserror::Error;

use crate::data::DataError;

/// Errors raised while building file and open parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BtreeError {
    /// The request is malformed or inconsistent
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The request is well formed but can't be satisfied
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl BtreeError {
    pub(crate) fn bad_argument<S: Into<String>>(msg: S) -> Self {
        let msg = msg.into();
        tracing::warn!("{msg}");
        BtreeError::BadArgument(msg)
    }

    pub(crate) fn not_supported<S: Into<String>>(msg: S) -> Self {
        let msg = msg.into();
        tracing::warn!("{msg}");
        BtreeError::NotSupported(msg)
    }
}

impl From<DataError> for BtreeError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotSupported(_) => BtreeError::not_supported(err.to_string()),
            _ => BtreeError::bad_argument(err.to_string()),
        }
    }
}
