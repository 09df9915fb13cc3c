use std::fmt::{Display, Formatter};
use std::sync::PoisonError;

use config::ConfigError;
use serde::{Deserialize, Serialize};

use crate::buffer::FrameId;

pub type Result<T> = std::result::Result<T, Error>;

// All except Internal are considered user-facing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    Internal(String),
    Value(String),
    InvalidFrame(FrameId),
    FrameNotEvictable(FrameId),
    HashCollisionOverflow,
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }

    pub fn value<E: ToString>(msg: E) -> Error {
        Error::Value(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidFrame(id) => write!(f, "Invalid frame id {}", id),
            Error::FrameNotEvictable(id) => write!(f, "Frame {} is pinned", id),
            Error::HashCollisionOverflow => {
                write!(f, "Too many keys hash to the same bucket")
            }
            Error::Internal(s) | Error::Value(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl std::error::Error for Error {}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::internal(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::internal(err)
    }
}
