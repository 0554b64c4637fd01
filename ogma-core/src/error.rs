//! Error and Result types.

use std::error::Error as StdError;

use crate::ext::ustr::UStr;

/// A specialized `Result` type for ogma.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Convenience alias for driver-originated error payloads.
pub type BoxDynError = Box<dyn StdError + Send + Sync + 'static>;

/// A generic error that represents all the ways a method can fail inside of
/// ogma.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A property dictionary could not be turned back into an object.
    #[error("error deserializing object: {0}")]
    Deserialisation(String),

    /// A `type_id` did not resolve in the dynamic or the static namespace.
    #[error("unknown type id {0:?}")]
    UnknownType(UStr),

    /// A `type_id` collided with an already registered type in the same
    /// namespace.
    #[error("type id {0:?} is already registered")]
    TypeAlreadyRegistered(UStr),

    /// A lookup that must resolve to a single node returned several
    /// distinct ones.
    #[error("multiple nodes found for unique lookup of {type_id:?}")]
    UniqueConstraint { type_id: UStr },

    /// `save` refuses to change attributes that participate in a unique
    /// index.
    #[error("changing unique attribute {attribute:?} of {type_id:?} is not supported")]
    UniqueAttributeChangeNotSupported { type_id: UStr, attribute: UStr },

    /// An object without any unique attribute was used where an index
    /// lookup is required.
    #[error("{0:?} has no unique attribute to look it up by")]
    NotIndexable(UStr),

    /// `save` was called on an object that does not derive from the
    /// persistable root.
    #[error("cannot persist {0:?}")]
    CannotPersist(UStr),

    /// A value was not compatible with the attribute kind it is declared
    /// with.
    #[error("cannot encode {value} as {kind}")]
    Encode { kind: UStr, value: String },

    /// A type declaration was rejected at registration time.
    #[error("invalid type declaration: {0}")]
    Configuration(String),

    /// Connection URI was malformed.
    #[error("malformed connection URI: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An error was returned by the graph driver; surfaced untouched.
    #[error("graph driver error: {0}")]
    Client(#[source] BoxDynError),
}

impl Error {
    /// Wrap a driver error without losing its source chain.
    pub fn client(err: impl Into<BoxDynError>) -> Self {
        Error::Client(err.into())
    }
}
