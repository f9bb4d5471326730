//! Store-facing error categories and their stable wire codes.

use thiserror::Error;

use kvnode_proto::CodecError;

/// Categorized failure raised by a [`crate::store::Store`] call.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("obsolete version")]
    ObsoleteVersion,
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("inconsistent data: {0}")]
    InconsistentData(String),
    #[error("unreachable store: {0}")]
    Unreachable(String),
    #[error("{0}")]
    Other(String),
}

/// Everything that can go wrong while handling one already-framed request.
///
/// [`HandlerError::UnknownOpcode`] and [`HandlerError::Codec`] are protocol
/// violations: the caller closes the connection rather than encoding a
/// response for them. Every other variant is encoded as an error response
/// and the connection stays open.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("no store named '{0}'")]
    NoSuchStore(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl HandlerError {
    /// Whether this error can be encoded as a response, or must instead
    /// close the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::UnknownOpcode(_) | HandlerError::Codec(_))
    }
}

/// Maps error categories to the stable `i16` codes carried in a response's
/// status word. Codes are part of the wire contract: once assigned, a code
/// must never be reused for a different category.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCodeMapper;

impl ErrorCodeMapper {
    pub const NO_SUCH_STORE: i16 = 1;
    pub const STORE_UNAVAILABLE: i16 = 2;
    pub const OBSOLETE_VERSION: i16 = 3;
    pub const INVALID_METADATA: i16 = 4;
    pub const INCONSISTENT_DATA: i16 = 5;
    pub const UNREACHABLE_STORE: i16 = 6;
    pub const GENERIC: i16 = 99;

    pub fn code(&self, err: &HandlerError) -> i16 {
        match err {
            HandlerError::NoSuchStore(_) => Self::NO_SUCH_STORE,
            HandlerError::Store(StoreError::Unavailable(_)) => Self::STORE_UNAVAILABLE,
            HandlerError::Store(StoreError::ObsoleteVersion) => Self::OBSOLETE_VERSION,
            HandlerError::Store(StoreError::InvalidMetadata(_)) => Self::INVALID_METADATA,
            HandlerError::Store(StoreError::InconsistentData(_)) => Self::INCONSISTENT_DATA,
            HandlerError::Store(StoreError::Unreachable(_)) => Self::UNREACHABLE_STORE,
            HandlerError::Store(StoreError::Other(_)) => Self::GENERIC,
            HandlerError::UnknownOpcode(_) | HandlerError::Codec(_) => Self::GENERIC,
        }
    }
}
