use std::string::FromUtf8Error;
use std::sync::Arc;

use thiserror::Error;

use crate::tile::TileCoord;

/// A specialized [`Result`] type for tile operations.
pub type TileResult<T> = Result<T, TileError>;

/// Errors that can occur while fetching, locating or decoding tiles.
///
/// The type is `Clone` so that a single failed fetch can be handed to every
/// caller waiting on the same tile.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    #[error("Invalid vector tile: {0}")]
    Decode(#[from] DecodeError),
    #[error("Tile {0} not found in archive")]
    TileNotFound(TileCoord),
    #[error("Fetch was cancelled")]
    Cancelled,
    #[error("Fetch task panicked or was aborted")]
    FetchAborted,
    #[error("Invalid magic number")]
    InvalidMagicNumber,
    #[error("Invalid PMTiles version")]
    UnsupportedPmTilesVersion,
    #[error("Invalid compression")]
    InvalidCompression,
    #[error("Unsupported compression {0:?}")]
    UnsupportedCompression(crate::Compression),
    #[error("Invalid PMTiles entry")]
    InvalidEntry,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Invalid tile type")]
    InvalidTileType,
    #[error("Invalid URL template {0:?}: expected {{z}}, {{x}} and {{y}} placeholders")]
    InvalidUrlTemplate(String),
    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),
    #[error("IO Error {0}")]
    Reading(Arc<std::io::Error>),
    #[error("Unexpected number of bytes returned [expected: {0}, received: {1}].")]
    UnexpectedNumberOfBytesReturned(usize, usize),
    #[error("Invalid byte range {0}")]
    InvalidRange(String),
    #[error("Range requests unsupported")]
    RangeRequestsUnsupported,
    #[error("HTTP response body is too long, Response {0}B > requested {1}B")]
    ResponseBodyTooLong(usize, usize),
    #[cfg(feature = "http-async")]
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
    #[cfg(feature = "mmap-async-tokio")]
    #[error("Unable to open mmap file")]
    UnableToOpenMmapFile,
}

impl TileError {
    /// Returns `true` if this error only signals a superseded fetch.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TileError::Cancelled)
    }
}

impl From<std::io::Error> for TileError {
    fn from(e: std::io::Error) -> Self {
        TileError::Reading(Arc::new(e))
    }
}

#[cfg(feature = "http-async")]
impl From<reqwest::Error> for TileError {
    fn from(e: reqwest::Error) -> Self {
        TileError::Network(Arc::new(e))
    }
}

/// Errors raised while decoding a binary vector tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Buffer ended unexpectedly")]
    UnexpectedEof,
    #[error("Malformed varint")]
    InvalidVarint,
    #[error("Unsupported protobuf wire type {0}")]
    UnsupportedWireType(u8),
    #[error("Unknown geometry command {0}")]
    UnknownCommand(u32),
    #[error("LineTo command before any MoveTo")]
    LineToWithoutMoveTo,
    #[error("Geometry coordinate out of range")]
    CoordinateOverflow,
    #[error("Property tag index {0} out of range")]
    TagOutOfRange(u32),
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::InvalidVarint
        }
    }
}
