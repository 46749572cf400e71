use std::io;
use std::path::PathBuf;

use bytes::{Buf, Bytes};
use fmmap::tokio::{AsyncMmapFile, AsyncMmapFileExt as _, AsyncOptions};
use log::trace;
use url::Url;

use crate::backend::{ByteRange, Fetcher};
use crate::{TileError, TileResult};

/// Reads local files through a fresh read-only memory map per request.
///
/// Accepts both `file://` URLs and plain filesystem paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmapFetcher;

impl MmapFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn path(url: &str) -> TileResult<PathBuf> {
        if url.starts_with("file:") {
            Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| TileError::InvalidUrl(url.to_string()))
        } else {
            Ok(PathBuf::from(url))
        }
    }
}

impl From<fmmap::error::Error> for TileError {
    fn from(_: fmmap::error::Error) -> Self {
        Self::from(io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}

impl Fetcher for MmapFetcher {
    #[expect(clippy::cast_possible_truncation)]
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> TileResult<Bytes> {
        let path = Self::path(url)?;
        trace!("Mapping {} for {range:?}", path.display());
        let file = AsyncMmapFile::open_with_options(&path, AsyncOptions::new().read(true))
            .await
            .map_err(|_| TileError::UnableToOpenMmapFile)?;

        let (offset, length) = match range {
            Some(range) => (range.offset as usize, range.length),
            None => (0, file.len()),
        };
        if offset > file.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let reader = file.reader(offset)?;
        let read_length = length.min(reader.len());
        Ok(file.reader(offset)?.copy_to_bytes(read_length))
    }
}
