// Archive offsets are u64 on the wire but index in-memory buffers.
#![expect(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::AsyncReadExt as _;

use crate::backend::{ByteRange, Fetcher};
use crate::header::{HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::{Compression, DirEntry, Directory, Header, TileCoord, TileError, TileResult};

/// Leaf directories nest at most this deep below the root.
const MAX_LEAF_DEPTH: u8 = 4;

/// Read access to one `PMTiles` v3 archive behind a [`Fetcher`].
///
/// The header and root directory are read once on open. Leaf directories are fetched on
/// demand and kept, keyed by their offset.
pub struct Archive<F> {
    fetcher: F,
    url: String,
    header: Header,
    root_directory: Directory,
    leaves: RwLock<HashMap<u64, Directory>>,
}

impl<F: Fetcher + Sync> Archive<F> {
    /// Reads and validates the header and root directory at `url`.
    ///
    /// # Errors
    ///
    /// Fails if the resource cannot be read or does not hold a valid v3 archive.
    pub async fn open(fetcher: F, url: impl Into<String>) -> TileResult<Self> {
        let url = url.into();
        // The first 16 KiB always cover the header and the root directory
        let mut initial_bytes = fetcher
            .fetch(&url, Some(ByteRange::new(0, MAX_INITIAL_BYTES)))
            .await?;
        if initial_bytes.len() < HEADER_SIZE {
            return Err(TileError::InvalidHeader);
        }

        let header = Header::try_from_bytes(initial_bytes.split_to(HEADER_SIZE))?;

        let root_start = (header.root_offset as usize)
            .checked_sub(HEADER_SIZE)
            .ok_or(TileError::InvalidHeader)?;
        let root_end = root_start + header.root_length as usize;
        if root_end > initial_bytes.len() {
            return Err(TileError::InvalidHeader);
        }
        let root_directory =
            read_directory(header.internal_compression, initial_bytes.slice(root_start..root_end))
                .await?;

        debug!(
            "Opened archive {url}: zooms {}-{}, tile compression {:?}, root {root_directory:?}",
            header.min_zoom, header.max_zoom, header.tile_compression
        );

        Ok(Self {
            fetcher,
            url,
            header,
            root_directory,
            leaves: RwLock::default(),
        })
    }

    /// Locates the payload of `coord`, as an absolute byte range of the archive.
    ///
    /// # Errors
    ///
    /// Fails if a leaf directory cannot be fetched or decoded.
    pub async fn find_tile(&self, coord: TileCoord) -> TileResult<Option<ByteRange>> {
        let tile_id = coord.tile_id();
        let mut entry = self.root_directory.find_tile_id(tile_id).cloned();

        let mut depth = 0;
        while let Some(leaf) = entry.as_ref().filter(|e| e.is_leaf()) {
            if depth >= MAX_LEAF_DEPTH {
                debug!("Giving up on {coord}: leaf directories nested too deep");
                return Ok(None);
            }
            let offset = self.header.leaf_offset + leaf.offset;
            entry = self.find_in_leaf(offset, leaf.length, tile_id).await?;
            depth += 1;
        }

        Ok(entry.map(|e| ByteRange::new(self.header.data_offset + e.offset, e.length as usize)))
    }

    /// Reads the archive's JSON metadata as text.
    ///
    /// # Errors
    ///
    /// Fails if the metadata cannot be read, decompressed or is not UTF-8.
    pub async fn metadata(&self) -> TileResult<String> {
        let range = ByteRange::new(
            self.header.metadata_offset,
            self.header.metadata_length as usize,
        );
        let data = self.fetcher.fetch_exact(&self.url, range).await?;
        let data = decompress(self.header.internal_compression, data).await?;
        String::from_utf8(data.to_vec()).map_err(|e| TileError::Decode(e.into()))
    }

    async fn find_in_leaf(
        &self,
        offset: u64,
        length: u32,
        tile_id: u64,
    ) -> TileResult<Option<DirEntry>> {
        if let Some(dir) = self.cached_leaf(offset) {
            return Ok(dir.find_tile_id(tile_id).cloned());
        }

        trace!("Reading leaf directory at {offset}");
        let data = self
            .fetcher
            .fetch_exact(&self.url, ByteRange::new(offset, length as usize))
            .await?;
        let dir = read_directory(self.header.internal_compression, data).await?;
        let entry = dir.find_tile_id(tile_id).cloned();
        if let Ok(mut leaves) = self.leaves.write() {
            leaves.insert(offset, dir);
        }
        Ok(entry)
    }

    fn cached_leaf(&self, offset: u64) -> Option<Directory> {
        self.leaves.read().ok()?.get(&offset).cloned()
    }
}

impl<F> Archive<F> {
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

async fn read_directory(compression: Compression, bytes: Bytes) -> TileResult<Directory> {
    Directory::try_from(decompress(compression, bytes).await?)
}

/// Undoes the archive-level `compression` of a directory or tile payload.
///
/// # Errors
///
/// Only gzip is supported besides uncompressed data.
pub async fn decompress(compression: Compression, bytes: Bytes) -> TileResult<Bytes> {
    match compression {
        Compression::None => Ok(bytes),
        Compression::Gzip => {
            let mut decompressed_bytes = Vec::with_capacity(bytes.len() * 2);
            async_compression::tokio::bufread::GzipDecoder::new(&bytes[..])
                .read_to_end(&mut decompressed_bytes)
                .await?;
            Ok(Bytes::from(decompressed_bytes))
        }
        v => Err(TileError::UnsupportedCompression(v)),
    }
}
