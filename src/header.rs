use bytes::{Buf, Bytes};

use crate::error::{TileError, TileResult};

pub(crate) const MAX_INITIAL_BYTES: usize = 16_384;
pub(crate) const HEADER_SIZE: usize = 127;

static V3_MAGIC: &str = "PMTiles";
static V2_MAGIC: &str = "PM";

/// Fixed-size header at the start of a `PMTiles` v3 archive.
#[derive(Debug, Clone)]
pub struct Header {
    pub(crate) version: u8,
    pub(crate) root_offset: u64,
    pub(crate) root_length: u64,
    pub(crate) metadata_offset: u64,
    pub(crate) metadata_length: u64,
    pub(crate) leaf_offset: u64,
    pub(crate) leaf_length: u64,
    pub(crate) data_offset: u64,
    pub(crate) data_length: u64,
    pub(crate) n_addressed_tiles: u64,
    pub(crate) n_tile_entries: u64,
    pub(crate) n_tile_contents: u64,
    pub(crate) clustered: bool,
    pub(crate) internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_longitude: f32,
    pub min_latitude: f32,
    pub max_longitude: f32,
    pub max_latitude: f32,
    pub center_zoom: u8,
    pub center_longitude: f32,
    pub center_latitude: f32,
}

/// Compression applied to directories or tile payloads.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl TryFrom<u8> for Compression {
    type Error = TileError;

    fn try_from(value: u8) -> TileResult<Self> {
        match value {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            _ => Err(TileError::InvalidCompression),
        }
    }
}

/// Payload format of the tiles stored in an archive.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TryFrom<u8> for TileType {
    type Error = TileError;

    fn try_from(value: u8) -> TileResult<Self> {
        match value {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            _ => Err(TileError::InvalidTileType),
        }
    }
}

impl Header {
    /// Archive format version, `3` for every archive this crate opens.
    #[must_use]
    pub fn spec_version(&self) -> u8 {
        self.version
    }

    /// Whether tile data is laid out in tile id order.
    #[must_use]
    pub fn clustered(&self) -> bool {
        self.clustered
    }

    /// Number of tiles addressable in the archive, when the writer recorded it.
    #[must_use]
    pub fn n_addressed_tiles(&self) -> Option<u64> {
        (self.n_addressed_tiles > 0).then_some(self.n_addressed_tiles)
    }

    #[must_use]
    pub fn n_tile_entries(&self) -> Option<u64> {
        (self.n_tile_entries > 0).then_some(self.n_tile_entries)
    }

    #[must_use]
    pub fn n_tile_contents(&self) -> Option<u64> {
        (self.n_tile_contents > 0).then_some(self.n_tile_contents)
    }

    /// Compression used for directories and metadata.
    #[must_use]
    pub fn internal_compression(&self) -> Compression {
        self.internal_compression
    }

    fn read_coordinate_part<B: Buf>(mut buf: B) -> f32 {
        #[expect(clippy::cast_precision_loss)]
        let value = buf.get_i32_le() as f32;
        value / 10_000_000.
    }

    /// Parses the fixed 127-byte header at the start of an archive.
    pub fn try_from_bytes(mut bytes: Bytes) -> TileResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TileError::InvalidHeader);
        }

        let magic_bytes = bytes.split_to(V3_MAGIC.len());
        if magic_bytes != V3_MAGIC {
            return Err(if magic_bytes.starts_with(V2_MAGIC.as_bytes()) {
                TileError::UnsupportedPmTilesVersion
            } else {
                TileError::InvalidMagicNumber
            });
        }

        let version = bytes.get_u8();
        if version != 3 {
            return Err(TileError::UnsupportedPmTilesVersion);
        }

        Ok(Self {
            version,
            root_offset: bytes.get_u64_le(),
            root_length: bytes.get_u64_le(),
            metadata_offset: bytes.get_u64_le(),
            metadata_length: bytes.get_u64_le(),
            leaf_offset: bytes.get_u64_le(),
            leaf_length: bytes.get_u64_le(),
            data_offset: bytes.get_u64_le(),
            data_length: bytes.get_u64_le(),
            n_addressed_tiles: bytes.get_u64_le(),
            n_tile_entries: bytes.get_u64_le(),
            n_tile_contents: bytes.get_u64_le(),
            clustered: bytes.get_u8() == 1,
            internal_compression: bytes.get_u8().try_into()?,
            tile_compression: bytes.get_u8().try_into()?,
            tile_type: bytes.get_u8().try_into()?,
            min_zoom: bytes.get_u8(),
            max_zoom: bytes.get_u8(),
            min_longitude: Self::read_coordinate_part(&mut bytes),
            min_latitude: Self::read_coordinate_part(&mut bytes),
            max_longitude: Self::read_coordinate_part(&mut bytes),
            max_latitude: Self::read_coordinate_part(&mut bytes),
            center_zoom: bytes.get_u8(),
            center_longitude: Self::read_coordinate_part(&mut bytes),
            center_latitude: Self::read_coordinate_part(&mut bytes),
        })
    }
}
