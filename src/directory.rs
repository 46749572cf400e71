use std::fmt::{Debug, Formatter};

use bytes::{Buf, Bytes};
use varint_rs::VarintReader as _;

use crate::error::{TileError, TileResult};

/// One decoded `PMTiles` directory: either the root or a leaf.
#[derive(Default, Clone)]
pub struct Directory {
    pub(crate) entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    /// Finds the entry covering `tile_id`, which may be a leaf directory pointer.
    #[must_use]
    pub fn find_tile_id(&self, tile_id: u64) -> Option<&DirEntry> {
        match self.entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
            Ok(idx) => self.entries.get(idx),
            Err(next_id) => {
                let previous = self.entries.get(next_id.checked_sub(1)?)?;
                if previous.is_leaf()
                    || tile_id - previous.tile_id < u64::from(previous.run_length)
                {
                    Some(previous)
                } else {
                    None
                }
            }
        }
    }

    /// Number of entries in this directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Bytes> for Directory {
    type Error = TileError;

    fn try_from(buffer: Bytes) -> TileResult<Self> {
        let mut buffer = buffer.reader();
        let n_entries = buffer.read_usize_varint()?;

        let mut entries = vec![DirEntry::default(); n_entries];

        // Tile ids are delta encoded
        let mut next_tile_id = 0;
        for entry in &mut entries {
            next_tile_id += buffer.read_u64_varint()?;
            entry.tile_id = next_tile_id;
        }

        for entry in &mut entries {
            entry.run_length = buffer.read_u32_varint()?;
        }

        for entry in &mut entries {
            entry.length = buffer.read_u32_varint()?;
        }

        // An offset of 0 means "directly after the previous entry", anything else is offset + 1
        let mut last_entry: Option<&DirEntry> = None;
        for entry in &mut entries {
            let offset = buffer.read_u64_varint()?;
            entry.offset = if offset == 0 {
                let e = last_entry.ok_or(TileError::InvalidEntry)?;
                e.offset + u64::from(e.length)
            } else {
                offset - 1
            };
            last_entry = Some(entry);
        }

        Ok(Directory { entries })
    }
}

/// Location of a tile run, or of a leaf directory when `run_length` is zero.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub(crate) tile_id: u64,
    pub(crate) offset: u64,
    pub(crate) length: u32,
    pub(crate) run_length: u32,
}

impl DirEntry {
    pub(crate) fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}
