//! Builders for in-memory vector tiles and `PMTiles` archives used across the test suites.
#![expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use varint_rs::VarintWriter as _;

use crate::backend::{ByteRange, Fetcher};
use crate::directory::DirEntry;
use crate::header::HEADER_SIZE;
use crate::mvt::Value;
use crate::tile::TileCoord;
use crate::{TileError, TileResult};

fn put_varint(out: &mut Vec<u8>, value: u64) {
    out.write_u64_varint(value).unwrap();
}

fn put_key(out: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(out, u64::from((field << 3) | u32::from(wire_type)));
}

fn put_bytes(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(out, field, 2);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn zigzag(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

fn command(id: u32, params: &[(i32, i32)]) -> Vec<u32> {
    let mut out = vec![((params.len() as u32) << 3) | id];
    for &(dx, dy) in params {
        out.push(zigzag(dx));
        out.push(zigzag(dy));
    }
    out
}

/// `MoveTo` over relative `(dx, dy)` steps.
pub(crate) fn move_to(deltas: &[(i32, i32)]) -> Vec<u32> {
    command(1, deltas)
}

/// `LineTo` over relative `(dx, dy)` steps.
pub(crate) fn line_to(deltas: &[(i32, i32)]) -> Vec<u32> {
    command(2, deltas)
}

pub(crate) fn close_path() -> Vec<u32> {
    vec![(1 << 3) | 7]
}

#[derive(Default)]
pub(crate) struct TileBuilder {
    layers: Vec<Vec<u8>>,
}

impl TileBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn layer(mut self, layer: LayerBuilder) -> Self {
        self.layers.push(layer.encode());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        for layer in &self.layers {
            put_bytes(&mut out, 3, layer);
        }
        out
    }
}

pub(crate) struct LayerBuilder {
    name: String,
    extent: u32,
    keys: Vec<String>,
    values: Vec<Vec<u8>>,
    features: Vec<Vec<u8>>,
}

impl LayerBuilder {
    pub(crate) fn new(name: &str, extent: u32) -> Self {
        Self {
            name: name.to_string(),
            extent,
            keys: Vec::new(),
            values: Vec::new(),
            features: Vec::new(),
        }
    }

    pub(crate) fn feature(
        mut self,
        geom_type: u64,
        properties: &[(&str, Value)],
        geometry: Vec<u32>,
    ) -> Self {
        let mut tags = Vec::new();
        for (key, value) in properties {
            let key_idx = match self.keys.iter().position(|k| k == key) {
                Some(idx) => idx,
                None => {
                    self.keys.push((*key).to_string());
                    self.keys.len() - 1
                }
            };
            self.values.push(encode_value(value));
            put_varint(&mut tags, key_idx as u64);
            put_varint(&mut tags, (self.values.len() - 1) as u64);
        }

        let mut packed_geometry = Vec::new();
        for word in geometry {
            put_varint(&mut packed_geometry, u64::from(word));
        }

        let mut feature = Vec::new();
        put_key(&mut feature, 1, 0);
        put_varint(&mut feature, self.features.len() as u64 + 1);
        if !tags.is_empty() {
            put_bytes(&mut feature, 2, &tags);
        }
        put_key(&mut feature, 3, 0);
        put_varint(&mut feature, geom_type);
        put_bytes(&mut feature, 4, &packed_geometry);

        self.features.push(feature);
        self
    }

    fn encode(self) -> Vec<u8> {
        let mut out = Vec::new();
        put_key(&mut out, 15, 0);
        put_varint(&mut out, 2);
        put_bytes(&mut out, 1, self.name.as_bytes());
        for feature in &self.features {
            put_bytes(&mut out, 2, feature);
        }
        for key in &self.keys {
            put_bytes(&mut out, 3, key.as_bytes());
        }
        for value in &self.values {
            put_bytes(&mut out, 4, value);
        }
        put_key(&mut out, 5, 0);
        put_varint(&mut out, u64::from(self.extent));
        out
    }
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Value::String(s) => put_bytes(&mut out, 1, s.as_bytes()),
        Value::Number(n) => {
            put_key(&mut out, 3, 1);
            out.extend_from_slice(&n.to_bits().to_le_bytes());
        }
        Value::Bool(b) => {
            put_key(&mut out, 7, 0);
            put_varint(&mut out, u64::from(*b));
        }
    }
    out
}

/// Encodes entries the way an archive writer lays out a directory.
pub(crate) fn encode_directory(entries: &[DirEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    put_varint(&mut out, entries.len() as u64);

    let mut last_id = 0;
    for entry in entries {
        put_varint(&mut out, entry.tile_id - last_id);
        last_id = entry.tile_id;
    }
    for entry in entries {
        put_varint(&mut out, u64::from(entry.run_length));
    }
    for entry in entries {
        put_varint(&mut out, u64::from(entry.length));
    }
    for (idx, entry) in entries.iter().enumerate() {
        let contiguous = idx > 0 && {
            let prev = &entries[idx - 1];
            entry.offset == prev.offset + u64::from(prev.length)
        };
        put_varint(&mut out, if contiguous { 0 } else { entry.offset + 1 });
    }
    out
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes a small clustered `PMTiles` v3 archive.
///
/// With [`ArchiveBuilder::leaves`] every tile entry moves into one leaf directory and the
/// root only points at it.
pub(crate) struct ArchiveBuilder {
    min_zoom: u8,
    max_zoom: u8,
    bounds: [f64; 4],
    tiles: Vec<(TileCoord, Vec<u8>)>,
    gzip_tiles: bool,
    gzip_directories: bool,
    leaves: bool,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 14,
            bounds: [-180., -85., 180., 85.],
            tiles: Vec::new(),
            gzip_tiles: false,
            gzip_directories: false,
            leaves: false,
        }
    }

    pub(crate) fn zooms(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub(crate) fn bounds(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.bounds = [min_lon, min_lat, max_lon, max_lat];
        self
    }

    pub(crate) fn tile(mut self, coord: TileCoord, data: Vec<u8>) -> Self {
        self.tiles.push((coord, data));
        self
    }

    pub(crate) fn gzip_tiles(mut self) -> Self {
        self.gzip_tiles = true;
        self
    }

    pub(crate) fn gzip_directories(mut self) -> Self {
        self.gzip_directories = true;
        self
    }

    pub(crate) fn leaves(mut self) -> Self {
        self.leaves = true;
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        self.tiles.sort_by_key(|(coord, _)| coord.tile_id());

        let mut data = Vec::new();
        let mut entries = Vec::new();
        for (coord, tile) in &self.tiles {
            let tile = if self.gzip_tiles { gzip(tile) } else { tile.clone() };
            entries.push(DirEntry {
                tile_id: coord.tile_id(),
                offset: data.len() as u64,
                length: tile.len() as u32,
                run_length: 1,
            });
            data.extend(tile);
        }

        let compress = |dir: Vec<u8>| if self.gzip_directories { gzip(&dir) } else { dir };
        let (root, leaf) = if self.leaves {
            let leaf = compress(encode_directory(&entries));
            let pointer = DirEntry {
                tile_id: entries.first().map_or(0, |e| e.tile_id),
                offset: 0,
                length: leaf.len() as u32,
                run_length: 0,
            };
            (compress(encode_directory(&[pointer])), leaf)
        } else {
            (compress(encode_directory(&entries)), Vec::new())
        };
        let metadata = compress(b"{}".to_vec());

        let root_offset = HEADER_SIZE as u64;
        let metadata_offset = root_offset + root.len() as u64;
        let leaf_offset = metadata_offset + metadata.len() as u64;
        let data_offset = leaf_offset + leaf.len() as u64;

        let mut out = Vec::with_capacity(data_offset as usize + data.len());
        out.extend_from_slice(b"PMTiles");
        out.push(3);
        for value in [
            root_offset,
            root.len() as u64,
            metadata_offset,
            metadata.len() as u64,
            leaf_offset,
            leaf.len() as u64,
            data_offset,
            data.len() as u64,
            self.tiles.len() as u64,
            entries.len() as u64,
            entries.len() as u64,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.push(1);
        out.push(if self.gzip_directories { 2 } else { 1 });
        out.push(if self.gzip_tiles { 2 } else { 1 });
        out.push(1);
        out.push(self.min_zoom);
        out.push(self.max_zoom);
        let coordinate = |value: f64| ((value * 10_000_000.) as i32).to_le_bytes();
        for value in self.bounds {
            out.extend_from_slice(&coordinate(value));
        }
        out.push(self.min_zoom);
        out.extend_from_slice(&coordinate((self.bounds[0] + self.bounds[2]) / 2.));
        out.extend_from_slice(&coordinate((self.bounds[1] + self.bounds[3]) / 2.));
        assert_eq!(out.len(), HEADER_SIZE);

        out.extend(root);
        out.extend(metadata);
        out.extend(leaf);
        out.extend(data);
        out
    }
}

/// Serves byte ranges out of in-memory resources and counts every request.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    resources: Mutex<HashMap<String, Bytes>>,
    stalled: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, data: impl Into<Bytes>) -> Self {
        self.resources
            .lock()
            .unwrap()
            .insert(url.to_string(), data.into());
        self
    }

    /// Requests for `url` never complete.
    pub(crate) fn stalling(self, url: &str) -> Self {
        self.stalled.lock().unwrap().push(url.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> TileResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.lock().unwrap().iter().any(|u| u == url) {
            std::future::pending::<()>().await;
        }

        let data = self
            .resources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TileError::from(std::io::Error::from(std::io::ErrorKind::NotFound)))?;

        Ok(match range {
            None => data,
            Some(range) => {
                let start = (range.offset as usize).min(data.len());
                let end = (start + range.length).min(data.len());
                data.slice(start..end)
            }
        })
    }
}
