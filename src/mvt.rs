//! Decoder for Mapbox Vector Tile buffers.
//!
//! Geometry is rescaled while decoding so that every layer, whatever its own extent,
//! lands in one shared tile space of `tile_size` units per side.

use std::collections::{BTreeMap, HashMap};

use log::{trace, warn};
use varint_rs::VarintReader as _;

use crate::error::DecodeError;

/// Extent assumed for layers that do not declare one.
pub const DEFAULT_EXTENT: u32 = 4096;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// A decoded tile: layer name to the layer's features, in file order.
pub type LayeredTile = BTreeMap<String, Vec<Feature>>;

/// A vertex in tile space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An ordered contour. Closed rings repeat their first point at the end.
pub type Ring = Vec<Point>;

/// The geometry kinds carried by vector tiles, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomType {
    Point = 1,
    Line = 2,
    Polygon = 3,
}

impl GeomType {
    fn from_wire(value: u64) -> Option<Self> {
        match value {
            1 => Some(GeomType::Point),
            2 => Some(GeomType::Line),
            3 => Some(GeomType::Polygon),
            _ => None,
        }
    }
}

/// Feature geometry, tagged by kind.
///
/// Points are stored one ring per point; lines one ring per part; polygons as a flat
/// ring sequence where each exterior ring is followed by its holes.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Vec<Ring>),
    Line(Vec<Ring>),
    Polygon(Vec<Ring>),
}

impl Geometry {
    fn new(geom_type: GeomType, rings: Vec<Ring>) -> Self {
        match geom_type {
            GeomType::Point => Geometry::Point(rings),
            GeomType::Line => Geometry::Line(rings),
            GeomType::Polygon => Geometry::Polygon(rings),
        }
    }

    #[must_use]
    pub fn geom_type(&self) -> GeomType {
        match self {
            Geometry::Point(_) => GeomType::Point,
            Geometry::Line(_) => GeomType::Line,
            Geometry::Polygon(_) => GeomType::Polygon,
        }
    }

    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        match self {
            Geometry::Point(rings) | Geometry::Line(rings) | Geometry::Polygon(rings) => rings,
        }
    }
}

/// A scalar property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
}

/// One decoded feature. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: Geometry,
    /// `[min_x, min_y, max_x, max_y]` over the decoded vertices, in tile space.
    pub bbox: [f64; 4],
    pub properties: HashMap<String, Value>,
    pub num_vertices: usize,
}

impl Feature {
    #[must_use]
    pub fn geom_type(&self) -> GeomType {
        self.geometry.geom_type()
    }

    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        self.geometry.rings()
    }

    /// Inclusive axis-aligned rectangle intersection against `bbox`.
    #[must_use]
    pub fn intersects(&self, bbox: [f64; 4]) -> bool {
        bbox[2] >= self.bbox[0]
            && self.bbox[2] >= bbox[0]
            && bbox[3] >= self.bbox[1]
            && self.bbox[3] >= bbox[1]
    }
}

/// Decodes a vector tile buffer, rescaling every layer to `tile_size` units.
///
/// Any malformed varint, truncated field or unknown geometry command fails the whole tile.
pub fn decode(buf: &[u8], tile_size: u32) -> Result<LayeredTile, DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut tile = LayeredTile::new();

    while reader.has_remaining() {
        match reader.read_key()? {
            (3, WIRE_LEN) => {
                let (name, features) = read_layer(reader.read_bytes()?, tile_size)?;
                trace!("Decoded layer {name} with {} features", features.len());
                tile.entry(name).or_default().extend(features);
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    Ok(tile)
}

fn read_layer(buf: &[u8], tile_size: u32) -> Result<(String, Vec<Feature>), DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut name = String::new();
    let mut extent = DEFAULT_EXTENT;
    let mut keys = Vec::new();
    let mut values = Vec::new();
    let mut raw_features = Vec::new();

    // keys and values may follow the features that reference them
    while reader.has_remaining() {
        match reader.read_key()? {
            (1, WIRE_LEN) => name = reader.read_string()?,
            (2, WIRE_LEN) => raw_features.push(reader.read_bytes()?),
            (3, WIRE_LEN) => keys.push(reader.read_string()?),
            (4, WIRE_LEN) => values.push(read_value(reader.read_bytes()?)?),
            (5, WIRE_VARINT) => {
                extent = u32::try_from(reader.read_varint()?)
                    .map_err(|_| DecodeError::InvalidVarint)?;
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    if extent == 0 {
        extent = DEFAULT_EXTENT;
    }
    let scale = f64::from(tile_size) / f64::from(extent);

    let mut features = Vec::with_capacity(raw_features.len());
    for raw in raw_features {
        if let Some(feature) = read_feature(raw, scale, &keys, &values)? {
            features.push(feature);
        }
    }

    Ok((name, features))
}

fn read_feature(
    buf: &[u8],
    scale: f64,
    keys: &[String],
    values: &[Option<Value>],
) -> Result<Option<Feature>, DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut id = None;
    let mut tags: &[u8] = &[];
    let mut geom_type = 0;
    let mut geometry: &[u8] = &[];

    while reader.has_remaining() {
        match reader.read_key()? {
            (1, WIRE_VARINT) => id = Some(reader.read_varint()?),
            (2, WIRE_LEN) => tags = reader.read_bytes()?,
            (3, WIRE_VARINT) => geom_type = reader.read_varint()?,
            (4, WIRE_LEN) => geometry = reader.read_bytes()?,
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    let Some(geom_type) = GeomType::from_wire(geom_type) else {
        warn!("Skipping feature {id:?} with unsupported geometry type {geom_type}");
        return Ok(None);
    };

    let (rings, bbox) = read_geometry(geometry, scale)?;
    let num_vertices = rings.iter().map(Vec::len).sum();

    Ok(Some(Feature {
        id,
        geometry: Geometry::new(geom_type, rings),
        bbox,
        properties: read_tags(tags, keys, values)?,
        num_vertices,
    }))
}

fn read_tags(
    buf: &[u8],
    keys: &[String],
    values: &[Option<Value>],
) -> Result<HashMap<String, Value>, DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut properties = HashMap::new();

    while reader.has_remaining() {
        let key_idx = reader.read_u32()?;
        let value_idx = reader.read_u32()?;
        let key = keys
            .get(key_idx as usize)
            .ok_or(DecodeError::TagOutOfRange(key_idx))?;
        let value = values
            .get(value_idx as usize)
            .ok_or(DecodeError::TagOutOfRange(value_idx))?;
        if let Some(value) = value {
            properties.insert(key.clone(), value.clone());
        }
    }

    Ok(properties)
}

fn read_geometry(buf: &[u8], scale: f64) -> Result<(Vec<Ring>, [f64; 4]), DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut rings = Vec::new();
    let mut ring: Option<Ring> = None;
    let (mut x, mut y) = (0_i64, 0_i64);
    let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];

    while reader.has_remaining() {
        let command = reader.read_u32()?;
        let (id, count) = (command & 0x7, command >> 3);

        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                for _ in 0..count {
                    x = x
                        .checked_add(zigzag(reader.read_varint()?))
                        .ok_or(DecodeError::CoordinateOverflow)?;
                    y = y
                        .checked_add(zigzag(reader.read_varint()?))
                        .ok_or(DecodeError::CoordinateOverflow)?;

                    #[expect(clippy::cast_precision_loss)]
                    let point = Point::new(x as f64 * scale, y as f64 * scale);
                    bbox[0] = bbox[0].min(point.x);
                    bbox[1] = bbox[1].min(point.y);
                    bbox[2] = bbox[2].max(point.x);
                    bbox[3] = bbox[3].max(point.y);

                    if id == CMD_MOVE_TO {
                        rings.extend(ring.replace(Vec::new()));
                    }
                    ring.as_mut()
                        .ok_or(DecodeError::LineToWithoutMoveTo)?
                        .push(point);
                }
            }
            CMD_CLOSE_PATH => {
                for _ in 0..count {
                    if let Some(ring) = ring.as_mut()
                        && let Some(&first) = ring.first()
                    {
                        ring.push(first);
                    }
                }
            }
            other => return Err(DecodeError::UnknownCommand(other)),
        }
    }

    rings.extend(ring);
    Ok((rings, bbox))
}

#[expect(clippy::cast_precision_loss)]
fn read_value(buf: &[u8]) -> Result<Option<Value>, DecodeError> {
    let mut reader = PbfReader::new(buf);
    let mut value = None;

    while reader.has_remaining() {
        value = Some(match reader.read_key()? {
            (1, WIRE_LEN) => Value::String(reader.read_string()?),
            (2, WIRE_FIXED32) => Value::Number(f64::from(f32::from_bits(reader.read_fixed32()?))),
            (3, WIRE_FIXED64) => Value::Number(f64::from_bits(reader.read_fixed64()?)),
            (4, WIRE_VARINT) => Value::Number(reader.read_varint()?.cast_signed() as f64),
            (5, WIRE_VARINT) => Value::Number(reader.read_varint()? as f64),
            (6, WIRE_VARINT) => Value::Number(zigzag(reader.read_varint()?) as f64),
            (7, WIRE_VARINT) => Value::Bool(reader.read_varint()? != 0),
            (_, wire_type) => {
                reader.skip(wire_type)?;
                continue;
            }
        });
    }

    Ok(value)
}

fn zigzag(n: u64) -> i64 {
    (n >> 1).cast_signed() ^ -(n & 1).cast_signed()
}

/// Minimal protobuf cursor over a borrowed buffer.
struct PbfReader<'a> {
    buf: &'a [u8],
}

impl<'a> PbfReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn has_remaining(&self) -> bool {
        !self.buf.is_empty()
    }

    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        Ok(self.buf.read_u64_varint()?)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        u32::try_from(self.read_varint()?).map_err(|_| DecodeError::InvalidVarint)
    }

    fn read_key(&mut self) -> Result<(u32, u8), DecodeError> {
        let key = self.read_u32()?;
        #[expect(clippy::cast_possible_truncation)]
        let wire_type = (key & 0x7) as u8;
        Ok((key >> 3, wire_type))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = usize::try_from(self.read_varint()?).map_err(|_| DecodeError::UnexpectedEof)?;
        self.take(len)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8(self.read_bytes()?.to_vec())?)
    }

    fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let mut le = [0_u8; 8];
        le.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(le))
    }

    fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_FIXED64 => {
                self.take(8)?;
            }
            WIRE_LEN => {
                self.read_bytes()?;
            }
            WIRE_FIXED32 => {
                self.take(4)?;
            }
            other => return Err(DecodeError::UnsupportedWireType(other)),
        }
        Ok(())
    }
}
