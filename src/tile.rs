use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_LATITUDE: f64 = 85.051_128_779_8;
const MAX_COORD: f64 = EARTH_RADIUS * PI;

/// Address of one tile in the z/x/y quad-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,
    /// Column, counted from the west
    pub x: u32,
    /// Row, counted from the north
    pub y: u32,
}

impl TileCoord {
    #[must_use]
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Canonical `"x:y:z"` key used for cache slots and in-flight bookkeeping.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.x, self.y, self.z)
    }

    /// PMTiles tile id: tiles of lower zooms first, then the Hilbert index inside the zoom.
    #[must_use]
    pub fn tile_id(&self) -> u64 {
        tile_id(self.z, self.x, self.y)
    }

    /// Finds the tile containing a WGS84 point at `zoom`.
    ///
    /// Also returns the point's fractional position inside that tile, both axes in `[0, 1)`.
    #[must_use]
    pub fn containing(lon: f64, lat: f64, zoom: u8) -> (Self, f64, f64) {
        let (px, py) = project(lon, lat);
        let scale = 2_f64.powi(i32::from(zoom));
        let wx = (px + MAX_COORD) / (MAX_COORD * 2.) * scale;
        let wy = (1. - (py + MAX_COORD) / (MAX_COORD * 2.)) * scale;

        let max_index = scale - 1.;
        let tile_x = wx.floor().clamp(0., max_index);
        let tile_y = wy.floor().clamp(0., max_index);

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let coord = Self::new(zoom, tile_x as u32, tile_y as u32);
        (coord, wx - tile_x, wy - tile_y)
    }
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Spherical-Mercator projection in meters; latitude is clamped to the Mercator limit.
#[must_use]
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let d = PI / 180.;
    let sin = (lat.clamp(-MAX_LATITUDE, MAX_LATITUDE) * d).sin();
    (
        EARTH_RADIUS * lon * d,
        EARTH_RADIUS * ((1. + sin) / (1. - sin)).ln() / 2.,
    )
}

pub(crate) fn tile_id(z: u8, x: u32, y: u32) -> u64 {
    if z == 0 {
        return 0;
    }

    // (4^z - 1) / 3 tiles live in the zoom levels below z
    let base_id: u64 = ((1_u64 << (2 * u32::from(z))) - 1) / 3;
    let tile_id: u64 = fast_hilbert::xy2h(x, y, z);

    base_id + tile_id
}
