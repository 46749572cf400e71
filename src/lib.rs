#![forbid(unsafe_code)]
#![doc = "Vector tile fetching, decoding and caching, plus vertex-budget geometry batching."]

mod tile;
pub use tile::{TileCoord, project};

mod header;
pub use header::{Compression, Header, TileType};

mod directory;
pub use directory::{DirEntry, Directory};

mod error;
pub use error::{DecodeError, TileError, TileResult};

pub mod mvt;
pub use mvt::{Feature, GeomType, Geometry, LayeredTile, Point, Ring, Value};

pub mod backend;
pub use backend::{ByteRange, Fetcher};
#[cfg(feature = "http-async")]
pub use backend::HttpFetcher;
#[cfg(feature = "mmap-async-tokio")]
pub use backend::MmapFetcher;

mod archive;
pub use archive::{Archive, decompress};

mod source;
pub use source::{ArchiveSource, FetchGuard, TemplateSource, TileSource, ZoomCancellations};

mod cache;
pub use cache::{TileCache, TileCacheConfig};

mod simplify;
pub use simplify::simplify;

mod split;
pub use split::{is_ccw, split_multi_line_string, split_multi_polygon};

#[cfg(test)]
mod fixtures;
