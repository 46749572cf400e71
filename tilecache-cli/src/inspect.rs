//! Inspect subcommand
//!
//! Decode one tile and print per-layer feature and vertex counts.

use clap::Parser;
use tilecache::{Compression, GeomType, Header, TileCache, TileCoord, TileType};

use crate::open::Source;

#[derive(Parser, Debug)]
#[command(about = "Decode one tile and summarize its layers")]
pub struct Args {
    /// `PMTiles` archive (path or URL) or a URL template with {z}, {x} and {y}
    #[arg(value_name = "SOURCE")]
    source: String,
    z: u8,
    x: u32,
    y: u32,
    /// Edge length tiles are rescaled to
    #[arg(long, default_value_t = 256)]
    tile_size: u32,
}

fn format_tile_type(tile_type: TileType) -> &'static str {
    match tile_type {
        TileType::Mvt => "mvt",
        TileType::Png => "png",
        TileType::Jpeg => "jpeg",
        TileType::Webp => "webp",
        TileType::Avif => "avif",
        TileType::Unknown => "unknown",
    }
}

fn format_compression(compression: Compression) -> &'static str {
    match compression {
        Compression::Gzip => "gzip",
        Compression::Brotli => "brotli",
        Compression::Zstd => "zstd",
        Compression::None => "none",
        Compression::Unknown => "unknown",
    }
}

fn print_header(header: &Header) {
    println!("tile type: {}", format_tile_type(header.tile_type));
    println!(
        "bounds: (long: {:.6}, lat: {:.6}) (long: {:.6}, lat: {:.6})",
        header.min_longitude, header.min_latitude, header.max_longitude, header.max_latitude
    );
    println!("zooms: {}-{}", header.min_zoom, header.max_zoom);
    if let Some(n) = header.n_addressed_tiles() {
        println!("addressed tiles count: {n}");
    }
    println!(
        "tile compression: {}",
        format_compression(header.tile_compression)
    );
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let source = Source::open(&args.source).await?;
    if let Some(header) = source.header() {
        print_header(header);
    }
    if let Some(metadata) = source.metadata().await.filter(|m| !m.is_empty()) {
        println!("metadata: {metadata}");
    }

    let coord = TileCoord::new(args.z, args.x, args.y);
    let cache = TileCache::new(source, args.tile_size);
    let Some(tile) = cache.get(coord).await? else {
        return Err(format!("fetch of tile {coord} was cancelled").into());
    };

    println!("tile {coord}: {} layers", tile.len());
    for (name, features) in tile.as_ref() {
        let vertices: usize = features.iter().map(|f| f.num_vertices).sum();
        let count = |t: GeomType| features.iter().filter(|f| f.geom_type() == t).count();
        println!(
            "layer {name}: {} features ({} points, {} lines, {} polygons), {vertices} vertices",
            features.len(),
            count(GeomType::Point),
            count(GeomType::Line),
            count(GeomType::Polygon),
        );
    }

    Ok(())
}
