//! Query subcommand
//!
//! Fetch the tile under a WGS84 point and list the features near it.

use clap::Parser;
use tilecache::{Feature, TileCache, TileCacheConfig, TileCoord, Value};

use crate::open::Source;

#[derive(Parser, Debug)]
#[command(about = "List the features under a geographic point")]
pub struct Args {
    /// `PMTiles` archive (path or URL) or a URL template with {z}, {x} and {y}
    #[arg(value_name = "SOURCE")]
    source: String,
    #[arg(allow_negative_numbers = true)]
    lon: f64,
    #[arg(allow_negative_numbers = true)]
    lat: f64,
    zoom: u8,
    /// Half the side of the query window, in pixels
    #[arg(long, default_value_t = 16.)]
    radius: f64,
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
    }
}

fn print_feature(feature: &Feature) {
    let mut properties: Vec<_> = feature
        .properties
        .iter()
        .map(|(k, v)| format!("{k}={}", format_value(v)))
        .collect();
    properties.sort();
    let id = feature.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    println!(
        "{:?} id={id} vertices={} {}",
        feature.geom_type(),
        feature.num_vertices,
        properties.join(" ")
    );
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let source = Source::open(&args.source).await?;
    let config = TileCacheConfig {
        query_radius: args.radius,
        ..TileCacheConfig::default()
    };
    let cache = TileCache::with_config(source, config);

    let (coord, _, _) = TileCoord::containing(args.lon, args.lat, args.zoom);
    cache.get(coord).await?;

    let features = cache.query_features(args.lon, args.lat, args.zoom);
    println!("tile {coord}: {} features", features.len());
    for feature in &features {
        print_feature(feature);
    }

    Ok(())
}
