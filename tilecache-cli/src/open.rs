//! Turns a command-line `SOURCE` into a tile source.

use reqwest::Client;
use tilecache::{
    ArchiveSource, Header, HttpFetcher, LayeredTile, MmapFetcher, TemplateSource, TileCoord,
    TileResult, TileSource,
};

/// Any of the sources a `SOURCE` argument can name.
pub enum Source {
    RemoteArchive(ArchiveSource<HttpFetcher>),
    LocalArchive(ArchiveSource<MmapFetcher>),
    RemoteTemplate(TemplateSource<HttpFetcher>),
    LocalTemplate(TemplateSource<MmapFetcher>),
}

impl Source {
    /// Opens `location`: a URL template when it has a `{z}` placeholder, an archive otherwise.
    pub async fn open(location: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let remote = location.starts_with("http://") || location.starts_with("https://");
        let template = location.contains("{z}");

        Ok(if remote {
            let client = Client::builder()
                .user_agent(format!("tilecache-cli/{}", env!("CARGO_PKG_VERSION")))
                .build()?;
            let fetcher = HttpFetcher::new(client);
            if template {
                Self::RemoteTemplate(TemplateSource::new(fetcher, location)?)
            } else {
                Self::RemoteArchive(ArchiveSource::open(fetcher, location).await?)
            }
        } else if template {
            Self::LocalTemplate(TemplateSource::new(MmapFetcher::new(), location)?)
        } else {
            Self::LocalArchive(ArchiveSource::open(MmapFetcher::new(), location).await?)
        })
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::RemoteArchive(source) => Some(source.header()),
            Self::LocalArchive(source) => Some(source.header()),
            Self::RemoteTemplate(_) | Self::LocalTemplate(_) => None,
        }
    }

    pub async fn metadata(&self) -> Option<String> {
        match self {
            Self::RemoteArchive(source) => source.archive().metadata().await.ok(),
            Self::LocalArchive(source) => source.archive().metadata().await.ok(),
            Self::RemoteTemplate(_) | Self::LocalTemplate(_) => None,
        }
    }
}

impl TileSource for Source {
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<LayeredTile> {
        match self {
            Self::RemoteArchive(source) => source.fetch(coord, tile_size).await,
            Self::LocalArchive(source) => source.fetch(coord, tile_size).await,
            Self::RemoteTemplate(source) => source.fetch(coord, tile_size).await,
            Self::LocalTemplate(source) => source.fetch(coord, tile_size).await,
        }
    }
}
