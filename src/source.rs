//! Tile sources: where decoded tiles come from, with stale-zoom cancellation.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use log::{debug, trace};
use tokio_util::sync::CancellationToken;

use crate::archive::{Archive, decompress};
use crate::backend::Fetcher;
use crate::mvt::{LayeredTile, decode};
use crate::{Header, TileCoord, TileError, TileResult};

/// Anything that can produce the decoded tile at a coordinate.
pub trait TileSource {
    /// Fetches and decodes `coord`, rescaled to `tile_size` units.
    ///
    /// A fetch superseded by a request for another zoom fails with [`TileError::Cancelled`].
    fn fetch(
        &self,
        coord: TileCoord,
        tile_size: u32,
    ) -> impl Future<Output = TileResult<LayeredTile>> + Send;
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    pending: Vec<(u64, u8, CancellationToken)>,
}

/// Outstanding fetches of one source, tagged by zoom level.
///
/// Registering a fetch cancels every outstanding fetch of a different zoom.
#[derive(Debug, Default)]
pub struct ZoomCancellations {
    registry: Mutex<Registry>,
}

impl ZoomCancellations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking a fetch for `zoom`; it is untracked again when the guard drops.
    #[must_use]
    pub fn register(&self, zoom: u8) -> FetchGuard<'_> {
        let mut registry = self.lock();
        registry.pending.retain(|(_, z, token)| {
            if *z == zoom {
                true
            } else {
                debug!("Cancelling zoom {z} fetch in favour of zoom {zoom}");
                token.cancel();
                false
            }
        });

        let id = registry.next_id;
        registry.next_id += 1;
        let token = CancellationToken::new();
        registry.pending.push((id, zoom, token.clone()));

        FetchGuard {
            id,
            token,
            owner: self,
        }
    }

    /// Number of fetches currently tracked.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Handle of one tracked fetch; see [`ZoomCancellations::register`].
#[derive(Debug)]
pub struct FetchGuard<'a> {
    id: u64,
    token: CancellationToken,
    owner: &'a ZoomCancellations,
}

impl FetchGuard<'_> {
    /// Drives `fut` until it completes or this fetch is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Cancelled`] if cancellation wins, otherwise whatever `fut` yields.
    pub async fn run<T>(&self, fut: impl Future<Output = TileResult<T>>) -> TileResult<T> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(TileError::Cancelled),
            result = fut => result,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.owner.lock().pending.retain(|(id, _, _)| *id != self.id);
    }
}

fn decode_tile(data: &Bytes, tile_size: u32) -> TileResult<LayeredTile> {
    Ok(decode(data, tile_size)?)
}

/// Tiles stored in a single `PMTiles` archive, located through its directories.
pub struct ArchiveSource<F> {
    archive: Archive<F>,
    cancellations: ZoomCancellations,
}

impl<F: Fetcher + Sync> ArchiveSource<F> {
    /// Opens the archive at `url` through `fetcher`.
    ///
    /// # Errors
    ///
    /// Fails if the archive header or root directory cannot be read.
    pub async fn open(fetcher: F, url: impl Into<String>) -> TileResult<Self> {
        Ok(Self::new(Archive::open(fetcher, url).await?))
    }

    #[must_use]
    pub fn new(archive: Archive<F>) -> Self {
        Self {
            archive,
            cancellations: ZoomCancellations::new(),
        }
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        self.archive.header()
    }

    #[must_use]
    pub fn archive(&self) -> &Archive<F> {
        &self.archive
    }

    #[must_use]
    pub fn cancellations(&self) -> &ZoomCancellations {
        &self.cancellations
    }

    async fn fetch_bytes(&self, coord: TileCoord) -> TileResult<Bytes> {
        let range = self
            .archive
            .find_tile(coord)
            .await?
            .ok_or(TileError::TileNotFound(coord))?;
        trace!("Tile {coord} at {range:?}");
        let data = self
            .archive
            .fetcher()
            .fetch_exact(self.archive.url(), range)
            .await?;
        decompress(self.header().tile_compression, data).await
    }
}

impl<F: Fetcher + Sync + Send> TileSource for ArchiveSource<F> {
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<LayeredTile> {
        let guard = self.cancellations.register(coord.z);
        let data = guard.run(self.fetch_bytes(coord)).await?;
        decode_tile(&data, tile_size)
    }
}

/// Tiles served one resource per tile from a `{z}`/`{x}`/`{y}` URL template.
pub struct TemplateSource<F> {
    fetcher: F,
    template: String,
    cancellations: ZoomCancellations,
}

impl<F> TemplateSource<F> {
    /// # Errors
    ///
    /// The template must contain each of the `{z}`, `{x}` and `{y}` placeholders.
    pub fn new(fetcher: F, template: impl Into<String>) -> TileResult<Self> {
        let template = template.into();
        if !["{z}", "{x}", "{y}"].iter().all(|p| template.contains(p)) {
            return Err(TileError::InvalidUrlTemplate(template));
        }
        Ok(Self {
            fetcher,
            template,
            cancellations: ZoomCancellations::new(),
        })
    }

    /// The resource address of `coord`.
    #[must_use]
    pub fn url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    #[must_use]
    pub fn cancellations(&self) -> &ZoomCancellations {
        &self.cancellations
    }
}

impl<F: Fetcher + Sync + Send> TileSource for TemplateSource<F> {
    async fn fetch(&self, coord: TileCoord, tile_size: u32) -> TileResult<LayeredTile> {
        let url = self.url(coord);
        trace!("Tile {coord} from {url}");
        let guard = self.cancellations.register(coord.z);
        let data = guard.run(self.fetcher.fetch(&url, None)).await?;
        decode_tile(&data, tile_size)
    }
}
