use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};
use log::{debug, trace, warn};

use crate::mvt::{Feature, LayeredTile};
use crate::source::TileSource;
use crate::{TileCoord, TileError, TileResult};

/// Tunables of a [`TileCache`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileCacheConfig {
    /// An insertion that brings the cache to this many tiles evicts the least recently used one.
    pub capacity: usize,
    /// Edge length of the square every tile is rescaled to.
    pub tile_size: u32,
    /// Half the side of the square window [`TileCache::query_features`] hits, in tile units.
    pub query_radius: f64,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            tile_size: 256,
            query_radius: 16.,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, TileResult<Option<Arc<LayeredTile>>>>>;

struct CacheEntry {
    used: u64,
    data: Arc<LayeredTile>,
}

#[derive(Default)]
struct CacheState {
    clock: u64,
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, SharedFetch>,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &str) -> Option<Arc<LayeredTile>> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.used = now;
        Some(Arc::clone(&entry.data))
    }

    fn insert(&mut self, key: String, data: Arc<LayeredTile>, capacity: usize) {
        let used = self.tick();
        self.entries.insert(key.clone(), CacheEntry { used, data });

        if self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, entry)| entry.used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting tile {oldest}");
                self.entries.remove(&oldest);
            }
        }
    }
}

/// A bounded, least-recently-used cache of decoded tiles in front of a [`TileSource`].
///
/// Concurrent requests for a tile that is not cached yet share a single source fetch.
/// Failed fetches are never cached, so the next request retries.
pub struct TileCache<S> {
    source: Arc<S>,
    config: TileCacheConfig,
    state: Arc<Mutex<CacheState>>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: TileSource + Send + Sync + 'static> TileCache<S> {
    /// Creates a cache with default capacity and query radius.
    #[must_use]
    pub fn new(source: S, tile_size: u32) -> Self {
        Self::with_config(
            source,
            TileCacheConfig {
                tile_size,
                ..TileCacheConfig::default()
            },
        )
    }

    #[must_use]
    pub fn with_config(source: S, config: TileCacheConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
            state: Arc::default(),
        }
    }

    /// Returns the tile at `coord`, fetching it unless it is cached or already on its way.
    ///
    /// The fetch runs on its own task, so it finishes and updates the cache even when the
    /// caller stops waiting. Must be called from within a Tokio runtime.
    ///
    /// Resolves to `Ok(None)` when the fetch was cancelled in favour of another zoom level.
    ///
    /// # Errors
    ///
    /// Every caller waiting on a failed fetch receives the same error.
    pub async fn get(&self, coord: TileCoord) -> TileResult<Option<Arc<LayeredTile>>> {
        let key = coord.key();
        let fetch = {
            let mut state = lock(&self.state);
            if let Some(tile) = state.touch(&key) {
                trace!("Cache hit for {coord}");
                return Ok(Some(tile));
            }
            if let Some(fetch) = state.in_flight.get(&key) {
                debug!("Joining in-flight fetch of {coord}");
                fetch.clone()
            } else {
                let fetch = self.start_fetch(coord, key.clone());
                state.in_flight.insert(key, fetch.clone());
                fetch
            }
        };
        fetch.await
    }

    fn start_fetch(&self, coord: TileCoord, key: String) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let TileCacheConfig {
            capacity,
            tile_size,
            ..
        } = self.config;

        let task = tokio::spawn({
            let state = Arc::clone(&state);
            let key = key.clone();
            async move {
                trace!("Fetching {coord}");
                let result = source.fetch(coord, tile_size).await;

                let mut state = lock(&state);
                state.in_flight.remove(&key);
                match result {
                    Ok(tile) => {
                        let tile = Arc::new(tile);
                        state.insert(key, Arc::clone(&tile), capacity);
                        Ok(Some(tile))
                    }
                    Err(TileError::Cancelled) => {
                        debug!("Fetch of {coord} was cancelled");
                        Ok(None)
                    }
                    Err(e) => {
                        warn!("Fetch of {coord} failed: {e}");
                        Err(e)
                    }
                }
            }
        });

        // The task runs to completion even if every waiter goes away.
        async move {
            task.await.unwrap_or_else(|e| {
                warn!("Fetch task of {coord} died: {e}");
                lock(&state).in_flight.remove(&key);
                Err(TileError::FetchAborted)
            })
        }
        .boxed()
        .shared()
    }
}

impl<S> TileCache<S> {
    /// Features of the cached tile under a WGS84 point whose bbox meets the query window.
    ///
    /// Never fetches and leaves recency untouched: an uncached tile yields no features.
    #[must_use]
    pub fn query_features(&self, lon: f64, lat: f64, zoom: u8) -> Vec<Feature> {
        let (coord, fx, fy) = TileCoord::containing(lon, lat, zoom);
        let cached = lock(&self.state)
            .entries
            .get(&coord.key())
            .map(|entry| Arc::clone(&entry.data));
        let Some(tile) = cached else {
            return Vec::new();
        };

        let size = f64::from(self.config.tile_size);
        let (cx, cy) = (fx * size, fy * size);
        let r = self.config.query_radius;
        let window = [cx - r, cy - r, cx + r, cy + r];

        tile.values()
            .flatten()
            .filter(|feature| feature.intersects(window))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of cached tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `coord` is cached, without refreshing its recency.
    #[must_use]
    pub fn contains(&self, coord: TileCoord) -> bool {
        lock(&self.state).entries.contains_key(&coord.key())
    }

    /// Number of fetches currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}
