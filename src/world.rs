//! Generator facade
//!
//! [`World`] is the entry point the outer layers hold on to: it owns the
//! validated configuration and the chunk cache, and composes them into
//! `get`-style operations with no additional logic. Builds run through
//! the cache's detached single-flight path, followed by the generator
//! self-check; a chunk that fails the check is reported and never cached.
//!
//! The facade also owns the two diagnostic projections: the per-chunk
//! debug view (style fields, wavelengths, integer-millisecond phase
//! timings of the chunk's first build) and the configuration digest that
//! external stores can key by to survive configuration drift.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cache::ChunkCache;
use crate::generator::{generate_checked, GenerateError};
use crate::style::wavelength_report;
use crate::{Chunk, ConfigError, GenConfig, PhaseTimings};

/// Integer-millisecond projection of [`PhaseTimings`] for debug output.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TimingsView {
    /// Seed and style-field setup.
    pub setup: u64,
    /// Grid allocation and boundary stamping.
    pub init: u64,
    /// Stub carving.
    pub boundary_corridors: u64,
    /// Room placement.
    pub room_generation: u64,
    /// Room carving.
    pub room_floors: u64,
    /// Internal corridors.
    pub room_hallways: u64,
    /// Stub-to-room connections.
    pub boundary_connections: u64,
    /// Pipeline total.
    pub total: u64,
    /// Pipeline total plus self-check and publication overhead.
    pub total_with_overhead: u64,
}

impl From<PhaseTimings> for TimingsView {
    fn from(t: PhaseTimings) -> Self {
        let r = |v: f64| v.round() as u64;
        Self {
            setup: r(t.setup),
            init: r(t.init),
            boundary_corridors: r(t.boundary_corridors),
            room_generation: r(t.room_generation),
            room_floors: r(t.room_floors),
            room_hallways: r(t.room_hallways),
            boundary_connections: r(t.boundary_connections),
            total: r(t.total),
            total_with_overhead: r(t.total_with_overhead),
        }
    }
}

/// Debug metadata for one chunk, describing the build that produced it.
/// Cache hits carry the stored first-build values unchanged.
#[derive(Clone, Debug, Serialize)]
pub struct ChunkDebug {
    /// Room density / tablet richness field at this chunk.
    pub alpha: f64,
    /// Extra hallway cycle field at this chunk.
    pub beta: f64,
    /// Layout variance field at this chunk.
    pub spatial_variation: f64,
    /// Total generation time in integer milliseconds.
    pub generation_time: u64,
    /// Human-readable sinusoid mix of each style field.
    pub wavelengths: Vec<String>,
    /// Per-phase timings in integer milliseconds.
    pub timings: TimingsView,
}

/// The shared world: configuration plus cache plus generator.
pub struct World {
    config: GenConfig,
    cache: Arc<ChunkCache>,
    builds: Arc<AtomicU64>,
}

impl World {
    /// Validate `config` and construct the world around an empty cache.
    pub fn new(config: GenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = Arc::new(ChunkCache::new(config.cache_capacity));
        Ok(Self { config, cache, builds: Arc::new(AtomicU64::new(0)) })
    }

    /// The validated configuration.
    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    /// How many generator invocations this world has performed. Cache
    /// hits and coalesced waiters do not count.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Fetch (building if necessary) the chunk at `(cx, cy)`.
    pub async fn chunk(&self, cx: i32, cy: i32) -> Result<Arc<Chunk>, GenerateError> {
        let config = self.config.clone();
        let builds = Arc::clone(&self.builds);
        Arc::clone(&self.cache)
            .get_or_build((cx, cy), move || {
                builds.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                let mut chunk = generate_checked(&config, cx, cy)?;
                chunk.timings.total_with_overhead = started.elapsed().as_secs_f64() * 1e3;
                Ok(chunk)
            })
            .await
    }

    /// Ordered tablet cells of the chunk at `(cx, cy)`. Stable across
    /// restarts for a fixed configuration; external stores key by
    /// `(cx, cy, local_x, local_y)`.
    pub async fn tablet_locations(&self, cx: i32, cy: i32) -> Result<Vec<(usize, usize)>, GenerateError> {
        Ok(self.chunk(cx, cy).await?.tablets.clone())
    }

    /// Debug projection of a chunk fetched from this world.
    pub fn debug_view(&self, chunk: &Chunk) -> ChunkDebug {
        ChunkDebug {
            alpha: chunk.style.alpha,
            beta: chunk.style.beta,
            spatial_variation: chunk.style.spatial_variation,
            generation_time: chunk.timings.total.round() as u64,
            wavelengths: wavelength_report(self.config.world_seed),
            timings: chunk.timings.into(),
        }
    }

    /// BLAKE3 digest over the generation-relevant configuration fields.
    ///
    /// Two worlds share a digest exactly when they generate identical
    /// chunks everywhere. Cache capacity is excluded: it changes nothing
    /// about chunk content. External stores (tablet text) embed this in
    /// their keyspace so content never outlives the layout it was written
    /// against.
    pub fn config_digest(&self) -> String {
        let c = &self.config;
        let mut h = blake3::Hasher::new();
        h.update(b"roamgen.config.v1");
        h.update(&c.world_seed.to_be_bytes());
        for v in [
            c.chunk_size,
            c.rooms_min,
            c.rooms_max,
            c.room_w_min,
            c.room_w_max,
            c.room_h_min,
            c.room_h_max,
            c.openings_min,
            c.openings_max,
            c.placement_attempts,
            c.tablets_max,
        ] {
            h.update(&(v as u64).to_be_bytes());
        }
        h.update(&c.tablet_prob.to_bits().to_be_bytes());
        hex::encode(&h.finalize().as_bytes()[..8])
    }
}
