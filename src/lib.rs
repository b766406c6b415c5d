//! Crate root: public surface, core types, and world-wide invariants
//!
//! This module is the single canonical entry-point for downstream users of
//! the library. It centralizes the generation configuration, the generated
//! chunk type, shared error categories, and re-exports the submodules that
//! implement the chunked dungeon world.
//!
//! ## Invariants
//!
//! - **Purity.** A chunk is a function of `(world_seed, cx, cy)` and the
//!   generation configuration alone. Re-generating the same coordinate with
//!   the same configuration yields a cell-identical grid and tablet list.
//!
//! - **Edge agreement.** Both chunks incident to a shared edge derive that
//!   edge's wall/floor pattern from one canonical edge key, so the east
//!   column of `(cx, cy)` always equals the west column of `(cx+1, cy)` and
//!   the south row of `(cx, cy)` always equals the north row of `(cx, cy+1)`,
//!   without either chunk generating the other.
//!
//! - **Reachability.** Within a chunk, every boundary opening and every room
//!   floor cell lie in one 4-connected floor component. The generator
//!   self-checks this after every build; a violation is a hard error and the
//!   result is never cached.
//!
//! - **Seeding discipline.** Every random decision is drawn from a BLAKE3
//!   XOF stream keyed by the world seed, an explicit stream label, and the
//!   coordinates the decision belongs to. No iteration order in the
//!   generator depends on hash-map traversal.
//!
//! Failure modes are precise errors (never UB); the crate forbids `unsafe`.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Deterministic RNG family (BLAKE3 seed mixer, label-separated streams).
pub mod rng;
/// Cell glyphs, the square chunk grid, and the wire row format.
pub mod grid;
/// Smooth scalar style fields biasing per-chunk generation.
pub mod style;
/// Boundary oracle: canonical edge keys and shared edge profiles.
pub mod boundary;
/// Chunk generator pipeline and post-generation self-check.
pub mod generator;
/// Keyed single-flight chunk cache with LRU eviction.
pub mod cache;
/// Generator facade combining cache and generator.
pub mod world;

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use crate::boundary::{EdgeKey, Profile, Side};
pub use crate::cache::ChunkCache;
pub use crate::generator::{generate_chunk, GenerateError};
pub use crate::grid::{Cell, Grid, GridParseError};
pub use crate::rng::{SeedStream, StreamLabel};
pub use crate::style::StyleParams;
pub use crate::world::World;

// ============================================================================
// Configuration
// ============================================================================

/// Generation configuration, fixed for the lifetime of a world.
///
/// All knobs that influence chunk content live here. Two processes holding
/// an equal `GenConfig` produce bit-identical chunks for every coordinate;
/// changing any generation-relevant field is a different world (see
/// [`World::config_digest`](crate::world::World::config_digest)).
#[derive(Clone, Debug, PartialEq)]
pub struct GenConfig {
    /// 64-bit world seed.
    pub world_seed: u64,
    /// Side length `S` of the square chunk grid.
    pub chunk_size: usize,
    /// Minimum number of rooms attempted per chunk.
    pub rooms_min: usize,
    /// Maximum number of rooms attempted per chunk.
    pub rooms_max: usize,
    /// Minimum room width.
    pub room_w_min: usize,
    /// Maximum room width.
    pub room_w_max: usize,
    /// Minimum room height.
    pub room_h_min: usize,
    /// Maximum room height.
    pub room_h_max: usize,
    /// Minimum corridor openings per chunk edge.
    pub openings_min: usize,
    /// Maximum corridor openings per chunk edge.
    pub openings_max: usize,
    /// Room placement attempt budget per chunk.
    pub placement_attempts: usize,
    /// Per-room tablet probability (weighted by the local `alpha` field).
    pub tablet_prob: f64,
    /// Hard cap on tablets per chunk.
    pub tablets_max: usize,
    /// Chunk cache capacity in entries.
    pub cache_capacity: usize,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            world_seed: 0x524F_414D_4745_4E01,
            chunk_size: 48,
            rooms_min: 3,
            rooms_max: 8,
            room_w_min: 4,
            room_w_max: 10,
            room_h_min: 4,
            room_h_max: 10,
            openings_min: 1,
            openings_max: 3,
            placement_attempts: 40,
            tablet_prob: 0.15,
            tablets_max: 3,
            cache_capacity: 4096,
        }
    }
}

/// Configuration validation failures. Fatal at initialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The chunk side length is below the supported minimum.
    #[error("chunk_size must be at least 16 (got {0})")]
    ChunkSizeTooSmall(usize),
    /// A `min..=max` knob pair is inverted.
    #[error("inverted range for {name}: {lo}..={hi}")]
    InvertedRange {
        /// Name of the offending knob pair.
        name: &'static str,
        /// Configured minimum.
        lo: usize,
        /// Configured maximum.
        hi: usize,
    },
    /// Rooms of the configured maximum size cannot fit the chunk interior.
    #[error("room_{axis}_max {max} does not fit a chunk of size {chunk_size} (needs {axis} <= chunk_size - 4)")]
    RoomTooLarge {
        /// `"w"` or `"h"`.
        axis: &'static str,
        /// Configured maximum extent on that axis.
        max: usize,
        /// Configured chunk side length.
        chunk_size: usize,
    },
    /// More openings were requested than the edge can hold at spacing 2.
    #[error("openings_max {0} cannot be spaced on an edge of a size-{1} chunk")]
    TooManyOpenings(usize, usize),
    /// The tablet probability is outside `[0, 1]`.
    #[error("tablet_prob must be within [0, 1] (got {0})")]
    TabletProb(f64),
    /// The cache must hold at least one entry.
    #[error("cache_capacity must be positive (got {0})")]
    CacheCapacity(usize),
}

impl GenConfig {
    /// Validate every knob. Called once by [`World::new`]; generation code
    /// may assume a validated configuration afterwards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 16 {
            return Err(ConfigError::ChunkSizeTooSmall(self.chunk_size));
        }
        for (name, lo, hi) in [
            ("rooms", self.rooms_min, self.rooms_max),
            ("room_w", self.room_w_min, self.room_w_max),
            ("room_h", self.room_h_min, self.room_h_max),
            ("openings", self.openings_min, self.openings_max),
        ] {
            if lo > hi {
                return Err(ConfigError::InvertedRange { name, lo, hi });
            }
        }
        if self.room_w_max + 4 > self.chunk_size {
            return Err(ConfigError::RoomTooLarge {
                axis: "w",
                max: self.room_w_max,
                chunk_size: self.chunk_size,
            });
        }
        if self.room_h_max + 4 > self.chunk_size {
            return Err(ConfigError::RoomTooLarge {
                axis: "h",
                max: self.room_h_max,
                chunk_size: self.chunk_size,
            });
        }
        // Openings live in [2, S-3] with pairwise distance >= 2.
        if self.openings_max > 0 && 2 * self.openings_max - 1 > self.chunk_size - 4 {
            return Err(ConfigError::TooManyOpenings(self.openings_max, self.chunk_size));
        }
        if !(0.0..=1.0).contains(&self.tablet_prob) {
            return Err(ConfigError::TabletProb(self.tablet_prob));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::CacheCapacity(self.cache_capacity));
        }
        Ok(())
    }
}

// ============================================================================
// Generated chunk
// ============================================================================

/// Wall-clock phase timings recorded during one chunk build, in
/// fractional milliseconds. Timings describe the build that produced the
/// chunk; cache hits return the stored first-build values unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseTimings {
    /// Seed and style-field setup.
    pub setup: f64,
    /// Grid allocation and boundary stamping.
    pub init: f64,
    /// Perpendicular stub carving from each opening.
    pub boundary_corridors: f64,
    /// Room placement attempts.
    pub room_generation: f64,
    /// Room rectangle carving.
    pub room_floors: f64,
    /// Internal corridor graph carving.
    pub room_hallways: f64,
    /// Stub-to-room connection carving.
    pub boundary_connections: f64,
    /// Sum of the pipeline phases.
    pub total: f64,
    /// Total including self-check and publication overhead around the
    /// pipeline. Recorded by the facade, not the generator.
    pub total_with_overhead: f64,
}

/// One generated chunk: an immutable `S x S` grid plus its tablet markers.
///
/// Tablet *content* is external state and is not part of the chunk; only
/// the marker coordinates are. Equality of two chunks is equality of
/// coordinates, grid, and tablets (timings and style are diagnostics).
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Chunk x coordinate.
    pub cx: i32,
    /// Chunk y coordinate.
    pub cy: i32,
    /// The generated grid.
    pub grid: Grid,
    /// Tablet cells as `(local_x, local_y)`, in placement order.
    pub tablets: Vec<(usize, usize)>,
    /// Style field values the build was biased by.
    pub style: StyleParams,
    /// Build timings (first build only; see [`PhaseTimings`]).
    pub timings: PhaseTimings,
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.cx == other.cx
            && self.cy == other.cy
            && self.grid == other.grid
            && self.tablets == other.tablets
    }
}

impl Eq for Chunk {}
