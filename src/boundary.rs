//! Boundary oracle: canonical edge keys and shared edge profiles
//!
//! Two adjacent chunks must agree on every cell of their shared edge
//! without generating each other. The oracle makes that possible: the
//! edge between two chunks is identified by one *canonical* key (the east
//! side of `(cx-1, cy)` and the west side of `(cx, cy)` both normalize to
//! `EdgeKey::V { x: cx, y: cy }`), the key seeds a dedicated RNG stream,
//! and the profile of corridor openings is drawn from that stream alone.
//! Whichever chunk asks first, the answer is the same.
//!
//! Opening positions are sampled from `[2, S-3]`, keeping corners and the
//! cells next to them solid, with a pairwise spacing of at least 2. The
//! redraw budget is bounded; when it runs out the oracle keeps the
//! openings it has instead of failing.

#![forbid(unsafe_code)]

use rand::Rng;

use crate::rng::{SeedStream, StreamLabel};
use crate::GenConfig;

/// Redraw attempts per opening before the count is reduced.
const PLACEMENT_ATTEMPTS_PER_OPENING: usize = 16;

/// One side of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Top row (`y = 0`).
    North,
    /// Right column (`x = S-1`).
    East,
    /// Bottom row (`y = S-1`).
    South,
    /// Left column (`x = 0`).
    West,
}

impl Side {
    /// All four sides in the fixed traversal order used by the generator.
    pub const ALL: [Side; 4] = [Side::North, Side::East, Side::South, Side::West];
}

/// Canonical identifier of a shared edge.
///
/// `H { x, y }` is the horizontal edge between the south row of
/// `(x, y-1)` and the north row of `(x, y)`; `V { x, y }` is the vertical
/// edge between the east column of `(x-1, y)` and the west column of
/// `(x, y)`. Both incident chunks normalize to the same variant, which is
/// the whole point: there is exactly one seed per edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKey {
    /// Horizontal edge (shared north/south rows).
    H {
        /// Chunk x coordinate of both incident chunks.
        x: i32,
        /// Chunk y coordinate of the southern chunk.
        y: i32,
    },
    /// Vertical edge (shared west/east columns).
    V {
        /// Chunk x coordinate of the eastern chunk.
        x: i32,
        /// Chunk y coordinate of both incident chunks.
        y: i32,
    },
}

impl EdgeKey {
    /// Canonical key for `side` of chunk `(cx, cy)`.
    pub fn for_side(side: Side, cx: i32, cy: i32) -> Self {
        match side {
            Side::North => EdgeKey::H { x: cx, y: cy },
            Side::South => EdgeKey::H { x: cx, y: cy + 1 },
            Side::West => EdgeKey::V { x: cx, y: cy },
            Side::East => EdgeKey::V { x: cx + 1, y: cy },
        }
    }

    /// Seed coordinates: a variant discriminant followed by the key pair.
    fn seed_coords(self) -> [i64; 3] {
        match self {
            EdgeKey::H { x, y } => [0, i64::from(x), i64::from(y)],
            EdgeKey::V { x, y } => [1, i64::from(x), i64::from(y)],
        }
    }
}

/// The opening profile of one chunk edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    /// Opening positions along the edge, sorted ascending, each in
    /// `[2, S-3]`, pairwise at least 2 apart.
    pub openings: Vec<usize>,
    /// Edge length `S`.
    pub length: usize,
}

impl Profile {
    /// Number of openings.
    #[inline]
    pub fn count(&self) -> usize {
        self.openings.len()
    }
}

/// Deterministic opening profile for `side` of chunk `(cx, cy)`.
///
/// Stateless beyond the seed: calling this from either incident chunk
/// (or from anywhere else) yields the same profile.
pub fn edge_profile(config: &GenConfig, side: Side, cx: i32, cy: i32) -> Profile {
    let s = config.chunk_size;
    let key = EdgeKey::for_side(side, cx, cy);
    let mut stream = SeedStream::new(config.world_seed, StreamLabel::EdgeProfile, &key.seed_coords());

    let count = if config.openings_max == 0 {
        0
    } else {
        stream.gen_range(config.openings_min..=config.openings_max)
    };

    let mut openings: Vec<usize> = Vec::with_capacity(count);
    'outer: for _ in 0..count {
        for _ in 0..PLACEMENT_ATTEMPTS_PER_OPENING {
            let p = stream.gen_range(2..=s - 3);
            if openings.iter().all(|&q| p.abs_diff(q) >= 2) {
                openings.push(p);
                continue 'outer;
            }
        }
        // Budget exhausted: keep what we have.
        break;
    }
    openings.sort_unstable();

    Profile { openings, length: s }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(seed: u64) -> GenConfig {
        GenConfig { world_seed: seed, ..GenConfig::default() }
    }

    #[test]
    fn keys_canonicalize_across_the_edge() {
        for (cx, cy) in [(0, 0), (-3, 5), (17, -17), (100, 100)] {
            assert_eq!(
                EdgeKey::for_side(Side::East, cx, cy),
                EdgeKey::for_side(Side::West, cx + 1, cy),
            );
            assert_eq!(
                EdgeKey::for_side(Side::South, cx, cy),
                EdgeKey::for_side(Side::North, cx, cy + 1),
            );
        }
    }

    #[test]
    fn horizontal_and_vertical_keys_never_collide() {
        // Same (x, y) pair, different orientation: distinct profiles.
        use rand::RngCore;
        let c = cfg(11);
        let mut h = SeedStream::new(c.world_seed, StreamLabel::EdgeProfile, &[0, 4, 4]);
        let mut v = SeedStream::new(c.world_seed, StreamLabel::EdgeProfile, &[1, 4, 4]);
        assert_ne!(h.next_u64(), v.next_u64());
    }

    #[test]
    fn incident_chunks_agree_on_profiles() {
        let c = cfg(2024);
        for cx in (-50..=50).step_by(10) {
            for cy in (-50..=50).step_by(10) {
                assert_eq!(
                    edge_profile(&c, Side::East, cx, cy),
                    edge_profile(&c, Side::West, cx + 1, cy),
                );
                assert_eq!(
                    edge_profile(&c, Side::South, cx, cy),
                    edge_profile(&c, Side::North, cx, cy + 1),
                );
            }
        }
    }

    #[test]
    fn openings_respect_domain_spacing_and_count() {
        let c = cfg(77);
        for cx in -25..=25 {
            for side in Side::ALL {
                let p = edge_profile(&c, side, cx, -cx);
                assert!(p.count() >= 1 && p.count() <= c.openings_max);
                assert!(p.openings.windows(2).all(|w| w[1] - w[0] >= 2));
                assert!(p.openings.iter().all(|&o| (2..=c.chunk_size - 3).contains(&o)));
            }
        }
    }

    #[test]
    fn single_opening_configuration_yields_exactly_one() {
        let mut c = cfg(5);
        c.openings_min = 1;
        c.openings_max = 1;
        for cx in -10..=10 {
            for side in Side::ALL {
                assert_eq!(edge_profile(&c, side, cx, 3).count(), 1);
            }
        }
    }

    #[test]
    fn zero_openings_configuration_yields_none() {
        let mut c = cfg(5);
        c.openings_min = 0;
        c.openings_max = 0;
        assert_eq!(edge_profile(&c, Side::North, 4, 4).count(), 0);
    }

    #[test]
    fn profiles_are_pure() {
        let c = cfg(31337);
        let a = edge_profile(&c, Side::North, -3, 9);
        let b = edge_profile(&c, Side::North, -3, 9);
        assert_eq!(a, b);
    }
}
