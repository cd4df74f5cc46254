// FILE: src/spatial.rs
//! Spatial Assigner: deterministic scene coordinates for file records.
//!
//! A position depends only on the record's id, its size, and the size range
//! of the batch it was placed in. The generator, hash and noise below are
//! the same arithmetic rendering clients use to re-derive positions, so
//! they must not be "improved" independently of those clients.

use crate::identity::FileId;
use crate::record::{FileRecord, Position};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49297;
const LCG_MODULUS: u64 = 233280;

/// Layout parameters for the file shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Where the largest files in a batch settle.
    pub inner_radius: f64,
    /// Where the smallest files in a batch settle.
    pub outer_radius: f64,
    /// Total radial spread as a fraction of the base radius, centered on it.
    pub radius_jitter: f64,
    pub noise_scale: f64,
    /// Per-axis noise amplitude as a fraction of the radius.
    pub noise_strength: f64,
    pub noise: bool,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            inner_radius: 7.0,
            outer_radius: 70.0,
            radius_jitter: 0.3,
            noise_scale: 0.02,
            noise_strength: 0.1,
            noise: true,
        }
    }
}

/// Small LCG seeded from a record id.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: u64,
}

impl SeededRandom {
    pub fn new(seed: u32) -> Self {
        Self { state: seed as u64 }
    }

    pub fn for_id(id: &FileId) -> Self {
        Self::new(hash_seed(id.as_str()))
    }

    /// Next draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }
}

/// `h = h * 31 + unit` over UTF-16 units in wrapping 32-bit arithmetic,
/// then the absolute value.
pub fn hash_seed(key: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in key.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

/// Cheap hash-style noise in `[0, 1)`.
pub fn noise3(x: f64, y: f64, z: f64) -> f64 {
    let n = (x * 12.9898 + y * 78.233 + z * 37.719).sin() * 43758.5453;
    n - n.floor()
}

/// Observed size bounds of one placement batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: u64,
    pub max: u64,
}

impl SizeRange {
    pub fn observe<I: IntoIterator<Item = u64>>(sizes: I) -> Option<Self> {
        sizes.into_iter().fold(None, |range, size| match range {
            None => Some(Self { min: size, max: size }),
            Some(r) => Some(Self { min: r.min.min(size), max: r.max.max(size) }),
        })
    }

    /// 0.0 for the smallest size, 1.0 for the largest, 0.5 when degenerate.
    pub fn ratio(&self, size: u64) -> f64 {
        if self.max == self.min {
            return 0.5;
        }
        let clamped = size.clamp(self.min, self.max);
        (clamped - self.min) as f64 / (self.max - self.min) as f64
    }
}

/// Pure placement of one record.
pub fn position_for(id: &FileId, size: u64, range: SizeRange, config: &SpatialConfig) -> Position {
    let mut random = SeededRandom::for_id(id);

    // Large files sit near the inner radius
    let ratio = range.ratio(size);
    let base_radius = config.outer_radius - ratio * (config.outer_radius - config.inner_radius);
    let variance = base_radius * config.radius_jitter * (random.next_f64() - 0.5);
    let radius = (base_radius + variance).max(config.inner_radius);

    // Uniform over the sphere: acos keeps the poles from clustering
    let theta = random.next_f64() * 2.0 * PI;
    let phi = (2.0 * random.next_f64() - 1.0).acos();

    let mut x = radius * phi.sin() * theta.cos();
    let mut y = radius * phi.sin() * theta.sin();
    let mut z = radius * phi.cos();

    if config.noise {
        let s = config.noise_scale;
        let strength = radius * config.noise_strength;
        // Sequential on purpose: each axis sees the already-shifted ones
        x += (noise3(x * s, y * s, z * s) - 0.5) * strength;
        y += (noise3(y * s, z * s, x * s) - 0.5) * strength;
        z += (noise3(z * s, x * s, y * s) - 0.5) * strength;
    }

    Position::new(x, y, z)
}

/// Places records lazily and remembers every placement for the life of the
/// record, so a later batch with a different size range cannot move it.
pub struct SpatialAssigner {
    config: SpatialConfig,
    placed: DashMap<FileId, Position>,
}

impl SpatialAssigner {
    pub fn new(config: SpatialConfig) -> Self {
        Self { config, placed: DashMap::new() }
    }

    /// Position every unplaced record in `records`. Returns how many were
    /// newly computed (cache hits are not counted).
    pub fn place(&self, records: &mut [FileRecord]) -> usize {
        for record in records.iter_mut().filter(|r| r.position.is_none()) {
            if let Some(cached) = self.placed.get(&record.id) {
                record.position = Some(*cached);
            }
        }

        let range = SizeRange::observe(records.iter().filter(|r| r.position.is_none()).map(|r| r.size));
        let Some(range) = range else {
            return 0;
        };

        let mut computed = 0;
        for record in records.iter_mut().filter(|r| r.position.is_none()) {
            let position = *self
                .placed
                .entry(record.id.clone())
                .or_insert_with(|| position_for(&record.id, record.size, range, &self.config));
            record.position = Some(position);
            computed += 1;
        }

        tracing::debug!("[Spatial] Placed {} records (sizes {}..={})", computed, range.min, range.max);
        computed
    }

    /// Drop a placement once its record leaves the index.
    pub fn forget(&self, id: &FileId) {
        self.placed.remove(id);
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }
}

impl Default for SpatialAssigner {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}
