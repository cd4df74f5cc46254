// FILE: src/visibility.rs
//! Visibility queries: which positioned records are in range of a viewpoint,
//! nearest first, and at what level of detail.
//!
//! Everything here is a pure function of its inputs. Callers hand in a
//! snapshot and may run the query on any thread.

use crate::record::{FileRecord, Position};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inputs at least this large are distance-filtered on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Level of detail, nearest to farthest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lod {
    /// Near tier: full preview texture.
    Preview,
    /// Mid tier: icon plus label.
    Icon,
    /// Far tier: a single point.
    Point,
}

/// Tier boundaries. A distance equal to a boundary lands in the farther tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodThresholds {
    pub mid: f64,
    pub far: f64,
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self { mid: 25.0, far: 60.0 }
    }
}

impl LodThresholds {
    pub fn classify(&self, distance: f64) -> Lod {
        if distance < self.mid {
            Lod::Preview
        } else if distance < self.far {
            Lod::Icon
        } else {
            Lod::Point
        }
    }

    pub fn is_valid(&self) -> bool {
        self.mid >= 0.0 && self.mid <= self.far
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleFile<'a> {
    pub record: &'a FileRecord,
    pub distance: f64,
    pub lod: Lod,
}

/// Query result, sorted by distance and then by id.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet<'a> {
    files: Vec<VisibleFile<'a>>,
}

impl<'a> VisibleSet<'a> {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisibleFile<'a>> {
        self.files.iter()
    }

    /// Records of one tier, still nearest first.
    pub fn tier(&self, lod: Lod) -> impl Iterator<Item = &'a FileRecord> + '_ {
        self.files.iter().filter(move |f| f.lod == lod).map(|f| f.record)
    }

    /// Owned copy split by tier, for handing across a thread or the wire.
    pub fn buckets(&self) -> LodBuckets {
        LodBuckets {
            preview: self.tier(Lod::Preview).cloned().collect(),
            icon: self.tier(Lod::Icon).cloned().collect(),
            point: self.tier(Lod::Point).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LodBuckets {
    pub preview: Vec<FileRecord>,
    pub icon: Vec<FileRecord>,
    pub point: Vec<FileRecord>,
}

impl LodBuckets {
    pub fn len(&self) -> usize {
        self.preview.len() + self.icon.len() + self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn visible<'a>(
    record: &'a FileRecord,
    viewpoint: &Position,
    view_distance: f64,
    thresholds: &LodThresholds,
) -> Option<VisibleFile<'a>> {
    let distance = record.position?.distance_to(viewpoint);
    (distance <= view_distance).then(|| VisibleFile {
        record,
        distance,
        lod: thresholds.classify(distance),
    })
}

fn sorted(mut files: Vec<VisibleFile<'_>>) -> VisibleSet<'_> {
    // Equal distances fall back to id order so tiers do not flicker
    files.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    VisibleSet { files }
}

/// Brute-force query over every record. Unpositioned records are skipped
/// and `view_distance` is inclusive.
pub fn query<'a>(
    records: &'a [FileRecord],
    viewpoint: Position,
    view_distance: f64,
    thresholds: &LodThresholds,
) -> VisibleSet<'a> {
    let files: Vec<_> = if records.len() >= PARALLEL_THRESHOLD {
        records
            .par_iter()
            .filter_map(|r| visible(r, &viewpoint, view_distance, thresholds))
            .collect()
    } else {
        records
            .iter()
            .filter_map(|r| visible(r, &viewpoint, view_distance, thresholds))
            .collect()
    };
    sorted(files)
}

type CellKey = (i64, i64, i64);

/// Uniform grid over the positioned records of one snapshot. Cells hold
/// indices into that snapshot, so the grid can be kept alongside it and
/// reused for every query until the snapshot changes.
#[derive(Debug, Clone, Default)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl SpatialGrid {
    pub fn build(records: &[FileRecord], cell_size: f64) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for (slot, record) in records.iter().enumerate() {
            if let Some(position) = record.position {
                cells.entry(Self::key(cell_size, &position)).or_default().push(slot);
            }
        }
        Self { cell_size, cells }
    }

    fn key(cell_size: f64, p: &Position) -> CellKey {
        // Float to int casts saturate, so far-off points land on the edge cells
        (
            (p.x / cell_size).floor() as i64,
            (p.y / cell_size).floor() as i64,
            (p.z / cell_size).floor() as i64,
        )
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Same answer as [`query`] over `records`, which must be the slice the
    /// grid was built from.
    pub fn query<'a>(
        &self,
        records: &'a [FileRecord],
        viewpoint: Position,
        view_distance: f64,
        thresholds: &LodThresholds,
    ) -> VisibleSet<'a> {
        if view_distance.is_nan() || view_distance < 0.0 {
            return VisibleSet::default();
        }
        let lo = Self::key(
            self.cell_size,
            &Position::new(viewpoint.x - view_distance, viewpoint.y - view_distance, viewpoint.z - view_distance),
        );
        let hi = Self::key(
            self.cell_size,
            &Position::new(viewpoint.x + view_distance, viewpoint.y + view_distance, viewpoint.z + view_distance),
        );

        let hits = |bucket: &Vec<usize>| -> Vec<VisibleFile<'a>> {
            bucket
                .iter()
                .filter_map(|&slot| records.get(slot))
                .filter_map(|r| visible(r, &viewpoint, view_distance, thresholds))
                .collect()
        };

        let mut files = Vec::new();
        match box_cells(lo, hi) {
            Some(cells) if cells <= self.cells.len() as u128 => {
                for x in lo.0..=hi.0 {
                    for y in lo.1..=hi.1 {
                        for z in lo.2..=hi.2 {
                            if let Some(bucket) = self.cells.get(&(x, y, z)) {
                                files.extend(hits(bucket));
                            }
                        }
                    }
                }
            }
            // Box larger than the occupied set, or too large to count
            _ => {
                for ((x, y, z), bucket) in &self.cells {
                    let inside = (lo.0..=hi.0).contains(x) && (lo.1..=hi.1).contains(y) && (lo.2..=hi.2).contains(z);
                    if inside {
                        files.extend(hits(bucket));
                    }
                }
            }
        }
        sorted(files)
    }
}

/// Cells in the inclusive box `lo..=hi`, or `None` if the count overflows.
fn box_cells(lo: CellKey, hi: CellKey) -> Option<u128> {
    let span = |a: i64, b: i64| b.checked_sub(a)?.checked_add(1).map(|n| n as u128);
    span(lo.0, hi.0)?
        .checked_mul(span(lo.1, hi.1)?)?
        .checked_mul(span(lo.2, hi.2)?)
}
