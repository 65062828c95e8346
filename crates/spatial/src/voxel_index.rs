use hashbrown::HashMap;
use scanalign_core::{Normals, PointSet};

/// Integer cell coordinates: `floor(position / cell_size)` per axis.
pub type VoxelKey = (i32, i32, i32);

#[inline]
pub fn voxel_key(p: &[f32; 3], inv_cell: f32) -> VoxelKey {
    (
        (p[0] * inv_cell).floor() as i32,
        (p[1] * inv_cell).floor() as i32,
        (p[2] * inv_cell).floor() as i32,
    )
}

/// Neighbouring cell key. Keys of huge coordinates are already clamped to
/// the `i32` range, so the offset saturates instead of overflowing.
#[inline]
fn offset_key(key: VoxelKey, dx: i32, dy: i32, dz: i32) -> VoxelKey {
    (
        key.0.saturating_add(dx),
        key.1.saturating_add(dy),
        key.2.saturating_add(dz),
    )
}

/// What a cell keeps of the points hashed into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMode {
    /// Every point is stored; neighbours are reported by their index in the
    /// source set. Used for correspondence search.
    Raw,
    /// One running-average representative per cell; neighbours are reported
    /// by representative ordinal. Used for fusion and downsampling.
    Centroid,
}

/// Result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Source-point index (`Raw`) or representative ordinal (`Centroid`).
    pub index: usize,
    pub position: [f32; 3],
    pub normal: Option<[f32; 3]>,
    /// Euclidean distance to the query.
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
struct Cell {
    entries: Vec<u32>,
    count: u32,
}

/// Uniform hash grid over a point set.
///
/// Built once and read-only afterwards, so it can be shared across threads
/// for the duration of a registration. Non-finite input points are skipped.
///
/// `nearest` only visits the query's cell and its 26 neighbours, so its cost
/// is bounded by the local point density rather than the set size. Results
/// are exact whenever `max_radius <= cell_size`.
#[derive(Debug, Clone)]
pub struct VoxelIndex {
    cell_size: f32,
    inv_cell: f32,
    mode: CellMode,
    positions: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
    /// Source index per entry (`Raw`); unused in `Centroid` mode.
    origin: Vec<u32>,
    /// Cell key per entry, used to order representatives.
    keys: Vec<VoxelKey>,
    cells: HashMap<VoxelKey, Cell>,
}

impl VoxelIndex {
    /// Hash `points` into cubic cells of edge `cell_size`.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not finite and strictly positive.
    pub fn build(points: &PointSet, cell_size: f32, mode: CellMode) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell_size must be > 0 and finite"
        );

        let inv_cell = 1.0 / cell_size;
        let n = points.len();
        let has_normals = points.normals.is_some();

        let mut index = Self {
            cell_size,
            inv_cell,
            mode,
            positions: Vec::with_capacity(n),
            normals: has_normals.then(|| Vec::with_capacity(n)),
            origin: Vec::new(),
            keys: Vec::with_capacity(n),
            cells: HashMap::new(),
        };

        for (i, p) in points.iter_points().enumerate() {
            if !p.iter().all(|v| v.is_finite()) {
                continue;
            }
            let normal = points.normal(i);
            let key = voxel_key(&p, inv_cell);
            match mode {
                CellMode::Raw => index.push_raw(key, i, p, normal),
                CellMode::Centroid => index.push_centroid(key, p, normal),
            }
        }

        if mode == CellMode::Centroid {
            if let Some(normals) = index.normals.as_mut() {
                for n in normals.iter_mut() {
                    *n = normalize_or_zero(*n);
                }
            }
        }

        index
    }

    fn push_raw(&mut self, key: VoxelKey, source: usize, p: [f32; 3], normal: Option<[f32; 3]>) {
        let entry = self.positions.len() as u32;
        self.positions.push(p);
        if let (Some(normals), Some(n)) = (self.normals.as_mut(), normal) {
            normals.push(n);
        }
        self.origin.push(source as u32);
        self.keys.push(key);
        let cell = self.cells.entry(key).or_default();
        cell.entries.push(entry);
        cell.count += 1;
    }

    fn push_centroid(&mut self, key: VoxelKey, p: [f32; 3], normal: Option<[f32; 3]>) {
        let next = self.positions.len() as u32;
        let cell = self.cells.entry(key).or_default();
        if cell.entries.is_empty() {
            cell.entries.push(next);
            cell.count = 1;
            self.positions.push(p);
            if let (Some(normals), Some(n)) = (self.normals.as_mut(), normal) {
                normals.push(n);
            }
            self.keys.push(key);
            return;
        }

        cell.count += 1;
        let w = 1.0 / cell.count as f32;
        let entry = cell.entries[0] as usize;
        let mean = &mut self.positions[entry];
        for axis in 0..3 {
            mean[axis] += (p[axis] - mean[axis]) * w;
        }
        if let (Some(normals), Some(n)) = (self.normals.as_mut(), normal) {
            // Normals are summed; they get renormalised once the build is done.
            for axis in 0..3 {
                normals[entry][axis] += n[axis];
            }
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn mode(&self) -> CellMode {
        self.mode
    }

    /// Number of stored entries (points in `Raw`, representatives in `Centroid`).
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of source points that landed in the cell containing `p`.
    pub fn cell_population(&self, p: &[f32; 3]) -> usize {
        self.cells
            .get(&voxel_key(p, self.inv_cell))
            .map_or(0, |c| c.count as usize)
    }

    fn reported_index(&self, entry: usize) -> usize {
        match self.mode {
            CellMode::Raw => self.origin[entry] as usize,
            CellMode::Centroid => entry,
        }
    }

    /// Closest stored point to `query` within `max_radius`, searching the
    /// query cell and its 26 neighbours only.
    ///
    /// Returns `None` for empty neighbourhoods, non-finite queries, and
    /// NaN or non-positive radii.
    pub fn nearest(&self, query: &[f32; 3], max_radius: f32) -> Option<Neighbor> {
        if self.is_empty()
            || !query.iter().all(|v| v.is_finite())
            || max_radius.is_nan()
            || max_radius <= 0.0
        {
            return None;
        }

        let (kx, ky, kz) = voxel_key(query, self.inv_cell);
        let limit_sq = max_radius * max_radius;
        let mut best: Option<(u32, f32)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(cell) = self.cells.get(&offset_key((kx, ky, kz), dx, dy, dz)) else {
                        continue;
                    };
                    for &entry in &cell.entries {
                        let d2 = dist_sq(&self.positions[entry as usize], query);
                        if d2 <= limit_sq && best.map_or(true, |(_, b)| d2 < b) {
                            best = Some((entry, d2));
                        }
                    }
                }
            }
        }

        best.map(|(entry, d2)| {
            let entry = entry as usize;
            Neighbor {
                index: self.reported_index(entry),
                position: self.positions[entry],
                normal: self.normals.as_ref().map(|n| n[entry]),
                distance: d2.sqrt(),
            }
        })
    }

    /// All stored points within Euclidean `radius` of `query` (inclusive),
    /// sorted by reported index.
    pub fn within_radius(&self, query: &[f32; 3], radius: f32) -> Vec<usize> {
        if self.is_empty()
            || radius <= 0.0
            || !radius.is_finite()
            || !query.iter().all(|v| v.is_finite())
        {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        let span = (radius * self.inv_cell).ceil() as i64;
        let block = (2 * span + 1).checked_pow(3).unwrap_or(i64::MAX);
        let mut out = Vec::new();

        let mut visit = |cell: &Cell| {
            for &entry in &cell.entries {
                if dist_sq(&self.positions[entry as usize], query) <= radius_sq {
                    out.push(self.reported_index(entry as usize));
                }
            }
        };

        if block as usize > self.cells.len() {
            // Sparse grid: walking the occupied cells is cheaper than the block.
            self.cells.values().for_each(&mut visit);
        } else {
            let (kx, ky, kz) = voxel_key(query, self.inv_cell);
            let span = span as i32;
            for dx in -span..=span {
                for dy in -span..=span {
                    for dz in -span..=span {
                        if let Some(cell) = self.cells.get(&offset_key((kx, ky, kz), dx, dy, dz)) {
                            visit(cell);
                        }
                    }
                }
            }
        }

        out.sort_unstable();
        out
    }

    pub fn position(&self, entry: usize) -> [f32; 3] {
        self.positions[entry]
    }

    /// Stored entries as a point set, ordered by cell key.
    ///
    /// In `Centroid` mode this is one averaged point per occupied cell, with
    /// averaged normals when the input carried normals.
    pub fn representatives(&self) -> PointSet {
        let mut order: Vec<usize> = (0..self.positions.len()).collect();
        order.sort_by_key(|&i| self.keys[i]);

        let points: Vec<[f32; 3]> = order.iter().map(|&i| self.positions[i]).collect();
        let mut set = PointSet::from_points(&points);
        if let Some(normals) = self.normals.as_ref() {
            let ordered: Vec<[f32; 3]> = order.iter().map(|&i| normals[i]).collect();
            set.normals = Some(Normals::from_vectors(&ordered));
        }
        set
    }
}

#[inline]
fn dist_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

fn normalize_or_zero(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-12 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0; 3]
    }
}
