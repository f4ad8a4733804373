//! Cell list over a (partially) periodic orthorhombic box.
//!
//! The box is cut into a regular grid whose cells are at least `cutoff` wide,
//! so every pair within the cutoff sits in the same or an adjacent cell.
//! Periodic axes wrap cell indices; axes with fewer than three cells list
//! each distinct neighbor cell only once. Atoms are stored cell by cell in
//! one flat array (counting sort), indexed by `cell_start`.

use crate::error::{ClusterError, ClusterResult};
use crate::pbc::SymBox;
use itertools::Itertools;
use log::debug;
use nalgebra::Vector3;

const MAX_CELLS: usize = 1 << 24;

#[derive(Debug, Clone)]
struct GridAxis {
    cells: usize,
    origin: f64,
    width: f64,
    periodic: bool,
    span: f64,
    neighbours: Vec<Vec<usize>>,
}

impl GridAxis {
    fn new(span: f64, origin: f64, cutoff: f64, periodic: bool) -> Self {
        let cells = (span / cutoff).floor();
        let cells = if cells.is_finite() && cells >= 1.0 {
            cells.min(MAX_CELLS as f64) as usize
        } else {
            1
        };
        Self {
            cells,
            origin,
            width: span / cells as f64,
            periodic,
            span,
            neighbours: Vec::new(),
        }
    }

    fn coarsen(&mut self) {
        self.cells = self.cells.div_ceil(2).max(1);
        self.width = self.span / self.cells as f64;
    }

    fn finish(&mut self) {
        let n = self.cells as isize;
        self.neighbours = (0..n)
            .map(|c| {
                if self.periodic {
                    (-1..=1).map(|d| (c + d).rem_euclid(n) as usize).unique().collect()
                } else {
                    (c - 1..=c + 1)
                        .filter(|i| (0..n).contains(i))
                        .map(|i| i as usize)
                        .collect()
                }
            })
            .collect();
    }

    fn cell(&self, x: f64) -> usize {
        if self.cells == 1 {
            return 0;
        }
        let rel = if self.periodic {
            (x - self.origin).rem_euclid(self.span)
        } else {
            x - self.origin
        };
        let i = (rel / self.width).floor();
        if i <= 0.0 {
            0
        } else {
            (i as usize).min(self.cells - 1)
        }
    }
}

/// Answers "which atoms lie within `cutoff` of atom `i`" under the
/// minimum-image convention. Read-only once built.
pub struct NeighborIndex<'a> {
    points: &'a [Vector3<f64>],
    sym_box: &'a SymBox,
    cutoff: f64,
    axes: [GridAxis; 3],
    cell_of: Vec<usize>,
    cell_start: Vec<usize>,
    cell_atoms: Vec<usize>,
}

fn alloc_vec<T: Clone>(len: usize, value: T, what: &str) -> ClusterResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ClusterError::ResourceExhausted(what.to_string()))?;
    v.resize(len, value);
    Ok(v)
}

impl<'a> NeighborIndex<'a> {
    pub fn build(
        points: &'a [Vector3<f64>],
        sym_box: &'a SymBox,
        cutoff: f64,
    ) -> ClusterResult<Self> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(ClusterError::InvalidCutoff(cutoff));
        }
        sym_box.validate()?;
        if let Some((atom, value)) = points.iter().enumerate().find_map(|(i, p)| {
            p.iter().copied().find(|v| !v.is_finite()).map(|v| (i, v))
        }) {
            return Err(ClusterError::NonFiniteCoordinate { atom, value });
        }

        let lo = sym_box.lo();
        let lengths = sym_box.lengths();
        let mut axes = [0, 1, 2].map(|axis| {
            if sym_box.is_periodic(axis) {
                GridAxis::new(lengths[axis], lo[axis], cutoff, true)
            } else {
                let (min, max) = points
                    .iter()
                    .map(|p| p[axis])
                    .minmax()
                    .into_option()
                    .unwrap_or((lo[axis], lo[axis]));
                GridAxis::new(max - min, min, cutoff, false)
            }
        });
        let max_cells = points.len().clamp(27, MAX_CELLS);
        while axes.iter().map(|a| a.cells as f64).product::<f64>() > max_cells as f64 {
            let widest = (0..3).max_by_key(|&i| axes[i].cells).unwrap_or(0);
            if axes[widest].cells == 1 {
                break;
            }
            axes[widest].coarsen();
        }
        axes.iter_mut().for_each(GridAxis::finish);
        let n_cells = axes.iter().map(|a| a.cells).product::<usize>();
        debug!(
            "cell grid {}x{}x{} for {} atoms, cutoff {cutoff}",
            axes[0].cells,
            axes[1].cells,
            axes[2].cells,
            points.len()
        );

        let mut index = Self {
            points,
            sym_box,
            cutoff,
            axes,
            cell_of: alloc_vec(points.len(), 0, "assigning atoms to cells")?,
            cell_start: alloc_vec(n_cells + 1, 0, "allocating the cell grid")?,
            cell_atoms: alloc_vec(points.len(), 0, "binning atoms")?,
        };
        for (i, p) in points.iter().enumerate() {
            let cell = index.cell_id(p);
            index.cell_of[i] = cell;
            index.cell_start[cell + 1] += 1;
        }
        for cell in 0..n_cells {
            index.cell_start[cell + 1] += index.cell_start[cell];
        }
        let mut fill = index.cell_start.clone();
        for (i, &cell) in index.cell_of.iter().enumerate() {
            index.cell_atoms[fill[cell]] = i;
            fill[cell] += 1;
        }
        Ok(index)
    }

    fn cell_id(&self, p: &Vector3<f64>) -> usize {
        let [x, y, z] = [0, 1, 2].map(|axis| self.axes[axis].cell(p[axis]));
        (x * self.axes[1].cells + y) * self.axes[2].cells + z
    }

    fn cell_coords(&self, cell: usize) -> [usize; 3] {
        let (ny, nz) = (self.axes[1].cells, self.axes[2].cells);
        [cell / (ny * nz), (cell / nz) % ny, cell % nz]
    }

    fn cell_members(&self, cell: usize) -> &[usize] {
        &self.cell_atoms[self.cell_start[cell]..self.cell_start[cell + 1]]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of cells along each axis.
    pub fn grid(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| self.axes[axis].cells)
    }

    /// Calls `f(j)` once for every atom `j != i` with
    /// minimum-image distance `<= cutoff`.
    pub fn for_each_neighbor<F>(&self, i: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let p = &self.points[i];
        let [cx, cy, cz] = self.cell_coords(self.cell_of[i]);
        let (ny, nz) = (self.axes[1].cells, self.axes[2].cells);
        for &x in &self.axes[0].neighbours[cx] {
            for &y in &self.axes[1].neighbours[cy] {
                for &z in &self.axes[2].neighbours[cz] {
                    let cell = (x * ny + y) * nz + z;
                    for &j in self.cell_members(cell) {
                        if j != i && self.sym_box.within(p, &self.points[j], self.cutoff) {
                            f(j);
                        }
                    }
                }
            }
        }
    }

    pub fn neighbors(&self, i: usize) -> Vec<usize> {
        let mut neighbors = Vec::new();
        self.for_each_neighbor(i, |j| neighbors.push(j));
        neighbors.sort_unstable();
        neighbors
    }

    /// Visits every unordered adjacent pair exactly once as `(i, j)`, `i < j`.
    pub fn for_each_pair<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize),
    {
        for i in 0..self.len() {
            self.for_each_neighbor(i, |j| {
                if i < j {
                    f(i, j)
                }
            });
        }
    }
}
