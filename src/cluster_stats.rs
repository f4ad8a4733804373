use crate::config::ClusterOrder;
use crate::pbc::SymBox;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use std::f64::consts::PI;

/// Optional per-cluster measures. Atom count is always reported.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsOptions {
    pub centroid: bool,
    pub gyration: bool,
    /// Volume per atom, turns atom counts into equivalent-sphere radii.
    pub reference_volume: Option<f64>,
}

impl StatsOptions {
    pub fn needs_positions(&self) -> bool {
        self.centroid || self.gyration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStats {
    pub size: usize,
    /// Smallest atom id in the cluster.
    pub first_atom: usize,
    /// Wrapped back into the primary cell.
    pub centroid: Option<Vector3<f64>>,
    pub radius_of_gyration: Option<f64>,
    /// Principal moments of the gyration tensor, descending.
    pub gyration_moments: Option<Vector3<f64>>,
    pub equivalent_radius: Option<f64>,
}

/// Radius of a sphere holding `size` atoms of volume `atomic_volume` each.
pub fn equivalent_radius(size: usize, atomic_volume: f64) -> f64 {
    (3.0 * size as f64 * atomic_volume / (4.0 * PI)).cbrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gyration {
    pub centroid: Vector3<f64>,
    pub radius: f64,
    pub moments: Vector3<f64>,
}

/// Centroid, radius of gyration and gyration-tensor moments of an already
/// unwrapped point set. Sums run over offsets from the first point.
pub fn gyration(positions: &[Vector3<f64>]) -> Option<Gyration> {
    let reference = *positions.first()?;
    let n = positions.len() as f64;
    let mean = positions
        .iter()
        .map(|p| p - reference)
        .sum::<Vector3<f64>>()
        / n;
    let tensor = positions
        .iter()
        .map(|p| {
            let d = p - reference - mean;
            d * d.transpose()
        })
        .sum::<Matrix3<f64>>()
        / n;
    let mut moments = SymmetricEigen::new(tensor)
        .eigenvalues
        .iter()
        .map(|m| m.max(0.0))
        .collect::<Vec<_>>();
    moments.sort_by(|a, b| b.total_cmp(a));
    Some(Gyration {
        centroid: reference + mean,
        radius: tensor.trace().max(0.0).sqrt(),
        moments: Vector3::new(moments[0], moments[1], moments[2]),
    })
}

impl ClusterStats {
    /// `positions` are the cluster's unwrapped positions; needed only when
    /// `options` asks for centroid or gyration.
    pub fn compute(
        size: usize,
        first_atom: usize,
        positions: Option<&[Vector3<f64>]>,
        sym_box: &SymBox,
        options: &StatsOptions,
    ) -> Self {
        let shape = positions.and_then(gyration);
        Self {
            size,
            first_atom,
            centroid: shape
                .as_ref()
                .filter(|_| options.centroid)
                .map(|g| sym_box.wrap(g.centroid)),
            radius_of_gyration: shape.as_ref().filter(|_| options.gyration).map(|g| g.radius),
            gyration_moments: shape.as_ref().filter(|_| options.gyration).map(|g| g.moments),
            equivalent_radius: options
                .reference_volume
                .map(|volume| equivalent_radius(size, volume)),
        }
    }
}

pub fn sort_stats(records: &mut [ClusterStats], order: ClusterOrder) {
    match order {
        ClusterOrder::ByFirstAtom => records.sort_by_key(|r| r.first_atom),
        ClusterOrder::BySize => {
            records.sort_by(|a, b| b.size.cmp(&a.size).then(a.first_atom.cmp(&b.first_atom)))
        }
    }
}
