use crate::error::{ClusterError, ClusterResult};
use nalgebra::Vector3;

/// Orthorhombic simulation box as written in a LAMMPS dump header.
///
/// `boundaries` keeps the raw flags (`pp pp pp`, `pp pp fs`, ...). An axis is
/// periodic when its flag is `pp` or when no flag was given.
#[derive(Debug, Clone, PartialEq)]
pub struct SymBox {
    pub boundaries: String,
    pub xlo: f64,
    pub xhi: f64,
    pub ylo: f64,
    pub yhi: f64,
    pub zlo: f64,
    pub zhi: f64,
    periodic: [bool; 3],
}

fn parse_periodic(boundaries: &str) -> [bool; 3] {
    let mut flags = boundaries.split_whitespace();
    [(); 3].map(|_| flags.next().is_none_or(|flag| flag == "pp"))
}

impl SymBox {
    pub fn new(boundaries: &str, lo: [f64; 3], hi: [f64; 3]) -> Self {
        Self {
            boundaries: boundaries.trim().to_string(),
            xlo: lo[0],
            xhi: hi[0],
            ylo: lo[1],
            yhi: hi[1],
            zlo: lo[2],
            zhi: hi[2],
            periodic: parse_periodic(boundaries),
        }
    }

    /// Fully periodic box spanning `[0, L)` on every axis.
    pub fn orthorhombic(lengths: [f64; 3]) -> ClusterResult<Self> {
        let sym_box = Self::new("pp pp pp", [0.0; 3], lengths);
        sym_box.validate()?;
        Ok(sym_box)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        match self
            .lengths()
            .iter()
            .copied()
            .enumerate()
            .find(|(_, length)| !(length.is_finite() && *length > 0.0))
        {
            Some((axis, length)) => Err(ClusterError::InvalidBox { axis, length }),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn lo(&self) -> Vector3<f64> {
        Vector3::new(self.xlo, self.ylo, self.zlo)
    }

    #[inline]
    pub fn hi(&self) -> Vector3<f64> {
        Vector3::new(self.xhi, self.yhi, self.zhi)
    }

    #[inline]
    pub fn lengths(&self) -> Vector3<f64> {
        self.hi() - self.lo()
    }

    pub fn volume(&self) -> f64 {
        self.lengths().product()
    }

    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    /// Minimum image of a raw displacement.
    ///
    /// Each periodic component is shifted by a whole number of box lengths
    /// into `(-L/2, L/2]`, however many images away the input is.
    pub fn min_image(&self, mut d: Vector3<f64>) -> Vector3<f64> {
        let lengths = self.lengths();
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = lengths[axis];
                d[axis] -= l * (d[axis] / l - 0.5).ceil();
            }
        }
        d
    }

    /// Minimum-image displacement pointing from `a` to `b`.
    #[inline]
    pub fn delta(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
        self.min_image(b - a)
    }

    #[inline]
    pub fn distance_squared(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        self.delta(a, b).norm_squared()
    }

    #[inline]
    pub fn distance(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        self.distance_squared(a, b).sqrt()
    }

    /// Inclusive cutoff test under the minimum-image convention.
    #[inline]
    pub fn within(&self, a: &Vector3<f64>, b: &Vector3<f64>, cutoff: f64) -> bool {
        self.distance_squared(a, b) <= cutoff * cutoff
    }

    /// Maps a point into the primary cell along periodic axes.
    pub fn wrap(&self, mut point: Vector3<f64>) -> Vector3<f64> {
        let lo = self.lo();
        let lengths = self.lengths();
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = lengths[axis];
                let w = (point[axis] - lo[axis]).rem_euclid(l);
                // rem_euclid can round up to exactly l for tiny negative inputs
                let w = if w < l { w } else { 0.0 };
                point[axis] = w + lo[axis];
            }
        }
        point
    }
}
