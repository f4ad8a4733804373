use nalgebra::Vector3;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Atom position tagged with the atom's index in its snapshot.
#[derive(Debug, Clone, Copy)]
pub struct XYZ {
    point: Vector3<f64>,
    index: usize,
}

impl XYZ {
    pub fn from(coords: [f64; 3], index: usize) -> Self {
        Self {
            point: Vector3::from(coords),
            index,
        }
    }

    pub fn with_point(point: Vector3<f64>, index: usize) -> Self {
        Self { point, index }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn point(&self) -> Vector3<f64> {
        self.point
    }
}

impl Deref for XYZ {
    type Target = Vector3<f64>;

    fn deref(&self) -> &Self::Target {
        &self.point
    }
}

impl PartialEq for XYZ {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.point == other.point
    }
}

impl Eq for XYZ {}

impl Hash for XYZ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.point.iter().for_each(|n| {
            n.to_bits().hash(state);
        });
    }
}
