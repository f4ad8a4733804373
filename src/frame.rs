use crate::dump_snapshot::DumpSnapshot;
use crate::error::{ClusterError, ClusterResult};
use crate::pbc::SymBox;
use crate::xyz::XYZ;
use nalgebra::Vector3;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    /// Index into the frame's atom array.
    pub id: usize,
    pub position: Vector3<f64>,
    pub species: usize,
}

/// One validated simulation snapshot: a box and its atoms.
#[derive(Debug, Clone)]
pub struct Frame {
    pub step: u64,
    pub sym_box: SymBox,
    atoms: Vec<Atom>,
    source: Option<PathBuf>,
}

impl Frame {
    pub fn new(step: u64, sym_box: SymBox, atoms: Vec<Atom>) -> ClusterResult<Self> {
        sym_box.validate()?;
        for atom in &atoms {
            if let Some(value) = atom.position.iter().copied().find(|v| !v.is_finite()) {
                return Err(ClusterError::NonFiniteCoordinate {
                    atom: atom.id,
                    value,
                });
            }
        }
        Ok(Self {
            step,
            sym_box,
            atoms,
            source: None,
        })
    }

    /// Builds a frame from `(position, species)` pairs, numbering atoms in
    /// order.
    pub fn from_points(
        step: u64,
        sym_box: SymBox,
        points: impl IntoIterator<Item = ([f64; 3], usize)>,
    ) -> ClusterResult<Self> {
        let atoms = points
            .into_iter()
            .enumerate()
            .map(|(id, (position, species))| Atom {
                id,
                position: Vector3::from(position),
                species,
            })
            .collect();
        Self::new(step, sym_box, atoms)
    }

    /// Converts a dump snapshot, reading species tags from column
    /// `species_key` (`type`, or e.g. a structure-type column).
    pub fn from_snapshot(snapshot: &DumpSnapshot, species_key: &str) -> ClusterResult<Self> {
        let species = snapshot
            .try_get_property(species_key)
            .ok_or_else(|| ClusterError::MissingProperty(species_key.to_string()))?;
        let positions = snapshot
            .get_positions()
            .ok_or_else(|| ClusterError::MissingProperty("x y z".to_string()))?;
        let atoms = positions
            .iter()
            .zip(species)
            .map(|(xyz, &tag)| {
                if tag.is_finite() && tag >= 0.0 && tag.fract() == 0.0 {
                    Ok(Atom {
                        id: xyz.index(),
                        position: xyz.point(),
                        species: tag as usize,
                    })
                } else {
                    Err(ClusterError::InvalidSpecies {
                        atom: xyz.index(),
                        value: tag,
                    })
                }
            })
            .collect::<ClusterResult<Vec<_>>>()?;
        Self::new(snapshot.step, snapshot.sym_box.clone(), atoms)
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Positions of the atoms whose species is in `species`, tagged with their
    /// atom ids, in atom order.
    pub fn candidates(&self, species: &BTreeSet<usize>) -> Vec<XYZ> {
        self.atoms
            .iter()
            .filter(|atom| species.contains(&atom.species))
            .map(|atom| XYZ::with_point(atom.position, atom.id))
            .collect()
    }
}

/// Supplies frames one at a time, in trajectory order.
pub trait FrameSource {
    /// `None` once the trajectory is exhausted.
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>>;

    /// Advances past the next frame without building it.
    fn skip_frame(&mut self) -> Option<anyhow::Result<()>> {
        self.next_frame().map(|frame| frame.map(|_| ()))
    }

    /// Total number of frames, when known up front.
    fn frames_hint(&self) -> Option<usize> {
        None
    }
}

impl<I> FrameSource for I
where
    I: Iterator<Item = anyhow::Result<Frame>>,
{
    fn next_frame(&mut self) -> Option<anyhow::Result<Frame>> {
        self.next()
    }

    fn frames_hint(&self) -> Option<usize> {
        match self.size_hint() {
            (lo, Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump_file::DumpParsingError;

    #[test]
    fn test_candidates_filter_species() {
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        let frame = Frame::from_points(
            0,
            sym_box,
            [([1.0, 1.0, 1.0], 1), ([2.0, 2.0, 2.0], 2), ([3.0, 3.0, 3.0], 1)],
        )
        .unwrap();
        let candidates = frame.candidates(&BTreeSet::from([1]));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].index(), 2);
        assert!(frame.candidates(&BTreeSet::from([3])).is_empty());
    }

    #[test]
    fn test_rejects_non_finite() {
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        let frame = Frame::from_points(0, sym_box, [([1.0, f64::INFINITY, 1.0], 1)]);
        assert!(matches!(
            frame,
            Err(ClusterError::NonFiniteCoordinate { atom: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_box() {
        let sym_box = SymBox::new("pp pp pp", [0.0; 3], [10.0, -1.0, 10.0]);
        assert!(matches!(
            Frame::new(0, sym_box, Vec::new()),
            Err(ClusterError::InvalidBox { axis: 1, .. })
        ));
    }

    #[test]
    fn test_from_snapshot() {
        let body = "ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id StructureType x y z
1 0 1 1 1
2 3 2 2 2
";
        let mut lines = body.lines().map(|l| Ok::<_, DumpParsingError>(l.to_string()));
        let snapshot = DumpSnapshot::read(&mut lines, 5, 2).unwrap();
        let frame = Frame::from_snapshot(&snapshot, "StructureType").unwrap();
        assert_eq!(frame.step, 5);
        assert_eq!(frame.atoms()[1].species, 3);
        assert_eq!(
            Frame::from_snapshot(&snapshot, "type").unwrap_err(),
            ClusterError::MissingProperty("type".to_string())
        );
    }

    #[test]
    fn test_iterator_source_hint() {
        let frames: Vec<anyhow::Result<Frame>> = Vec::new();
        let source = frames.into_iter();
        assert_eq!(source.frames_hint(), Some(0));
    }
}
