use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

use crate::dump_file::DumpParsingError;
use crate::pbc::SymBox;
use crate::xyz::XYZ;

pub const HEADER_TIMESTEP: &str = "ITEM: TIMESTEP";
pub const HEADER_NUM_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
const HEADER_SYM_BOX: &str = "ITEM: BOX BOUNDS";
const HEADER_ATOMS: &str = "ITEM: ATOMS";

#[derive(Clone)]
pub struct DumpSnapshot {
    pub step: u64,
    pub atoms_count: usize,
    pub sym_box: SymBox,
    keys: HashMap<String, usize>,
    atoms: Vec<f64>,
}

fn read_bounds(line: Option<String>) -> Result<(f64, f64), DumpParsingError> {
    let line = line.ok_or(DumpParsingError::InvalidSymBox)?;
    let mut tokens = line.split_whitespace().map(str::parse::<f64>);
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(Ok(lo)), Some(Ok(hi)), None) => Ok((lo, hi)),
        (Some(Ok(_)), Some(Ok(_)), Some(_)) => Err(DumpParsingError::UnsupportedTriclinic),
        _ => Err(DumpParsingError::InvalidSymBox),
    }
}

impl DumpSnapshot {
    pub fn new(keys: HashMap<String, usize>, step: u64, atoms_count: usize, sym_box: SymBox) -> Self {
        Self {
            step,
            atoms_count,
            atoms: vec![0.0; atoms_count * keys.len()],
            keys,
            sym_box,
        }
    }

    /// Reads the box and atoms sections of one snapshot; the timestep and
    /// atom count headers are already consumed.
    pub fn read<I>(lines: &mut I, step: u64, atoms_count: usize) -> Result<Self, DumpParsingError>
    where
        I: Iterator<Item = Result<String, DumpParsingError>>,
    {
        let mut next_line = || lines.next().transpose();
        let boundaries = match next_line()?
            .as_deref()
            .and_then(|l| l.split_at_checked(HEADER_SYM_BOX.len()))
        {
            Some((HEADER_SYM_BOX, boundaries)) => boundaries.to_string(),
            _ => return Err(DumpParsingError::MissingSymBox),
        };
        if boundaries
            .split_whitespace()
            .any(|flag| matches!(flag, "xy" | "xz" | "yz"))
        {
            return Err(DumpParsingError::UnsupportedTriclinic);
        }
        let (xlo, xhi) = read_bounds(next_line()?)?;
        let (ylo, yhi) = read_bounds(next_line()?)?;
        let (zlo, zhi) = read_bounds(next_line()?)?;
        let sym_box = SymBox::new(&boundaries, [xlo, ylo, zlo], [xhi, yhi, zhi]);

        let mut keys = HashMap::new();
        match next_line()?
            .as_deref()
            .and_then(|l| l.split_at_checked(HEADER_ATOMS.len()))
        {
            Some((HEADER_ATOMS, names)) => {
                for key in names.split_whitespace() {
                    if keys.insert(key.to_string(), keys.len()).is_some() {
                        return Err(DumpParsingError::DuplicateAtomKeys);
                    }
                }
            }
            _ => return Err(DumpParsingError::MissingAtomKeys),
        }
        let mut snapshot = Self::new(keys, step, atoms_count, sym_box);
        let keys_count = snapshot.keys.len();
        for i in 0..atoms_count {
            let line = next_line()?.ok_or(DumpParsingError::InvalidOrMissingAtomRow)?;
            let mut count = 0;
            for (j, token) in line.split_whitespace().enumerate() {
                if j >= keys_count {
                    return Err(DumpParsingError::InvalidOrMissingAtomRow);
                }
                let value = token
                    .parse::<f64>()
                    .map_err(|_| DumpParsingError::InvalidOrMissingAtomRow)?;
                snapshot.atoms[atoms_count * j + i] = value;
                count += 1;
            }
            if count != keys_count {
                return Err(DumpParsingError::InvalidOrMissingAtomRow);
            }
        }
        Ok(snapshot)
    }

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "{HEADER_TIMESTEP}\n{}", self.step)?;
        writeln!(w, "{HEADER_NUM_OF_ATOMS}\n{}", self.atoms_count)?;
        let b = &self.sym_box;
        writeln!(w, "{HEADER_SYM_BOX} {}", b.boundaries)?;
        writeln!(w, "{} {}\n{} {}\n{} {}", b.xlo, b.xhi, b.ylo, b.yhi, b.zlo, b.zhi)?;
        let keys = self.get_keys();
        writeln!(
            w,
            "{HEADER_ATOMS} {}",
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" ")
        )?;
        for i in 0..self.atoms_count {
            let row = (0..keys.len())
                .map(|j| self.get_atom_value(j, i).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(w, "{row}")?;
        }
        Ok(())
    }

    pub fn get_keys(&self) -> Vec<&String> {
        let mut entries: Vec<(&String, &usize)> = self.keys.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1));
        entries.into_iter().map(|i| i.0).collect()
    }

    pub fn get_keys_map(&self) -> &HashMap<String, usize> {
        &self.keys
    }

    pub fn get_property_index(&self, key: &str) -> Option<usize> {
        self.keys.get(key).copied()
    }

    /// Per-atom column `key`.
    ///
    /// # Panics
    /// If the snapshot has no such column; see [`Self::try_get_property`].
    pub fn get_property(&self, key: &str) -> &[f64] {
        let start = self.keys[key] * self.atoms_count;
        let end = start + self.atoms_count;
        &self.atoms[start..end]
    }

    pub fn try_get_property(&self, key: &str) -> Option<&[f64]> {
        self.keys.contains_key(key).then(|| self.get_property(key))
    }

    #[inline]
    pub fn get_atom_value(&self, property_j: usize, atom_i: usize) -> f64 {
        self.atoms[self.atoms_count * property_j + atom_i]
    }

    #[inline]
    pub fn set_atom_value(&mut self, property_j: usize, atom_i: usize, value: f64) {
        self.atoms[self.atoms_count * property_j + atom_i] = value;
    }

    /// Appends a zero-filled column, or returns the existing one's index.
    pub fn add_property(&mut self, key: &str) -> usize {
        if let Some(j) = self.get_property_index(key) {
            return j;
        }
        let j = self.keys.len();
        self.keys.insert(key.to_string(), j);
        self.atoms.resize(self.atoms.len() + self.atoms_count, 0.0);
        j
    }

    /// Atom positions in real units. Prefers `x y z`, then unwrapped
    /// `xu yu zu`, then box-scaled `xs ys zs`.
    pub fn get_positions(&self) -> Option<Vec<XYZ>> {
        let columns_for = |names: [&str; 3]| -> Option<[&[f64]; 3]> {
            Some([
                self.try_get_property(names[0])?,
                self.try_get_property(names[1])?,
                self.try_get_property(names[2])?,
            ])
        };
        let (columns, scaled) = match columns_for(["x", "y", "z"])
            .or_else(|| columns_for(["xu", "yu", "zu"]))
        {
            Some(columns) => (columns, false),
            None => (columns_for(["xs", "ys", "zs"])?, true),
        };
        let (lo, lengths) = (self.sym_box.lo(), self.sym_box.lengths());
        Some(
            (0..self.atoms_count)
                .map(|i| {
                    let mut coords = [columns[0][i], columns[1][i], columns[2][i]];
                    if scaled {
                        for axis in 0..3 {
                            coords[axis] = lo[axis] + coords[axis] * lengths[axis];
                        }
                    }
                    XYZ::from(coords, i)
                })
                .collect(),
        )
    }
}

pub fn copy_snapshot_with_indices(
    snapshot: &DumpSnapshot,
    indices: impl Iterator<Item = usize>,
) -> DumpSnapshot {
    let indices = indices.collect::<Vec<_>>();
    let keys = snapshot.get_keys_map().clone();
    let keys_count = keys.len();
    let mut copy = DumpSnapshot::new(keys, snapshot.step, indices.len(), snapshot.sym_box.clone());
    for (new_i, i) in indices.into_iter().enumerate() {
        for j in 0..keys_count {
            copy.set_atom_value(j, new_i, snapshot.get_atom_value(j, i));
        }
    }
    copy
}

impl fmt::Debug for DumpSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSnapshot")
            .field("step", &self.step)
            .field("atoms_count", &self.atoms_count)
            .field("keys", &self.keys)
            .finish()
    }
}
