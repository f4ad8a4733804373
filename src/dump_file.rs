use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::dump_reader::DumpReader;
use crate::dump_snapshot::DumpSnapshot;

pub struct DumpFile {
    snapshots: HashMap<u64, DumpSnapshot>,
}

#[derive(Debug)]
pub enum DumpParsingError {
    InvalidOrMissingTimestep,
    InvalidOrMissingNumberOfAtoms,
    MissingSymBox,
    InvalidSymBox,
    UnsupportedTriclinic,
    MissingAtomKeys,
    DuplicateAtomKeys,
    DuplicateSnapshots,
    InvalidOrMissingAtomRow,
    IO(io::Error),
}

impl std::fmt::Display for DumpParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for DumpParsingError {}

impl DumpFile {
    #[must_use]
    pub fn new(snapshots: Vec<DumpSnapshot>) -> Self {
        let mut snapshots_map = HashMap::new();
        for snapshot in snapshots {
            snapshots_map.insert(snapshot.step, snapshot);
        }
        Self {
            snapshots: snapshots_map,
        }
    }

    /// Reads the snapshots whose timestep is listed in `timesteps`, or every
    /// snapshot when the list is empty.
    pub fn read(path: &Path, timesteps: &[u64]) -> Result<Self> {
        let mut reader = DumpReader::open(path)?;
        let mut timesteps = timesteps.to_vec();
        timesteps.sort_unstable();
        let last = timesteps.last().copied();

        let mut dump = Self {
            snapshots: HashMap::new(),
        };
        loop {
            let Some(step) = reader.peek_timestep().transpose()? else {
                break Ok(dump);
            };
            if last.is_some_and(|last| step > last) {
                break Ok(dump);
            }
            if !timesteps.is_empty() && timesteps.binary_search(&step).is_err() {
                reader.skip_snapshot().transpose()?;
                continue;
            }
            if dump.snapshots.contains_key(&step) {
                break Err(anyhow!(DumpParsingError::DuplicateSnapshots));
            }
            if let Some(snapshot) = reader.next().transpose()? {
                dump.snapshots.insert(snapshot.step, snapshot);
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let f = fs::File::create(path)?;
        let mut w = io::BufWriter::new(f);
        for snapshot in self.get_snapshots() {
            snapshot.write(&mut w)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get_snapshots(&self) -> Vec<&DumpSnapshot> {
        let mut entries: Vec<(&u64, &DumpSnapshot)> = self.snapshots.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|i| i.1).collect()
    }
}
