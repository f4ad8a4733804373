use crate::cluster_stats::StatsOptions;
use crate::error::{ClusterError, ClusterResult};
use std::collections::BTreeSet;

/// Order of the per-cluster records of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterOrder {
    /// Ascending smallest atom id.
    #[default]
    ByFirstAtom,
    /// Descending atom count, ties by smallest atom id.
    BySize,
}

/// Which frames of a trajectory to process: `start`, `start + step`, ...
/// up to (excluding) `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSelection {
    pub start: usize,
    pub stop: Option<usize>,
    pub step: usize,
}

impl Default for FrameSelection {
    fn default() -> Self {
        Self {
            start: 0,
            stop: None,
            step: 1,
        }
    }
}

impl FrameSelection {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && !self.is_past(index) && (index - self.start) % self.step == 0
    }

    pub fn is_past(&self, index: usize) -> bool {
        self.stop.is_some_and(|stop| index >= stop)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Species tags that count as precipitate atoms.
    pub species: BTreeSet<usize>,
    /// Per-atom column holding the species tag.
    pub species_key: String,
    pub cutoff: f64,
    /// Clusters below this many atoms are left out of summaries and the size
    /// distribution.
    pub min_size: usize,
    pub order: ClusterOrder,
    pub stats: StatsOptions,
    pub frames: FrameSelection,
    pub max_frames: Option<usize>,
}

impl ClusterConfig {
    pub fn new(species: impl IntoIterator<Item = usize>, cutoff: f64) -> Self {
        Self {
            species: species.into_iter().collect(),
            species_key: "type".to_string(),
            cutoff,
            min_size: 1,
            order: ClusterOrder::default(),
            stats: StatsOptions::default(),
            frames: FrameSelection::default(),
            max_frames: None,
        }
    }

    pub fn with_species_key(mut self, key: &str) -> Self {
        self.species_key = key.to_string();
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_order(mut self, order: ClusterOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_stats(mut self, stats: StatsOptions) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_reference_volume(mut self, volume: f64) -> Self {
        self.stats.reference_volume = Some(volume);
        self
    }

    pub fn with_frames(mut self, frames: FrameSelection) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(ClusterError::InvalidCutoff(self.cutoff));
        }
        if let Some(volume) = self.stats.reference_volume {
            if !(volume.is_finite() && volume > 0.0) {
                return Err(ClusterError::InvalidReferenceVolume(volume));
            }
        }
        if self.species.is_empty() {
            return Err(ClusterError::InvalidSelection(
                "no precipitate species given".to_string(),
            ));
        }
        if self.species_key.is_empty() {
            return Err(ClusterError::InvalidSelection(
                "empty species column name".to_string(),
            ));
        }
        if self.frames.step == 0 {
            return Err(ClusterError::InvalidSelection(
                "frame stride must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
