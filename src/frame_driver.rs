use crate::cluster_stats::{sort_stats, ClusterStats};
use crate::clusterizer::Clusterizer;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::frame::{Frame, FrameSource};
use crate::math::IteratorAvg;
use anyhow::{anyhow, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-frame precipitate counts. Mean and std are NaN without precipitates.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    /// Position in the trajectory, counting every frame the source yields.
    pub index: usize,
    pub step: u64,
    pub source: Option<PathBuf>,
    pub candidates: usize,
    /// All clusters of the partition, singletons included.
    pub clusters: usize,
    /// Clusters of at least `min_size` atoms.
    pub precipitates: usize,
    pub mean_size: f64,
    pub std_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub summary: FrameSummary,
    /// Records of the precipitates, in configured order.
    pub stats: Vec<ClusterStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFrame {
    pub index: usize,
    pub step: Option<u64>,
    pub source: Option<PathBuf>,
    pub reason: String,
}

/// Cluster size -> number of clusters of that size, over all frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeDistribution {
    counts: BTreeMap<usize, usize>,
}

impl SizeDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, size: usize) {
        *self.counts.entry(size).or_default() += 1;
    }

    pub fn add_stats(&mut self, stats: &[ClusterStats]) {
        for record in stats {
            self.add(record.size);
        }
    }

    pub fn merge(&mut self, other: &SizeDistribution) {
        for (&size, &count) in &other.counts {
            *self.counts.entry(size).or_default() += count;
        }
    }

    pub fn frequency(&self, size: usize) -> usize {
        self.counts.get(&size).copied().unwrap_or(0)
    }

    /// Number of clusters counted.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(&size, &count)| (size, count))
    }

    /// Counts binned into `[k * bin_width, (k + 1) * bin_width)`, keyed by
    /// lower bin edge. Empty bins are left out.
    pub fn histogram(&self, bin_width: usize) -> Vec<(usize, usize)> {
        let bin_width = bin_width.max(1);
        let bins = self.iter().chunk_by(move |(size, _)| size / bin_width);
        bins.into_iter()
            .map(|(bin, group)| (bin * bin_width, group.map(|(_, count)| count).sum()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverReport {
    pub frames: Vec<FrameResult>,
    pub skipped: Vec<SkippedFrame>,
    pub distribution: SizeDistribution,
    /// Frames picked by the selection, processed or skipped.
    pub selected: usize,
}

impl DriverReport {
    /// Processed and skipped frames merged in trajectory order.
    pub fn timeline(&self) -> Vec<std::result::Result<&FrameResult, &SkippedFrame>> {
        self.frames
            .iter()
            .map(Ok)
            .merge_by(self.skipped.iter().map(Err), |a, b| {
                let index = |r: &std::result::Result<&FrameResult, &SkippedFrame>| match r {
                    Ok(frame) => frame.summary.index,
                    Err(skipped) => skipped.index,
                };
                index(a) <= index(b)
            })
            .collect()
    }
}

#[derive(Default)]
struct Cursor {
    next_index: usize,
    taken: usize,
    atoms_count: Option<usize>,
    first_error: Option<anyhow::Error>,
}

/// Runs the clustering pipeline over the frames of a trajectory.
pub struct FrameDriver {
    config: ClusterConfig,
    stop: Arc<AtomicBool>,
}

impl FrameDriver {
    pub fn new(config: ClusterConfig) -> ClusterResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares a flag that, once set, ends the run after the frame in hand.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Clusters one frame and reports its precipitates.
    pub fn process_frame(&self, index: usize, frame: &Frame) -> ClusterResult<FrameResult> {
        let atoms = frame.candidates(&self.config.species);
        let clusters = Clusterizer::new(&atoms, &frame.sym_box, self.config.cutoff)?.clusterize()?;
        let mut stats = clusters
            .iter()
            .positions(|cluster| cluster.len() >= self.config.min_size)
            .map(|k| clusters.cluster_stats(k, &self.config.stats))
            .collect::<Vec<_>>();
        sort_stats(&mut stats, self.config.order);
        let (mean_size, std_size) = stats
            .iter()
            .map(|record| record.size as f64)
            .avg_with_std()
            .unwrap_or((f64::NAN, f64::NAN));
        debug!(
            "step {}: {} candidates, {} clusters, {} precipitates",
            frame.step,
            atoms.len(),
            clusters.len(),
            stats.len()
        );
        Ok(FrameResult {
            summary: FrameSummary {
                index,
                step: frame.step,
                source: frame.source().map(PathBuf::from),
                candidates: atoms.len(),
                clusters: clusters.len(),
                precipitates: stats.len(),
                mean_size,
                std_size,
            },
            stats,
        })
    }

    /// Processes the selected frames one after another.
    pub fn run<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<DriverReport> {
        let total = source.frames_hint();
        let mut cursor = Cursor::default();
        let mut report = DriverReport::default();
        while let Some((index, frame)) = self.next_selected(source, &mut cursor) {
            let Some(frame) = self.accept(index, frame, &mut cursor, &mut report) else {
                continue;
            };
            let outcome = self.process_frame(index, &frame);
            self.record(index, &frame, outcome, total, &mut cursor, &mut report);
        }
        self.finish(cursor, report)
    }

    /// Like [`Self::run`], clustering up to `threads` frames at a time on a
    /// dedicated pool. Frames are read and aggregated in trajectory order.
    pub fn run_parallel<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        threads: usize,
    ) -> Result<DriverReport> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        let total = source.frames_hint();
        let mut cursor = Cursor::default();
        let mut report = DriverReport::default();
        loop {
            let mut batch = Vec::with_capacity(threads);
            while batch.len() < threads {
                let Some((index, frame)) = self.next_selected(source, &mut cursor) else {
                    break;
                };
                if let Some(frame) = self.accept(index, frame, &mut cursor, &mut report) {
                    batch.push((index, frame));
                }
            }
            if batch.is_empty() {
                break;
            }
            let outcomes = pool.install(|| {
                batch
                    .par_iter()
                    .map(|(index, frame)| self.process_frame(*index, frame))
                    .collect::<Vec<_>>()
            });
            for ((index, frame), outcome) in batch.iter().zip(outcomes) {
                self.record(*index, frame, outcome, total, &mut cursor, &mut report);
            }
        }
        self.finish(cursor, report)
    }

    fn next_selected<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        cursor: &mut Cursor,
    ) -> Option<(usize, Result<Frame>)> {
        let selection = &self.config.frames;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("Stop requested after {} frames", cursor.taken);
                return None;
            }
            if selection.is_past(cursor.next_index)
                || self.config.max_frames.is_some_and(|max| cursor.taken >= max)
            {
                return None;
            }
            let index = cursor.next_index;
            cursor.next_index += 1;
            if !selection.contains(index) {
                if let Err(err) = source.skip_frame()? {
                    debug!("frame {index} unreadable while skipping: {err:#}");
                }
                continue;
            }
            let frame = source.next_frame()?;
            cursor.taken += 1;
            return Some((index, frame));
        }
    }

    /// Checks a freshly read frame against the first one of the run.
    fn accept(
        &self,
        index: usize,
        frame: Result<Frame>,
        cursor: &mut Cursor,
        report: &mut DriverReport,
    ) -> Option<Frame> {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                self.skip(index, None, err, cursor, report);
                return None;
            }
        };
        let expected = *cursor.atoms_count.get_or_insert(frame.len());
        if frame.len() != expected {
            let err = ClusterError::AtomCountMismatch {
                expected,
                found: frame.len(),
            };
            self.skip(index, Some(&frame), err.into(), cursor, report);
            return None;
        }
        Some(frame)
    }

    fn record(
        &self,
        index: usize,
        frame: &Frame,
        outcome: ClusterResult<FrameResult>,
        total: Option<usize>,
        cursor: &mut Cursor,
        report: &mut DriverReport,
    ) {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.skip(index, Some(frame), err.into(), cursor, report);
                return;
            }
        };
        let summary = &result.summary;
        match total {
            Some(total) if total > 0 => info!(
                "[{:>3}%] step {}: {} precipitates",
                (index + 1) * 100 / total,
                summary.step,
                summary.precipitates
            ),
            _ => info!(
                "frame {index}, step {}: {} precipitates",
                summary.step, summary.precipitates
            ),
        }
        report.distribution.add_stats(&result.stats);
        report.frames.push(result);
    }

    fn skip(
        &self,
        index: usize,
        frame: Option<&Frame>,
        err: anyhow::Error,
        cursor: &mut Cursor,
        report: &mut DriverReport,
    ) {
        let reason = format!("{err:#}");
        warn!("Skipping frame {index}: {reason}");
        report.skipped.push(SkippedFrame {
            index,
            step: frame.map(|frame| frame.step),
            source: frame.and_then(|frame| frame.source().map(PathBuf::from)),
            reason,
        });
        cursor.first_error.get_or_insert(err);
    }

    fn finish(&self, cursor: Cursor, mut report: DriverReport) -> Result<DriverReport> {
        report.selected = cursor.taken;
        if report.selected == 1 && report.frames.is_empty() {
            let err = cursor
                .first_error
                .unwrap_or_else(|| anyhow!("frame could not be processed"));
            return Err(err.context("The only selected frame is malformed"));
        }
        info!(
            "{} frames processed, {} skipped, {} precipitates",
            report.frames.len(),
            report.skipped.len(),
            report.distribution.total()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterOrder, FrameSelection};
    use crate::pbc::SymBox;
    use assert_float_eq::assert_f64_near;

    fn frame(step: u64, points: &[[f64; 3]]) -> Frame {
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        Frame::from_points(step, sym_box, points.iter().map(|&p| (p, 1))).unwrap()
    }

    fn chain(n: usize) -> Vec<[f64; 3]> {
        (0..n).map(|i| [1.0 + i as f64, 5.0, 5.0]).collect()
    }

    #[test]
    fn test_size_distribution() {
        let mut distribution = SizeDistribution::new();
        for size in [1, 1, 2, 5, 7, 12] {
            distribution.add(size);
        }
        assert_eq!(distribution.frequency(1), 2);
        assert_eq!(distribution.frequency(3), 0);
        assert_eq!(distribution.total(), 6);
        assert_eq!(distribution.histogram(5), vec![(0, 3), (5, 2), (10, 1)]);
        let mut other = SizeDistribution::new();
        other.add(2);
        distribution.merge(&other);
        assert_eq!(distribution.frequency(2), 2);
    }

    #[test]
    fn test_process_frame_min_size() {
        let config = ClusterConfig::new([1], 1.2)
            .with_min_size(2)
            .with_order(ClusterOrder::BySize);
        let driver = FrameDriver::new(config).unwrap();
        let mut points = chain(4);
        points.extend([[1.0, 1.0, 1.0], [1.0, 1.0, 2.0], [7.0, 7.0, 7.0]]);
        let result = driver.process_frame(0, &frame(10, &points)).unwrap();
        assert_eq!(result.summary.clusters, 3);
        assert_eq!(result.summary.precipitates, 2);
        assert_eq!(result.stats[0].size, 4);
        assert_f64_near!(result.summary.mean_size, 3.0);
        assert_f64_near!(result.summary.std_size, 1.0);
    }

    #[test]
    fn test_empty_frame_summary() {
        let driver = FrameDriver::new(ClusterConfig::new([1], 1.2)).unwrap();
        let result = driver.process_frame(0, &frame(0, &[])).unwrap();
        assert_eq!(result.summary.precipitates, 0);
        assert!(result.summary.mean_size.is_nan());
        assert!(result.stats.is_empty());
    }

    #[test]
    fn test_run_skips_mismatched_frame() {
        let driver = FrameDriver::new(ClusterConfig::new([1], 1.2)).unwrap();
        let frames = vec![
            Ok(frame(0, &chain(3))),
            Ok(frame(1, &chain(2))),
            Err(anyhow!("truncated")),
            Ok(frame(3, &chain(3))),
        ];
        let report = driver.run(&mut frames.into_iter()).unwrap();
        assert_eq!(report.selected, 4);
        assert_eq!(report.frames.len(), 2);
        let skipped = report.skipped.iter().map(|s| s.index).collect::<Vec<_>>();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(report.skipped[0].step, Some(1));
        assert_eq!(report.distribution.frequency(3), 2);
        let order = report
            .timeline()
            .iter()
            .map(|entry| match entry {
                Ok(frame) => frame.summary.index,
                Err(skipped) => skipped.index,
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_single_bad_frame_is_fatal() {
        let driver = FrameDriver::new(ClusterConfig::new([1], 1.2)).unwrap();
        let frames: Vec<Result<Frame>> = vec![Err(anyhow!("truncated"))];
        assert!(driver.run(&mut frames.into_iter()).is_err());
    }

    #[test]
    fn test_selection_and_limit() {
        let config = ClusterConfig::new([1], 1.2)
            .with_frames(FrameSelection {
                start: 1,
                stop: None,
                step: 2,
            })
            .with_max_frames(2);
        let driver = FrameDriver::new(config).unwrap();
        let mut frames = (0..8).map(|step| Ok::<_, anyhow::Error>(frame(step, &chain(2))));
        let report = driver.run(&mut frames).unwrap();
        let steps = report
            .frames
            .iter()
            .map(|f| f.summary.step)
            .collect::<Vec<_>>();
        assert_eq!(steps, vec![1, 3]);
    }

    #[test]
    fn test_stop_flag() {
        let stop = Arc::new(AtomicBool::new(true));
        let driver = FrameDriver::new(ClusterConfig::new([1], 1.2))
            .unwrap()
            .with_stop_flag(stop);
        let mut frames = (0..3).map(|step| Ok::<_, anyhow::Error>(frame(step, &chain(2))));
        let report = driver.run(&mut frames).unwrap();
        assert_eq!(report.selected, 0);
        assert!(report.frames.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let driver = FrameDriver::new(ClusterConfig::new([1], 1.2)).unwrap();
        let make = || {
            (0..7).map(|step| {
                let n = 1 + step as usize % 4;
                let mut points = chain(n);
                points.extend((0..5 - n).map(|k| [8.0, 8.0, 2.0 * k as f64]));
                Ok::<_, anyhow::Error>(frame(step, &points))
            })
        };
        let sequential = driver.run(&mut make()).unwrap();
        let parallel = driver.run_parallel(&mut make(), 3).unwrap();
        assert_eq!(sequential.frames.len(), parallel.frames.len());
        for (a, b) in sequential.frames.iter().zip(&parallel.frames) {
            assert_eq!(a.summary.step, b.summary.step);
            assert_eq!(a.stats, b.stats);
        }
        assert_eq!(sequential.distribution, parallel.distribution);
    }
}
