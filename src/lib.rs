mod cluster_stats;
mod clusterizer;
mod config;
mod disjoint_set;
mod dump_file;
mod dump_reader;
mod dump_snapshot;
mod error;
mod frame;
mod frame_driver;
pub mod math;
mod neighbor_index;
mod pbc;
mod xyz;

pub use cluster_stats::{equivalent_radius, gyration, sort_stats, ClusterStats, Gyration, StatsOptions};
pub use clusterizer::{clusterize_snapshot, get_cluster_counts, Cluster, Clusterizer, Clusters};
pub use config::{ClusterConfig, ClusterOrder, FrameSelection};
pub use disjoint_set::DisjointSet;
pub use dump_file::{DumpFile, DumpParsingError};
pub use dump_reader::{DumpReader, DumpTrajectory};
pub use dump_snapshot::{copy_snapshot_with_indices, DumpSnapshot};
pub use error::{ClusterError, ClusterResult};
pub use frame::{Atom, Frame, FrameSource};
pub use frame_driver::{
    DriverReport, FrameDriver, FrameResult, FrameSummary, SizeDistribution, SkippedFrame,
};
pub use neighbor_index::NeighborIndex;
pub use pbc::SymBox;
pub use xyz::XYZ;
