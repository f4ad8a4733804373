use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use precipitate_util_rust::{
    ClusterConfig, ClusterOrder, DumpFile, DumpSnapshot, clusterize_snapshot,
    copy_snapshot_with_indices, get_cluster_counts,
};
use rayon::{ThreadPoolBuilder, prelude::*};
use std::{
    collections::BTreeSet,
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Writes a copy of each dump with a per-atom `cluster` column (1 for the
/// largest cluster, 0 for atoms outside the precipitate species).
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// LAMMPS dump files
    #[arg(required = true)]
    dump_files: Vec<PathBuf>,

    /// Precipitate species "<tag 1>,<tag 2>,...", ex. "2,3"
    #[arg(short, long, value_delimiter = ',', required = true)]
    species: Vec<usize>,

    /// Per-atom column holding the species tag
    #[arg(long, default_value = "type")]
    species_key: String,

    /// Cluster cutoff radius (A)
    #[arg(short, long, default_value_t = 10.0)]
    cutoff: f64,

    /// Only this timestep of each dump
    #[arg(long, value_name = "TIMESTEP")]
    timestep: Option<u64>,

    /// Keep only atoms of clusters with at least this many atoms
    #[arg(short, long)]
    min_size: Option<usize>,

    /// Appended to the input file name
    #[arg(long, default_value = ".clusters")]
    suffix: String,

    /// Number of threads to run in parallel
    #[arg(short, long, default_value_t = 2)]
    threads: usize,
}

fn output_path(dump_path: &Path, suffix: &str) -> Result<PathBuf> {
    let mut file_name: OsString = dump_path
        .file_name()
        .ok_or(anyhow!(
            "Unable to take file name: {}",
            dump_path.to_string_lossy()
        ))?
        .to_owned();
    file_name.push(suffix);
    Ok(dump_path.with_file_name(file_name))
}

impl Cli {
    fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new(self.species.iter().copied(), self.cutoff)
            .with_species_key(&self.species_key)
            .with_order(ClusterOrder::BySize)
    }
}

/// Drops atoms of clusters smaller than `min_size`, and atoms outside any
/// cluster.
fn keep_large_clusters(clusterized: &DumpSnapshot, min_size: usize) -> DumpSnapshot {
    let kept = get_cluster_counts(clusterized)
        .into_iter()
        .filter(|&(_, count)| count >= min_size)
        .map(|(id, _)| id)
        .collect::<BTreeSet<_>>();
    let indices = clusterized
        .get_property("cluster")
        .iter()
        .enumerate()
        .filter(|&(_, &label)| kept.contains(&(label as usize)))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    copy_snapshot_with_indices(clusterized, indices.into_iter())
}

fn do_dump_file(dump_path: &Path, cli: &Cli, config: &ClusterConfig) -> Result<()> {
    let timesteps = cli.timestep.map(|step| vec![step]).unwrap_or_default();
    let dump = DumpFile::read(dump_path, &timesteps)?;
    let mut snapshots = Vec::new();
    for snapshot in dump.get_snapshots() {
        let clusterized = clusterize_snapshot(snapshot, config)?;
        info!(
            "{} step {}: {} clusters",
            dump_path.display(),
            snapshot.step,
            get_cluster_counts(&clusterized).len()
        );
        let clusterized = match cli.min_size {
            Some(min_size) => keep_large_clusters(&clusterized, min_size),
            None => clusterized,
        };
        snapshots.push(clusterized);
    }
    let output = output_path(dump_path, &cli.suffix)?;
    DumpFile::new(snapshots).save(&output)?;
    println!("{}", output.to_string_lossy());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.cluster_config();
    config.validate()?;

    let tp = ThreadPoolBuilder::new().num_threads(cli.threads).build()?;
    tp.install(|| {
        cli.dump_files
            .par_iter()
            .map(|dump_path| do_dump_file(dump_path, &cli, &config))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use precipitate_util_rust::DumpReader;
    use std::io::Cursor;

    const DUMP: &str = "ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
6
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id StructureType x y z
1 2 0.5 5 5
2 2 9.6 5 5
3 2 9.0 5 5
4 1 9.3 5 5
5 2 5 2 2
6 0 5 8 8
";

    fn snapshot() -> DumpSnapshot {
        DumpReader::new(Cursor::new(DUMP)).next().unwrap().unwrap()
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/data/run/dump.100"), ".clusters").unwrap();
        assert_eq!(path, PathBuf::from("/data/run/dump.100.clusters"));
        assert!(output_path(Path::new("/"), ".clusters").is_err());
    }

    #[test]
    fn test_species_key_reaches_config() {
        let cli = Cli::parse_from([
            "cluster-dump",
            "dump.0",
            "-s",
            "2",
            "--species-key",
            "StructureType",
            "-c",
            "1.5",
        ]);
        let clusterized = clusterize_snapshot(&snapshot(), &cli.cluster_config()).unwrap();
        assert_eq!(
            clusterized.get_property("cluster"),
            &[1.0, 1.0, 1.0, 0.0, 2.0, 0.0]
        );
    }

    #[test]
    fn test_keep_large_clusters() {
        let config = ClusterConfig::new([2], 1.5)
            .with_species_key("StructureType")
            .with_order(ClusterOrder::BySize);
        let clusterized = clusterize_snapshot(&snapshot(), &config).unwrap();
        let kept = keep_large_clusters(&clusterized, 2);
        assert_eq!(kept.atoms_count, 3);
        assert_eq!(kept.get_property("id"), &[1.0, 2.0, 3.0]);
        assert_eq!(kept.get_property("cluster"), &[1.0, 1.0, 1.0]);
        assert_eq!(keep_large_clusters(&clusterized, 4).atoms_count, 0);
    }
}
