use anyhow::Result;
use clap::{Parser, ValueEnum};
use itertools::Itertools;
use log::warn;
use precipitate_util_rust::{
    ClusterConfig, ClusterOrder, DriverReport, DumpTrajectory, FrameDriver, FrameSelection,
    StatsOptions, math::linear_regression,
};
use std::path::PathBuf;

mod metadata;
mod plot;
use metadata::{HeaderScanner, Metadata};
use plot::{SeriesPoint, plot_time_series};

/// Matches the `# t= <seconds> ... dose : <dpa>` line heading each dump.
const HEADER_PATTERN: &str = r"t=\s*([\d.]+).*dose\s*:\s*([\d.]+)";

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    /// By smallest atom id
    FirstAtom,
    /// By number of atoms, largest first
    Size,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// LAMMPS dump files, processed in the given order
    #[arg(required = true)]
    dump_files: Vec<PathBuf>,

    /// Precipitate species "<tag 1>,<tag 2>,...", ex. "2,3"
    #[arg(short, long, value_delimiter = ',', required = true)]
    species: Vec<usize>,

    /// Per-atom column holding the species tag, ex. "StructureType"
    #[arg(long, default_value = "type")]
    species_key: String,

    /// Cluster cutoff radius (A)
    #[arg(short, long, default_value_t = 10.0)]
    cutoff: f64,

    /// Smallest cluster counted as a precipitate (atoms)
    #[arg(short, long, default_value_t = 10)]
    min_size: usize,

    /// Order of per-cluster records
    #[arg(long, value_enum, default_value_t = Order::Size)]
    order: Order,

    /// Volume per atom (A^3); adds equivalent sphere radii
    #[arg(long)]
    reference_volume: Option<f64>,

    /// Report cluster centers of mass
    #[arg(long)]
    centroid: bool,

    /// Report radii of gyration and gyration tensor moments
    #[arg(long)]
    gyration: bool,

    /// Print per-cluster records of every frame
    #[arg(long)]
    clusters: bool,

    /// First frame to process
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Stop before this frame
    #[arg(long)]
    stop: Option<usize>,

    /// Process every N-th frame
    #[arg(long, default_value_t = 1)]
    step: usize,

    /// Process at most this many frames
    #[arg(long)]
    max_frames: Option<usize>,

    /// Number of threads to run in parallel
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Pattern with two groups grabbing time and dose from a dump file
    #[arg(long, default_value = HEADER_PATTERN)]
    header_pattern: String,

    /// Factor applied to times (seconds to days by default)
    #[arg(long, default_value_t = 1.157e-5)]
    time_scale: f64,

    /// Bin width of the size distribution table
    #[arg(long, default_value_t = 1)]
    bin_width: usize,

    /// Where to save the time series plot (SVG)
    #[arg(short, long)]
    plot: Option<PathBuf>,

    /// Number of error bars drawn on the mean size curve
    #[arg(long, default_value_t = 10)]
    error_bars: usize,
}

impl Cli {
    fn cluster_config(&self) -> ClusterConfig {
        let order = match self.order {
            Order::FirstAtom => ClusterOrder::ByFirstAtom,
            Order::Size => ClusterOrder::BySize,
        };
        let mut config = ClusterConfig::new(self.species.iter().copied(), self.cutoff)
            .with_species_key(&self.species_key)
            .with_min_size(self.min_size)
            .with_order(order)
            .with_stats(StatsOptions {
                centroid: self.centroid,
                gyration: self.gyration,
                reference_volume: self.reference_volume,
            })
            .with_frames(FrameSelection {
                start: self.start,
                stop: self.stop,
                step: self.step,
            });
        if let Some(max_frames) = self.max_frames {
            config = config.with_max_frames(max_frames);
        }
        config
    }
}

struct Row {
    index: usize,
    step: Option<u64>,
    time: f64,
    dose: f64,
    precipitates: f64,
    mean: f64,
    std: f64,
}

fn get_rows(report: &DriverReport, scanner: &mut HeaderScanner, time_scale: f64) -> Vec<Row> {
    let mut metadata_of = |source: Option<&PathBuf>| match source {
        Some(path) => scanner.scan(path).unwrap_or_else(|err| {
            warn!("No time and dose for {}: {err:#}", path.display());
            Metadata::UNKNOWN
        }),
        None => Metadata::UNKNOWN,
    };
    report
        .timeline()
        .into_iter()
        .map(|entry| match entry {
            Ok(frame) => {
                let summary = &frame.summary;
                let metadata = metadata_of(summary.source.as_ref());
                Row {
                    index: summary.index,
                    step: Some(summary.step),
                    time: metadata.time * time_scale,
                    dose: metadata.dose,
                    precipitates: summary.precipitates as f64,
                    mean: summary.mean_size,
                    std: summary.std_size,
                }
            }
            Err(skipped) => Row {
                index: skipped.index,
                step: skipped.step,
                time: f64::NAN,
                dose: f64::NAN,
                precipitates: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
            },
        })
        .collect()
}

fn print_time_series(rows: &[Row], regression: Option<(f64, f64)>) {
    match regression {
        Some((intercept, slope)) => println!("# dose = {intercept} + {slope} * time"),
        None => println!("# dose regression unavailable"),
    }
    println!("# frame timestep time dose precipitates mean_size std_size");
    for row in rows {
        let step = row
            .step
            .map_or_else(|| "NaN".to_string(), |step| step.to_string());
        let values = [row.time, row.dose, row.precipitates, row.mean, row.std]
            .iter()
            .join(" ");
        println!("{} {step} {values}", row.index);
    }
}

fn print_distribution(report: &DriverReport, bin_width: usize) {
    println!("# size count");
    for (size, count) in report.distribution.histogram(bin_width) {
        println!("{size} {count}");
    }
}

fn print_clusters(report: &DriverReport) {
    println!("# frame timestep size first_atom cx cy cz rg l1 l2 l3 r_eq");
    let nan = f64::NAN;
    for frame in &report.frames {
        for record in &frame.stats {
            let centroid = record.centroid.map_or([nan; 3], |c| [c.x, c.y, c.z]);
            let moments = record.gyration_moments.map_or([nan; 3], |m| [m.x, m.y, m.z]);
            let values = centroid
                .into_iter()
                .chain([record.radius_of_gyration.unwrap_or(nan)])
                .chain(moments)
                .chain([record.equivalent_radius.unwrap_or(nan)])
                .join(" ");
            println!(
                "{} {} {} {} {values}",
                frame.summary.index, frame.summary.step, record.size, record.first_atom
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut scanner = HeaderScanner::new(&cli.header_pattern)?;
    let driver = FrameDriver::new(cli.cluster_config())?;

    let mut trajectory =
        DumpTrajectory::new(cli.dump_files.iter().cloned(), &cli.species_key).with_frame_count();
    let report = if cli.threads > 1 {
        driver.run_parallel(&mut trajectory, cli.threads)?
    } else {
        driver.run(&mut trajectory)?
    };

    let rows = get_rows(&report, &mut scanner, cli.time_scale);
    let time_dose = rows
        .iter()
        .filter(|row| row.time.is_finite() && row.dose.is_finite())
        .map(|row| (row.time, row.dose))
        .collect::<Vec<_>>();
    let regression = linear_regression(&time_dose);
    print_time_series(&rows, regression);
    println!();
    print_distribution(&report, cli.bin_width);
    if cli.clusters {
        println!();
        print_clusters(&report);
    }

    if let Some(plot_path) = &cli.plot {
        let timed = rows.iter().any(|row| row.time.is_finite());
        let points = rows
            .iter()
            .map(|row| SeriesPoint {
                x: match (timed, row.step) {
                    (true, _) => row.time,
                    (false, Some(step)) if row.precipitates.is_finite() => step as f64,
                    _ => f64::NAN,
                },
                precipitates: row.precipitates,
                mean: row.mean,
                std: row.std,
            })
            .collect::<Vec<_>>();
        let caption = regression
            .map(|(intercept, slope)| format!("dose = {intercept:.4e} + {slope:.4e} * time"));
        let x_label = if timed { "time (days)" } else { "timestep" };
        plot_time_series(
            plot_path,
            &points,
            x_label,
            caption.as_deref(),
            cli.error_bars,
        )?;
    }
    Ok(())
}
