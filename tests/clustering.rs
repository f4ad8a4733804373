use assert_float_eq::assert_float_absolute_eq;
use precipitate_util_rust::{
    ClusterConfig, ClusterOrder, Clusterizer, DumpReader, DumpTrajectory, Frame, FrameDriver,
    StatsOptions, SymBox, XYZ,
};
use std::collections::BTreeSet;
use std::io::Cursor;

struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

const LENGTHS: [f64; 3] = [10.0, 12.0, 9.0];
const CUTOFF: f64 = 1.1;

fn cloud(n: usize, seed: u64) -> Vec<XYZ> {
    let mut rng = XorShift(seed);
    (0..n)
        .map(|i| {
            let coords = LENGTHS.map(|l| rng.next_f64() * l);
            XYZ::from(coords, i)
        })
        .collect()
}

fn partition(atoms: &[XYZ], sym_box: &SymBox) -> Vec<Vec<usize>> {
    Clusterizer::new(atoms, sym_box, CUTOFF)
        .unwrap()
        .clusterize()
        .unwrap()
        .partition()
}

#[test]
fn test_partition_is_complete_and_disjoint() {
    let sym_box = SymBox::orthorhombic(LENGTHS).unwrap();
    let atoms = cloud(400, 0x9E37_79B9_7F4A_7C15);
    let clusters = partition(&atoms, &sym_box);
    let mut seen = clusters.iter().flatten().copied().collect::<Vec<_>>();
    seen.sort_unstable();
    assert_eq!(seen, (0..atoms.len()).collect::<Vec<_>>());
    let firsts = clusters.iter().map(|c| c[0]).collect::<Vec<_>>();
    assert!(firsts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_separate_clusters_are_beyond_cutoff() {
    let sym_box = SymBox::orthorhombic(LENGTHS).unwrap();
    let atoms = cloud(300, 42);
    let clusters = partition(&atoms, &sym_box);
    let mut label = vec![0; atoms.len()];
    for (k, cluster) in clusters.iter().enumerate() {
        for &i in cluster {
            label[i] = k;
        }
    }
    for i in 0..atoms.len() {
        for j in i + 1..atoms.len() {
            if label[i] != label[j] {
                assert!(sym_box.distance(&atoms[i], &atoms[j]) > CUTOFF);
            }
        }
    }
}

#[test]
fn test_translation_invariance() {
    let sym_box = SymBox::orthorhombic(LENGTHS).unwrap();
    let atoms = cloud(300, 7);
    let shift = nalgebra::Vector3::new(3.3, -7.1, 25.0);
    let moved = atoms
        .iter()
        .map(|xyz| XYZ::with_point(sym_box.wrap(xyz.point() + shift), xyz.index()))
        .collect::<Vec<_>>();
    assert_eq!(partition(&atoms, &sym_box), partition(&moved, &sym_box));
}

#[test]
fn test_unwrapped_input_matches_wrapped() {
    let sym_box = SymBox::orthorhombic(LENGTHS).unwrap();
    let atoms = cloud(200, 99);
    let far = atoms
        .iter()
        .map(|xyz| {
            let image = nalgebra::Vector3::new(2.0 * LENGTHS[0], -3.0 * LENGTHS[1], LENGTHS[2]);
            XYZ::with_point(xyz.point() + image, xyz.index())
        })
        .collect::<Vec<_>>();
    assert_eq!(partition(&atoms, &sym_box), partition(&far, &sym_box));
}

#[test]
fn test_permutation_invariance_and_determinism() {
    let sym_box = SymBox::orthorhombic(LENGTHS).unwrap();
    let atoms = cloud(300, 1234);
    let mut shuffled = atoms.clone();
    shuffled.reverse();
    shuffled.rotate_left(17);
    let expected = partition(&atoms, &sym_box);
    assert_eq!(expected, partition(&shuffled, &sym_box));
    assert_eq!(expected, partition(&atoms, &sym_box));
}

#[test]
fn test_tiny_box_matches_brute_force_connectivity() {
    // Box shorter than twice the cutoff on two axes.
    let sym_box = SymBox::orthorhombic([2.0, 2.0, 20.0]).unwrap();
    let atoms = [
        [0.1, 0.1, 0.2],
        [1.9, 1.9, 0.7],
        [1.0, 1.0, 10.0],
        [0.2, 1.0, 10.5],
        [0.1, 0.1, 19.8],
    ]
    .iter()
    .enumerate()
    .map(|(i, &c)| XYZ::from(c, i))
    .collect::<Vec<_>>();
    assert_eq!(
        partition(&atoms, &sym_box),
        vec![vec![0, 1, 4], vec![2, 3]]
    );
}

const DUMP: &str = "ITEM: TIMESTEP
500
ITEM: NUMBER OF ATOMS
6
ITEM: BOX BOUNDS pp pp pp
0.0 10.0
0.0 10.0
0.0 10.0
ITEM: ATOMS id type x y z
1 2 0.5 5.0 5.0
2 2 9.6 5.0 5.0
3 1 9.0 5.0 5.0
4 2 5.0 5.0 5.0
5 2 5.0 6.0 5.0
6 2 5.0 7.0 5.0
";

#[test]
fn test_dump_to_statistics() {
    let snapshot = DumpReader::new(Cursor::new(DUMP)).next().unwrap().unwrap();
    let frame = Frame::from_snapshot(&snapshot, "type").unwrap();
    let config = ClusterConfig::new([2], 1.5)
        .with_order(ClusterOrder::BySize)
        .with_stats(StatsOptions {
            centroid: true,
            gyration: true,
            reference_volume: Some(10.0),
        });
    let driver = FrameDriver::new(config).unwrap();
    let result = driver.process_frame(0, &frame).unwrap();
    assert_eq!(result.summary.step, 500);
    assert_eq!(result.summary.candidates, 5);
    let sizes = result.stats.iter().map(|s| s.size).collect::<Vec<_>>();
    assert_eq!(sizes, vec![3, 2]);
    let pair = &result.stats[1];
    assert_eq!(pair.first_atom, 0);
    let centroid = pair.centroid.unwrap();
    assert_float_absolute_eq!(centroid.x, 0.05, 1e-9);
    assert_float_absolute_eq!(pair.radius_of_gyration.unwrap(), 0.45, 1e-9);
    let line = &result.stats[0];
    assert_float_absolute_eq!(line.centroid.unwrap().y, 6.0, 1e-9);
    assert!(line.equivalent_radius.unwrap() > pair.equivalent_radius.unwrap());
}

#[test]
fn test_species_outside_selection_never_cluster() {
    let snapshot = DumpReader::new(Cursor::new(DUMP)).next().unwrap().unwrap();
    let frame = Frame::from_snapshot(&snapshot, "type").unwrap();
    let atoms = frame.candidates(&BTreeSet::from([1]));
    let clusters = Clusterizer::new(&atoms, &frame.sym_box, 1.5)
        .unwrap()
        .clusterize()
        .unwrap();
    assert_eq!(clusters.partition(), vec![vec![2]]);
}

#[test]
fn test_trajectory_from_files() {
    let dir = std::env::temp_dir().join(format!("precipitate-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let first = dir.join("dump.0");
    let second = dir.join("dump.1");
    std::fs::write(&first, DUMP).unwrap();
    std::fs::write(&second, DUMP.replace("500", "1000")).unwrap();

    let mut trajectory = DumpTrajectory::new([first, second], "type");
    let driver = FrameDriver::new(ClusterConfig::new([2], 1.5).with_min_size(2)).unwrap();
    let report = driver.run(&mut trajectory).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    let steps = report
        .frames
        .iter()
        .map(|f| f.summary.step)
        .collect::<Vec<_>>();
    assert_eq!(steps, vec![500, 1000]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.distribution.frequency(2), 2);
    assert_eq!(report.distribution.frequency(3), 2);
    assert_float_absolute_eq!(report.frames[0].summary.mean_size, 2.5, 1e-12);
}
