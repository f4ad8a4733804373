use crate::cluster_stats::{sort_stats, ClusterStats, StatsOptions};
use crate::config::{ClusterConfig, ClusterOrder};
use crate::disjoint_set::DisjointSet;
use crate::dump_snapshot::DumpSnapshot;
use crate::error::{ClusterError, ClusterResult};
use crate::frame::Frame;
use crate::neighbor_index::NeighborIndex;
use crate::pbc::SymBox;
use crate::xyz::XYZ;
use log::debug;
use nalgebra::Vector3;
use std::collections::{HashMap, VecDeque};

/// One connected component. Indices point into the atoms slice the
/// clusterizer was built on.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<usize>,
    links: Vec<(usize, usize)>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Edges that merged two sets during assembly; a spanning tree of the
    /// cluster.
    pub fn links(&self) -> &[(usize, usize)] {
        &self.links
    }
}

/// Partition of candidate atoms into clusters, ordered by smallest atom id.
pub struct Clusters<'a> {
    atoms: &'a [XYZ],
    sym_box: &'a SymBox,
    clusters: Vec<Cluster>,
}

/// Merges atoms within `cutoff` of each other (minimum image) into clusters.
pub struct Clusterizer<'a> {
    atoms: &'a [XYZ],
    sym_box: &'a SymBox,
    cutoff: f64,
}

impl<'a> Clusterizer<'a> {
    pub fn new(atoms: &'a [XYZ], sym_box: &'a SymBox, cutoff: f64) -> ClusterResult<Self> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(ClusterError::InvalidCutoff(cutoff));
        }
        sym_box.validate()?;
        Ok(Self {
            atoms,
            sym_box,
            cutoff,
        })
    }

    pub fn clusterize(&self) -> ClusterResult<Clusters<'a>> {
        let points = self.atoms.iter().map(|xyz| xyz.point()).collect::<Vec<_>>();
        let index = NeighborIndex::build(&points, self.sym_box, self.cutoff)?;
        let mut set = DisjointSet::new(points.len());
        let mut links = Vec::new();
        index.for_each_pair(|i, j| {
            if set.union(i, j) {
                links.push((i, j));
            }
        });

        let groups = set.groups();
        let mut slot = vec![usize::MAX; points.len()];
        for (k, group) in groups.iter().enumerate() {
            slot[set.find(group[0])] = k;
        }
        let mut clusters = groups
            .into_iter()
            .map(|members| Cluster {
                members,
                links: Vec::new(),
            })
            .collect::<Vec<_>>();
        for (i, j) in links {
            clusters[slot[set.find(i)]].links.push((i, j));
        }
        for cluster in clusters.iter_mut() {
            cluster.members.sort_by_key(|&m| self.atoms[m].index());
        }
        clusters.sort_by_key(|cluster| self.atoms[cluster.members[0]].index());
        debug!(
            "{} atoms in {} clusters, {} links",
            points.len(),
            clusters.len(),
            points.len() - clusters.len()
        );
        Ok(Clusters {
            atoms: self.atoms,
            sym_box: self.sym_box,
            clusters,
        })
    }
}

impl<'a> Clusters<'a> {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    pub fn get(&self, k: usize) -> Option<&Cluster> {
        self.clusters.get(k)
    }

    /// Atom ids of cluster `k`, ascending.
    pub fn atom_ids(&self, k: usize) -> Vec<usize> {
        self.clusters[k]
            .members
            .iter()
            .map(|&m| self.atoms[m].index())
            .collect()
    }

    /// Atom ids of every cluster.
    pub fn partition(&self) -> Vec<Vec<usize>> {
        (0..self.len()).map(|k| self.atom_ids(k)).collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(Cluster::len).collect()
    }

    /// Cluster indices in the requested order.
    pub fn ordered(&self, order: ClusterOrder) -> Vec<usize> {
        let mut ordered = (0..self.len()).collect::<Vec<_>>();
        if order == ClusterOrder::BySize {
            ordered.sort_by(|&a, &b| {
                let (size_a, size_b) = (self.clusters[a].len(), self.clusters[b].len());
                size_b.cmp(&size_a).then(a.cmp(&b))
            });
        }
        ordered
    }

    /// Positions of cluster `k`, in member order, moved into one periodic
    /// image. Walks the merge tree from the member with the smallest atom id,
    /// placing each atom at the minimum-image offset from the atom it was
    /// merged through. Frame positions are left untouched.
    pub fn unwrapped(&self, k: usize) -> Vec<Vector3<f64>> {
        let cluster = &self.clusters[k];
        let slot = cluster
            .members
            .iter()
            .enumerate()
            .map(|(s, &m)| (m, s))
            .collect::<HashMap<_, _>>();
        let mut adjacency = vec![Vec::new(); cluster.len()];
        for (i, j) in &cluster.links {
            let (a, b) = (slot[i], slot[j]);
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        let mut positions = vec![self.atoms[cluster.members[0]].point(); cluster.len()];
        let mut visited = vec![false; cluster.len()];
        let mut queue = VecDeque::from([0]);
        visited[0] = true;
        while let Some(a) = queue.pop_front() {
            let from = &self.atoms[cluster.members[a]];
            for &b in &adjacency[a] {
                if visited[b] {
                    continue;
                }
                visited[b] = true;
                let to = &self.atoms[cluster.members[b]];
                positions[b] = positions[a] + self.sym_box.delta(from, to);
                queue.push_back(b);
            }
        }
        positions
    }

    pub fn cluster_stats(&self, k: usize, options: &StatsOptions) -> ClusterStats {
        let positions = options.needs_positions().then(|| self.unwrapped(k));
        ClusterStats::compute(
            self.clusters[k].len(),
            self.atoms[self.clusters[k].members[0]].index(),
            positions.as_deref(),
            self.sym_box,
            options,
        )
    }

    pub fn statistics(&self, options: &StatsOptions, order: ClusterOrder) -> Vec<ClusterStats> {
        let mut records = (0..self.len())
            .map(|k| self.cluster_stats(k, options))
            .collect::<Vec<_>>();
        sort_stats(&mut records, order);
        records
    }
}

/// Copy of `snapshot` with a `cluster` column: 1-based cluster labels in the
/// configured order, 0 for atoms outside the precipitate species.
pub fn clusterize_snapshot(
    snapshot: &DumpSnapshot,
    config: &ClusterConfig,
) -> ClusterResult<DumpSnapshot> {
    config.validate()?;
    let frame = Frame::from_snapshot(snapshot, &config.species_key)?;
    let atoms = frame.candidates(&config.species);
    let clusters = Clusterizer::new(&atoms, &frame.sym_box, config.cutoff)?.clusterize()?;
    let mut output = snapshot.clone();
    let cluster_j = output.add_property("cluster");
    for i in 0..output.atoms_count {
        output.set_atom_value(cluster_j, i, 0.0);
    }
    for (label, k) in clusters.ordered(config.order).into_iter().enumerate() {
        for atom_id in clusters.atom_ids(k) {
            output.set_atom_value(cluster_j, atom_id, (label + 1) as f64);
        }
    }
    Ok(output)
}

/// Atom count per cluster label of a clusterized snapshot.
pub fn get_cluster_counts(snapshot: &DumpSnapshot) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    if let Some(labels) = snapshot.try_get_property("cluster") {
        for &label in labels.iter().filter(|&&label| label > 0.0) {
            counts
                .entry(label as usize)
                .and_modify(|c| *c += 1)
                .or_insert(1);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump_file::DumpParsingError;
    use assert_float_eq::assert_float_absolute_eq;

    fn atoms(coords: &[[f64; 3]]) -> Vec<XYZ> {
        coords
            .iter()
            .enumerate()
            .map(|(i, &c)| XYZ::from(c, i))
            .collect()
    }

    fn partition(coords: &[[f64; 3]], lengths: [f64; 3], cutoff: f64) -> Vec<Vec<usize>> {
        let sym_box = SymBox::orthorhombic(lengths).unwrap();
        let atoms = atoms(coords);
        Clusterizer::new(&atoms, &sym_box, cutoff)
            .unwrap()
            .clusterize()
            .unwrap()
            .partition()
    }

    #[test]
    fn test_pair_across_boundary() {
        let clusters = partition(&[[0.5, 5.0, 5.0], [9.6, 5.0, 5.0]], [10.0; 3], 1.5);
        assert_eq!(clusters, vec![vec![0, 1]]);
    }

    #[test]
    fn test_pair_too_far() {
        let clusters = partition(&[[0.5, 5.0, 5.0], [5.0, 5.0, 5.0]], [10.0; 3], 1.5);
        assert_eq!(clusters, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_chain() {
        let chain = (0..5).map(|i| [2.0 + i as f64, 5.0, 5.0]).collect::<Vec<_>>();
        assert_eq!(partition(&chain, [10.0; 3], 1.2), vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn test_empty() {
        assert!(partition(&[], [10.0; 3], 1.5).is_empty());
    }

    #[test]
    fn test_invalid_cutoff_fails_fast() {
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        assert!(matches!(
            Clusterizer::new(&[], &sym_box, -1.0),
            Err(ClusterError::InvalidCutoff(_))
        ));
    }

    #[test]
    fn test_unwrapped_long_chain() {
        // 8 atoms spaced 1.0 around a 10 A box, longer than half the box
        let coords = (0..8)
            .map(|i| [(7.0 + i as f64) % 10.0, 5.0, 5.0])
            .collect::<Vec<_>>();
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        let atoms = atoms(&coords);
        let clusters = Clusterizer::new(&atoms, &sym_box, 1.2)
            .unwrap()
            .clusterize()
            .unwrap();
        assert_eq!(clusters.len(), 1);
        let cluster = clusters.get(0).unwrap();
        assert_eq!(cluster.members(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(cluster.links().len(), 7);
        let unwrapped = clusters.unwrapped(0);
        for (i, p) in unwrapped.iter().enumerate() {
            assert_float_absolute_eq!(p.x, 7.0 + i as f64, 1e-9);
        }
        let stats = clusters.cluster_stats(
            0,
            &StatsOptions {
                centroid: true,
                gyration: true,
                reference_volume: None,
            },
        );
        assert_float_absolute_eq!(stats.centroid.unwrap().x, 0.5, 1e-9);
        assert_float_absolute_eq!(stats.radius_of_gyration.unwrap(), 5.25_f64.sqrt(), 1e-9);
    }

    #[test]
    fn test_ordered_by_size() {
        let coords = [
            [1.0, 1.0, 1.0],
            [5.0, 5.0, 5.0],
            [5.5, 5.0, 5.0],
            [1.0, 8.0, 1.0],
            [1.0, 8.5, 1.0],
            [1.0, 9.0, 1.0],
        ];
        let sym_box = SymBox::orthorhombic([10.0; 3]).unwrap();
        let atoms = atoms(&coords);
        let clusters = Clusterizer::new(&atoms, &sym_box, 0.8)
            .unwrap()
            .clusterize()
            .unwrap();
        assert_eq!(clusters.sizes(), vec![1, 2, 3]);
        assert_eq!(clusters.ordered(ClusterOrder::BySize), vec![2, 1, 0]);
        let stats = clusters.statistics(&StatsOptions::default(), ClusterOrder::BySize);
        let sizes = stats.iter().map(|s| s.size).collect::<Vec<_>>();
        assert_eq!(sizes, vec![3, 2, 1]);
        assert_eq!(stats[0].first_atom, 3);
    }

    #[test]
    fn test_clusterize_snapshot() {
        let body = "ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type x y z
1 1 0.5 5 5
2 2 9.8 5 5
3 1 9.6 5 5
4 1 5 5 5
";
        let mut lines = body.lines().map(|l| Ok::<_, DumpParsingError>(l.to_string()));
        let snapshot = DumpSnapshot::read(&mut lines, 0, 4).unwrap();
        let config = ClusterConfig::new([1], 1.5).with_order(ClusterOrder::BySize);
        let output = clusterize_snapshot(&snapshot, &config).unwrap();
        assert_eq!(output.get_property("cluster"), &[1.0, 0.0, 1.0, 2.0]);
        let counts = get_cluster_counts(&output);
        assert_eq!(counts, HashMap::from([(1, 2), (2, 1)]));
    }
}
