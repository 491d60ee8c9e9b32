//! Local snapshot of the edge-hit map and its summaries.

use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use serde::Serialize;

/// Thresholds (in hit edges) for the qualitative coverage status.
const LOW_EDGES: usize = 100;
const GOOD_EDGES: usize = 1000;

/// A fixed-size byte counter per edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMap {
    bytes: Vec<u8>,
}

/// One edge and its hit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeHits {
    pub edge: usize,
    pub hits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    None,
    Low,
    Moderate,
    Good,
}

impl CoverageStatus {
    fn from_hit_edges(hit_edges: usize) -> Self {
        match hit_edges {
            0 => Self::None,
            n if n < LOW_EDGES => Self::Low,
            n if n < GOOD_EDGES => Self::Moderate,
            _ => Self::Good,
        }
    }
}

impl Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::Good => "good",
        };
        f.write_str(text)
    }
}

/// Aggregate view of a coverage snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    pub map_size: usize,
    pub hit_edges: usize,
    pub total_hits: u64,
    pub hottest: Option<EdgeHits>,
    pub avg_hits_per_edge: f64,
    pub coverage_percent: f64,
    pub status: CoverageStatus,
}

impl CoverageSummary {
    pub fn to_human_readable(&self) -> String {
        let mut output = String::new();

        output.push_str("Coverage Summary:\n");
        output.push_str("======================================\n");
        output.push_str(&format!(
            "  Hit edges:    {}/{} ({:.2}%)\n",
            self.hit_edges, self.map_size, self.coverage_percent
        ));
        output.push_str(&format!("  Total hits:   {}\n", self.total_hits));
        if let Some(hottest) = self.hottest {
            output.push_str(&format!(
                "  Hottest edge: {} ({} hits)\n",
                hottest.edge, hottest.hits
            ));
        }
        output.push_str(&format!(
            "  Avg hits:     {:.2} per hit edge\n",
            self.avg_hits_per_edge
        ));
        output.push_str(&format!("  Status:       {}\n", self.status));

        output
    }
}

impl CoverageMap {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Reads a map written by [`CoverageMap::save_snapshot`].
    pub fn load_snapshot(path: &Path) -> std::io::Result<Self> {
        fs::read(path).map(Self::from_bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn zero(&mut self) {
        self.bytes.fill(0);
    }

    /// Nonzero edges in index order.
    pub fn hits(&self) -> impl Iterator<Item = EdgeHits> + '_ {
        self.bytes
            .iter()
            .enumerate()
            .filter(|(_, hits)| **hits != 0)
            .map(|(edge, hits)| EdgeHits { edge, hits: *hits })
    }

    pub fn hit_edges(&self) -> usize {
        self.bytes.iter().filter(|b| **b != 0).count()
    }

    pub fn total_hits(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(*b)).sum()
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut hit_edges = 0usize;
        let mut total_hits = 0u64;
        let mut hottest: Option<EdgeHits> = None;
        for edge in self.hits() {
            hit_edges += 1;
            total_hits += u64::from(edge.hits);
            if hottest.is_none_or(|h| edge.hits > h.hits) {
                hottest = Some(edge);
            }
        }

        let avg_hits_per_edge = if hit_edges == 0 {
            0.0
        } else {
            total_hits as f64 / hit_edges as f64
        };
        let coverage_percent = if self.bytes.is_empty() {
            0.0
        } else {
            hit_edges as f64 * 100.0 / self.bytes.len() as f64
        };

        CoverageSummary {
            map_size: self.bytes.len(),
            hit_edges,
            total_hits,
            hottest,
            avg_hits_per_edge,
            coverage_percent,
            status: CoverageStatus::from_hit_edges(hit_edges),
        }
    }

    /// The `n` hottest edges, highest count first; ties by edge index.
    pub fn top_edges(&self, n: usize) -> Vec<EdgeHits> {
        let mut edges: Vec<EdgeHits> = self.hits().collect();
        edges.sort_by(|a, b| b.hits.cmp(&a.hits).then(a.edge.cmp(&b.edge)));
        edges.truncate(n);
        edges
    }

    /// Writes the raw map to `path`.
    pub fn save_snapshot(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(size: usize, hits: &[(usize, u8)]) -> CoverageMap {
        let mut map = CoverageMap::new(size);
        for (edge, count) in hits {
            map.as_mut_slice()[*edge] = *count;
        }
        map
    }

    #[test]
    fn empty_map_summary() {
        let summary = CoverageMap::new(1024).summary();
        assert_eq!(summary.hit_edges, 0);
        assert_eq!(summary.total_hits, 0);
        assert_eq!(summary.hottest, None);
        assert_eq!(summary.avg_hits_per_edge, 0.0);
        assert_eq!(summary.status, CoverageStatus::None);
    }

    #[test]
    fn summary_counts_hits() {
        let summary = map_with(200, &[(3, 10), (50, 2), (199, 255)]).summary();
        assert_eq!(summary.hit_edges, 3);
        assert_eq!(summary.total_hits, 267);
        assert_eq!(summary.hottest, Some(EdgeHits { edge: 199, hits: 255 }));
        assert!((summary.avg_hits_per_edge - 89.0).abs() < 1e-9);
        assert!((summary.coverage_percent - 1.5).abs() < 1e-9);
        assert_eq!(summary.status, CoverageStatus::Low);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(CoverageStatus::from_hit_edges(99), CoverageStatus::Low);
        assert_eq!(CoverageStatus::from_hit_edges(100), CoverageStatus::Moderate);
        assert_eq!(CoverageStatus::from_hit_edges(999), CoverageStatus::Moderate);
        assert_eq!(CoverageStatus::from_hit_edges(1000), CoverageStatus::Good);
    }

    #[test]
    fn top_edges_orders_by_hits() {
        let map = map_with(16, &[(1, 4), (2, 9), (3, 4), (4, 1)]);
        let top = map.top_edges(3);
        assert_eq!(
            top,
            vec![
                EdgeHits { edge: 2, hits: 9 },
                EdgeHits { edge: 1, hits: 4 },
                EdgeHits { edge: 3, hits: 4 },
            ]
        );
        assert_eq!(map.top_edges(100).len(), 4);
    }

    #[test]
    fn snapshot_is_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots/cov.bin");
        let map = map_with(8, &[(0, 1), (7, 2)]);
        map.save_snapshot(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(CoverageMap::load_snapshot(&path).unwrap(), map);
    }

    #[test]
    fn human_readable_mentions_status() {
        let text = map_with(8, &[(0, 1)]).summary().to_human_readable();
        assert!(text.contains("Hit edges:    1/8"));
        assert!(text.contains("Status:       low"));
    }
}
