//! A single few-shot episode: support set, query set, episode-local labels.

/// One sampled episode.
///
/// Labels are episode-local, remapped to `0..n_ways` in the order the
/// classes were drawn. Feature rows share a common dimension.
#[derive(Debug, Clone)]
pub struct Episode {
    /// Index of this episode within the run, used for seeding.
    pub index: usize,
    /// Support feature rows, `n_ways * k_shots` of them, grouped by class.
    pub support: Vec<Vec<f32>>,
    /// Episode-local label per support row.
    pub support_labels: Vec<usize>,
    /// Query feature rows, `n_ways * q_queries` of them.
    pub query: Vec<Vec<f32>>,
    /// Episode-local label per query row.
    pub query_labels: Vec<usize>,
}

impl Episode {
    /// Feature dimension, zero for an empty episode.
    pub fn dim(&self) -> usize {
        self.support.first().map_or(0, |r| r.len())
    }

    /// L2-normalize every support and query row in place.
    ///
    /// Zero rows are left unchanged.
    pub fn l2_normalize(&mut self) {
        for row in self.support.iter_mut().chain(self.query.iter_mut()) {
            normalize_row(row);
        }
    }
}

fn normalize_row(row: &mut [f32]) {
    let norm_sq: f32 = row.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in row.iter_mut() {
            *v *= inv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_norm() {
        let mut episode = Episode {
            index: 0,
            support: vec![vec![3.0, 4.0]],
            support_labels: vec![0],
            query: vec![vec![0.0, 5.0]],
            query_labels: vec![0],
        };
        episode.l2_normalize();

        assert!((episode.support[0][0] - 0.6).abs() < 1e-6);
        assert!((episode.support[0][1] - 0.8).abs() < 1e-6);
        assert!((episode.query[0][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_row_unchanged() {
        let mut episode = Episode {
            index: 0,
            support: vec![vec![0.0, 0.0]],
            support_labels: vec![0],
            query: vec![],
            query_labels: vec![],
        };
        episode.l2_normalize();
        assert_eq!(episode.support[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_dim() {
        let episode = Episode {
            index: 3,
            support: vec![vec![1.0, 2.0, 3.0]],
            support_labels: vec![0],
            query: vec![],
            query_labels: vec![],
        };
        assert_eq!(episode.dim(), 3);
    }
}
