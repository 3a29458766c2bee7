//! 2D positions for the visible clusters.
//!
//! Cluster centroids are projected onto their first two principal components
//! (thin SVD of the centred centroid matrix). Degenerate inputs (non-finite
//! values, no variance, a failed decomposition) fall back to seeded jitter, so
//! a layout always exists.

use faer::Mat;
use rand::prelude::*;
use serde::Serialize;

const TOL: f64 = 1e-10;

/// How positions were computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMethod {
    /// Principal component projection of the centroids.
    Pca,
    /// Seeded random positions.
    Jitter,
}

/// Positions in `[-1, 1]^2`, one per centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// `[x, y]` per cluster.
    pub positions: Vec<[f64; 2]>,
    /// Method used.
    pub method: LayoutMethod,
}

/// Lay out `centroids` (all of one dimension).
pub fn layout(centroids: &[Vec<f64>], seed: u64) -> Layout {
    match pca_2d(centroids) {
        Some(positions) => Layout {
            positions,
            method: LayoutMethod::Pca,
        },
        None => {
            log::warn!("PCA layout failed for {} clusters, using jitter", centroids.len());
            Layout {
                positions: jitter(centroids.len(), seed),
                method: LayoutMethod::Jitter,
            }
        }
    }
}

/// Seeded random positions in `[-1, 1]^2`.
pub fn jitter(n: usize, seed: u64) -> Vec<[f64; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0)])
        .collect()
}

fn pca_2d(centroids: &[Vec<f64>]) -> Option<Vec<[f64; 2]>> {
    let n = centroids.len();
    match n {
        0 => return Some(Vec::new()),
        1 => return Some(vec![[0.0, 0.0]]),
        _ => {}
    }
    let dim = centroids[0].len();
    if dim == 0 || centroids.iter().any(|c| c.len() != dim || c.iter().any(|v| !v.is_finite())) {
        return None;
    }

    let mut x = Mat::<f64>::zeros(n, dim);
    for j in 0..dim {
        let mean = centroids.iter().map(|c| c[j]).sum::<f64>() / n as f64;
        for (i, c) in centroids.iter().enumerate() {
            x[(i, j)] = c[j] - mean;
        }
    }

    let svd = match x.thin_svd() {
        Ok(svd) => svd,
        Err(e) => {
            log::debug!("thin SVD of {n}x{dim} centroids failed: {e:?}");
            return None;
        }
    };
    let s = svd.S().column_vector();
    let (u, v) = (svd.U(), svd.V());
    if !s[0].is_finite() || s[0] <= TOL {
        return None;
    }

    // Score of row i on component k is U[i, k] * S[k]. A second component may
    // not exist (one-dimensional input or spread).
    let component = |k: usize| -> Vec<f64> {
        if k >= s.nrows() || s[k] <= TOL * s[0] {
            return vec![0.0; n];
        }
        // Sign convention: largest loading positive.
        let pivot = (0..dim).map(|j| v[(j, k)]).max_by(|a, b| a.abs().total_cmp(&b.abs()));
        let sign = if pivot.unwrap_or(0.0) < 0.0 { -1.0 } else { 1.0 };
        (0..n).map(|i| sign * u[(i, k)] * s[k]).collect()
    };
    let (first, second) = (component(0), component(1));
    let mut positions: Vec<[f64; 2]> = first.into_iter().zip(second).map(|(a, b)| [a, b]).collect();

    let scale = positions
        .iter()
        .flat_map(|p| p.iter().map(|v| v.abs()))
        .fold(0.0f64, f64::max);
    if !scale.is_finite() || scale <= TOL {
        return None;
    }
    for p in &mut positions {
        p[0] /= scale;
        p[1] /= scale;
    }
    Some(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pca_separates_along_main_axis() {
        let centroids = vec![vec![0.0, 0.0, 0.0], vec![10.0, 0.1, 0.0], vec![20.0, -0.1, 0.0]];
        let out = layout(&centroids, 0);
        assert_eq!(out.method, LayoutMethod::Pca);
        let xs: Vec<f64> = out.positions.iter().map(|p| p[0]).collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2] || xs[0] > xs[1] && xs[1] > xs[2]);
        assert!(out.positions.iter().all(|p| p[0].abs() <= 1.0 + 1e-9 && p[1].abs() <= 1.0 + 1e-9));
    }

    #[test]
    fn test_identical_centroids_fall_back_to_jitter() {
        let centroids = vec![vec![1.0, 1.0]; 3];
        let out = layout(&centroids, 7);
        assert_eq!(out.method, LayoutMethod::Jitter);
        assert_eq!(out.positions, jitter(3, 7));
    }

    #[test]
    fn test_non_finite_falls_back() {
        let centroids = vec![vec![0.0, f64::NAN], vec![1.0, 1.0]];
        assert_eq!(layout(&centroids, 1).method, LayoutMethod::Jitter);
    }

    #[test]
    fn test_trivial_sizes() {
        assert!(layout(&[], 0).positions.is_empty());
        assert_eq!(layout(&[vec![3.0, 4.0]], 0).positions, vec![[0.0, 0.0]]);
    }

    #[test]
    fn test_collinear_centroids_have_flat_second_axis() {
        let centroids = vec![vec![0.0, 0.0], vec![1.0, 2.0], vec![3.0, 6.0]];
        let out = layout(&centroids, 0);
        assert_eq!(out.method, LayoutMethod::Pca);
        assert!(out.positions.iter().all(|p| p[1].abs() < 1e-9));
        assert!((out.positions.iter().map(|p| p[0].abs()).fold(0.0, f64::max) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_is_seeded() {
        assert_eq!(jitter(5, 3), jitter(5, 3));
        assert_ne!(jitter(5, 3), jitter(5, 4));
    }
}
