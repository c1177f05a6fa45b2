use crate::error::ClusterError;
use ball_tree::{BallTree, Point};
use log::info;
use ndarray::parallel::prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use ndarray::{Array2, ArrayView2, Axis};

#[derive(PartialEq)]
struct Pt(Vec<f64>);

impl Point for Pt {
    fn distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|p| (p.1 - p.0).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn move_towards(&self, other: &Self, d: f64) -> Self {
        let total_dist = self.distance(other);
        let frac = if total_dist == 0.0 { 0.0 } else { d / total_dist };

        Pt(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(&s, &o)| s + frac * (o - s))
            .collect())
    }
}

/// Check that `k` neighbors can be drawn for each of `events` events: `1 <= k <= events - 2`.
pub fn check_k(k: usize, events: usize) -> Result<(), ClusterError> {
    if k == 0 || k + 2 > events || events > u32::MAX as usize {
        return Err(ClusterError::InvalidK { k, events });
    }
    Ok(())
}

/// Compute the `k` nearest neighbors of each row in `v`, using Euclidean distance. Each row represents a n-dimensional
/// vector where n is the number of columns in `v`. Row `i` of the output lists the neighbors of event `i` from nearest
/// to farthest, never including `i` itself. Ties are broken by the ball tree's traversal order, which is fixed for a
/// given input.
pub fn knn(v: &ArrayView2<f64>, k: usize) -> Result<Array2<u32>, ClusterError> {
    let (cells, _) = v.dim();
    check_k(k, cells)?;

    let points = v.outer_iter().map(|row| Pt(row.to_vec())).collect::<Vec<_>>();
    let values = (0..cells).collect::<Vec<usize>>();

    info!("constructing ball tree of {} points", cells);
    let ball_tree = BallTree::new(points, values);

    info!("querying points for {} neighbors", k);
    let mut output = Array2::from_elem((cells, k), u32::MAX);
    output.axis_iter_mut(Axis(0)).into_par_iter().enumerate().for_each_init(
        || ball_tree.query(),
        |query, (cell, mut output)| {
            let mut ind = 0;
            let pt = Pt(v.row(cell).to_vec());
            for (_, _, &v) in query.nn(&pt).take(k + 1) {
                if v != cell && ind < k {
                    output[ind] = v as u32;
                    ind += 1;
                }
            }
        },
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;
    use ndarray_rand::RandomExt;
    use ordered_float::NotNan;
    use rand::SeedableRng;
    use rand_distr::Normal;
    use rand_pcg::Pcg64Mcg;

    fn distance(v1: &[f64], other: &[f64]) -> NotNan<f64> {
        let mut d = 0.0;
        for i in 0..v1.len() {
            d += (other[i] - v1[i]).powi(2);
        }

        NotNan::new(d.sqrt()).unwrap()
    }

    // Basic n^2 knn algorithm, for testing purposes
    fn exhaustive_knn(v: &ArrayView2<f64>, k: usize) -> Array2<u32> {
        let cells = v.shape()[0];
        let mut nns = Vec::new();

        let mut output = Array2::zeros((cells, k));

        for cell in 0..cells {
            nns.clear();
            let my_point = v.row(cell).to_vec();

            for other_cell in 0..cells {
                if cell == other_cell {
                    continue;
                }
                let other_point = v.row(other_cell).to_vec();
                nns.push((distance(&my_point, &other_point), other_cell as u32));
            }

            nns.sort();

            for i in 0..k {
                output[(cell, i)] = nns[i].1
            }
        }

        output
    }

    #[test]
    fn test_knn_matches_exhaustive() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);

        for ncells in [5usize, 50, 100] {
            for d in [1usize, 2, 3, 8, 20] {
                let dist = Normal::new(0.0f64, 1.0f64).unwrap();
                let v = Array2::<f64>::random_using((ncells, d), dist, &mut rng);
                let full_knn = exhaustive_knn(&v.view(), ncells - 2);

                for k in [1usize, 3, 10, 30] {
                    if k + 2 > ncells {
                        continue;
                    }
                    let fast_knn = knn(&v.view(), k).unwrap();
                    assert_eq!(fast_knn, full_knn.slice(s![.., 0..k]).to_owned());
                }
            }
        }
    }

    #[test]
    fn test_never_self() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let v = Array2::<f64>::random_using((40, 3), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let nn = knn(&v.view(), 7).unwrap();
        for (cell, row) in nn.outer_iter().enumerate() {
            assert!(row.iter().all(|&j| j as usize != cell));
            assert!(row.iter().all(|&j| (j as usize) < 40));
        }
    }

    #[test]
    fn test_identical_points() {
        let v = Array2::<f64>::ones((6, 2));
        let nn = knn(&v.view(), 3).unwrap();
        for (cell, row) in nn.outer_iter().enumerate() {
            let mut row = row.to_vec();
            assert!(row.iter().all(|&j| j as usize != cell));
            row.sort_unstable();
            row.dedup();
            assert_eq!(row.len(), 3);
        }
        assert_eq!(nn, knn(&v.view(), 3).unwrap());
    }

    #[test]
    fn test_k_bounds() {
        let v = Array2::<f64>::from_shape_fn((10, 2), |(i, j)| (i * 3 + j) as f64);
        assert!(knn(&v.view(), 8).is_ok());
        assert!(matches!(
            knn(&v.view(), 9),
            Err(ClusterError::InvalidK { k: 9, events: 10 })
        ));
        assert!(matches!(knn(&v.view(), 0), Err(ClusterError::InvalidK { k: 0, .. })));
    }
}
