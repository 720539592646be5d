//! Symmetric eigen decomposition for the eigenface Gram matrix.
//!
//! Training sets are small (tens of images), so the N×N Gram matrix is solved
//! directly with cyclic Jacobi rotations instead of pulling in a LAPACK binding.

use ndarray::{Array1, Array2};

const JACOBI_MAX_SWEEPS: usize = 100;
/// Convergence: off-diagonal energy relative to total energy.
const JACOBI_TOLERANCE: f64 = 1e-22;

/// Eigen decomposition of a real symmetric matrix.
///
/// Returns eigenvalues in descending order and the matching unit eigenvectors as
/// the columns of the second matrix.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols(), "symmetric_eigen needs a square matrix");

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let total: f64 = a.iter().map(|x| x * x).sum();

    for _ in 0..JACOBI_MAX_SWEEPS {
        if off_diagonal_energy(&a) <= JACOBI_TOLERANCE * total.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                // Rotation angle that zeroes a[p][q].
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        a[[j, j]]
            .partial_cmp(&a[[i, i]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }

    (values, vectors)
}

fn off_diagonal_energy(a: &Array2<f64>) -> f64 {
    a.indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, x)| x * x)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    #[test]
    fn test_diagonal_matrix() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let (values, vectors) = symmetric_eigen(&m);
        assert_eq!(values.to_vec(), vec![5.0, 3.0, 1.0]);
        // Largest eigenvalue belongs to the second axis.
        assert_close(vectors[[1, 0]].abs(), 1.0, 1e-12);
    }

    #[test]
    fn test_two_by_two() {
        // Eigenvalues of [[2, 1], [1, 2]] are 3 and 1.
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let (values, vectors) = symmetric_eigen(&m);
        assert_close(values[0], 3.0, 1e-10);
        assert_close(values[1], 1.0, 1e-10);

        let v0 = vectors.column(0);
        assert_close(v0[0].abs(), std::f64::consts::FRAC_1_SQRT_2, 1e-10);
        assert_close(v0[1].abs(), std::f64::consts::FRAC_1_SQRT_2, 1e-10);
    }

    #[test]
    fn test_reconstruction() {
        let m = array![
            [4.0, 1.0, 2.0, 0.5],
            [1.0, 3.0, 0.0, 1.5],
            [2.0, 0.0, 5.0, 1.0],
            [0.5, 1.5, 1.0, 2.0],
        ];
        let (values, vectors) = symmetric_eigen(&m);

        // V * diag(λ) * Vᵀ must give back the input.
        let lambda = Array2::from_diag(&values);
        let rebuilt = vectors.dot(&lambda).dot(&vectors.t());
        for ((i, j), x) in m.indexed_iter() {
            assert_close(rebuilt[[i, j]], *x, 1e-9);
        }

        // Eigenvectors are orthonormal.
        let gram = vectors.t().dot(&vectors);
        for ((i, j), x) in gram.indexed_iter() {
            assert_close(*x, if i == j { 1.0 } else { 0.0 }, 1e-9);
        }
    }

    #[test]
    fn test_empty_matrix() {
        let (values, vectors) = symmetric_eigen(&Array2::<f64>::zeros((0, 0)));
        assert!(values.is_empty());
        assert_eq!(vectors.dim(), (0, 0));
    }
}
