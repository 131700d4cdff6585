//! Thin bridge between ndarray storage and faer kernels.
//!
//! Small products stay on ndarray's `dot`; anything large enough to benefit
//! from a blocked GEMM is routed through faer without copying, unless the
//! ndarray layout has strides faer cannot walk.

use faer::linalg::solvers::{self, Solve};
use faer::{Accum, Mat, MatRef, Par, Side, get_global_parallelism};
use ndarray::{Array1, Array2, ArrayBase, Axis, CowArray, Data, Ix1, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("QR factorization requires at least as many rows as columns (got {rows}x{cols})")]
    QrShape { rows: usize, cols: usize },
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
}

const GEMM_MIN_DIM: usize = 32;
const GEMM_MIN_WORK: usize = 4096;
const GEMM_PARALLEL_DIM: usize = 128;

fn wants_gemm(m: usize, n: usize, k: usize) -> bool {
    m.max(n).max(k) >= GEMM_MIN_DIM && m.saturating_mul(n).saturating_mul(k) >= GEMM_MIN_WORK
}

fn parallelism(m: usize, n: usize, k: usize) -> Par {
    if m.min(n).min(k) < GEMM_PARALLEL_DIM {
        Par::Seq
    } else {
        get_global_parallelism()
    }
}

/// Borrow `a` when every non-degenerate axis has a positive stride, copy otherwise.
fn forward_layout<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> CowArray<'_, f64, Ix2> {
    let walkable = a
        .strides()
        .iter()
        .zip(a.shape())
        .all(|(&stride, &len)| stride > 0 || len <= 1);
    if walkable {
        CowArray::from(a.view())
    } else {
        CowArray::from(a.to_owned())
    }
}

fn as_mat_ref<'a>(a: &'a CowArray<'_, f64, Ix2>) -> MatRef<'a, f64> {
    let (rows, cols) = a.dim();
    let strides = a.strides();
    // SAFETY: shape and strides are the ones ndarray reports for `a`, which
    // stays borrowed for the lifetime of the returned view.
    unsafe { MatRef::from_raw_parts(a.as_ptr(), rows, cols, strides[0], strides[1]) }
}

fn to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn gemm(lhs: MatRef<'_, f64>, rhs: MatRef<'_, f64>) -> Array2<f64> {
    let (m, k) = (lhs.nrows(), lhs.ncols());
    let n = rhs.ncols();
    let mut out = Mat::<f64>::zeros(m, n);
    faer::linalg::matmul::matmul(
        out.as_mut(),
        Accum::Replace,
        lhs,
        rhs,
        1.0,
        parallelism(m, n, k),
    );
    to_array(out.as_ref())
}

/// Gram matrix `AᵗA`.
pub fn fast_ata<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> Array2<f64> {
    let (n, p) = a.dim();
    if !wants_gemm(p, p, n) {
        return a.t().dot(a);
    }
    let a = forward_layout(a);
    let a = as_mat_ref(&a);
    gemm(a.transpose(), a)
}

/// `A·B` for `A` (n x p) and `B` (p x q).
pub fn fast_ab<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Array2<f64> {
    let (n, p) = a.dim();
    let q = b.ncols();
    debug_assert_eq!(p, b.nrows());
    if !wants_gemm(n, q, p) {
        return a.dot(b);
    }
    let (a, b) = (forward_layout(a), forward_layout(b));
    gemm(as_mat_ref(&a), as_mat_ref(&b))
}

/// `Aᵗ·v` for `A` (n x p) and `v` (n).
pub fn fast_atv<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    a: &ArrayBase<S1, Ix2>,
    v: &ArrayBase<S2, Ix1>,
) -> Array1<f64> {
    let (n, p) = a.dim();
    debug_assert_eq!(n, v.len());
    if !wants_gemm(p, 1, n) {
        return a.t().dot(v);
    }
    let column = v.view().insert_axis(Axis(1));
    let a = forward_layout(a);
    let v = forward_layout(&column);
    gemm(as_mat_ref(&a).transpose(), as_mat_ref(&v)).remove_axis(Axis(1))
}

/// Cholesky factor of a symmetric positive definite matrix.
pub struct FaerCholeskyFactor {
    factor: solvers::Llt<f64>,
    dim: usize,
}

impl FaerCholeskyFactor {
    /// `M⁻¹`, symmetrized.
    pub fn inverse(&self) -> Array2<f64> {
        let mut work = Mat::<f64>::identity(self.dim, self.dim);
        self.factor.solve_in_place(work.as_mut());
        let inv = to_array(work.as_ref());
        (&inv + &inv.t()) * 0.5
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError> {
        let a = forward_layout(self);
        let factor = as_mat_ref(&a)
            .llt(side)
            .map_err(FaerLinalgError::Cholesky)?;
        Ok(FaerCholeskyFactor {
            factor,
            dim: self.nrows(),
        })
    }
}

/// Economy QR of a tall matrix: `Q` is (n x p) with orthonormal columns and
/// `R` is (p x p) upper triangular.
pub trait FaerQr {
    fn thin_qr(&self) -> Result<(Array2<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerQr for ArrayBase<S, Ix2> {
    fn thin_qr(&self) -> Result<(Array2<f64>, Array2<f64>), FaerLinalgError> {
        let (rows, cols) = self.dim();
        if rows < cols {
            return Err(FaerLinalgError::QrShape { rows, cols });
        }
        let a = forward_layout(self);
        let qr = as_mat_ref(&a).qr();
        let q = to_array(qr.compute_thin_Q().as_ref());
        let r = qr.thin_R();
        let r = Array2::from_shape_fn((cols, cols), |(i, j)| if j < i { 0.0 } else { r[(i, j)] });
        Ok((q, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn thin_qr_reconstructs_tall_matrix() {
        let a = array![
            [1.0, 2.0, 0.5],
            [0.0, 1.0, -1.0],
            [3.0, -2.0, 1.5],
            [1.0, 1.0, 1.0],
            [-0.5, 0.25, 2.0]
        ];
        let (q, r) = a.thin_qr().expect("qr should succeed");
        assert_eq!(q.dim(), (5, 3));
        assert_eq!(r.dim(), (3, 3));
        assert_abs_diff_eq!(q.dot(&r), a, epsilon = 1e-12);
        assert_abs_diff_eq!(fast_ata(&q), Array2::<f64>::eye(3), epsilon = 1e-12);
        assert_eq!(r[[2, 0]], 0.0);
        assert_eq!(r[[1, 0]], 0.0);
    }

    #[test]
    fn thin_qr_rejects_wide_matrix() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            a.thin_qr(),
            Err(FaerLinalgError::QrShape { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn cholesky_inverse_is_symmetric_two_sided_inverse() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let inv = m.cholesky(Side::Lower).expect("spd").inverse();
        assert_abs_diff_eq!(m.dot(&inv), Array2::<f64>::eye(3), epsilon = 1e-12);
        assert_abs_diff_eq!(inv.dot(&m), Array2::<f64>::eye(3), epsilon = 1e-12);
        assert_abs_diff_eq!(inv.clone(), inv.t().to_owned(), epsilon = 0.0);
    }

    #[test]
    fn non_positive_definite_matrix_fails_to_factor() {
        let m = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            m.cholesky(Side::Lower),
            Err(FaerLinalgError::Cholesky(_))
        ));
    }

    #[test]
    fn large_products_match_ndarray() {
        let a = Array2::from_shape_fn((200, 40), |(i, j)| ((i * 7 + j * 3) % 11) as f64 - 5.0);
        let b = Array2::from_shape_fn((40, 35), |(i, j)| ((i + 2 * j) % 5) as f64 * 0.5);
        let v = Array1::from_shape_fn(200, |i| (i % 9) as f64 - 4.0);

        assert_abs_diff_eq!(fast_ata(&a), a.t().dot(&a), epsilon = 1e-9);
        assert_abs_diff_eq!(fast_ab(&a, &b), a.dot(&b), epsilon = 1e-9);
        assert_abs_diff_eq!(fast_atv(&a, &v), a.t().dot(&v), epsilon = 1e-9);

        // Reversed rows force the copying path.
        let flipped = a.slice(ndarray::s![..;-1, ..]);
        assert_abs_diff_eq!(fast_ata(&flipped), a.t().dot(&a), epsilon = 1e-9);
    }
}
