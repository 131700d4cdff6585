use crate::linalg::faer_ndarray::FaerLinalgError;
use thiserror::Error;

/// Fatal failures of the fitting pipeline.
///
/// Non-convergence of the additive solver is deliberately absent: it is a
/// recoverable outcome reported through
/// [`ConvergenceState`](crate::additive::ConvergenceState).
#[derive(Debug, Error)]
pub enum HierBasisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Non-finite value encountered in {0}")]
    NonFiniteInput(String),

    #[error(
        "Design matrix is rank deficient (numerical rank {rank} of {ncols} columns); \
        the orthogonal reparametrization cannot be inverted"
    )]
    RankDeficient { rank: usize, ncols: usize },

    #[error(
        "Back-transform to the original basis failed: \
        triangular factor has pivot {pivot:.3e} at index {index}"
    )]
    SingularBacktransform { index: usize, pivot: f64 },

    #[error("Linear algebra failure: {0}")]
    LinearAlgebra(#[from] FaerLinalgError),
}

pub type Result<T> = std::result::Result<T, HierBasisError>;

pub(crate) fn ensure_finite<'a, I>(values: I, label: &str) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(HierBasisError::NonFiniteInput(label.to_string()))
    }
}

pub(crate) fn ensure_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(HierBasisError::DimensionMismatch {
            what,
            expected,
            found,
        })
    }
}
