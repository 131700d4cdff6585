#![deny(dead_code)]
#![deny(unused_imports)]
#![allow(non_snake_case)]

pub mod additive;
pub mod basis;
pub mod dof;
pub mod error;
pub mod lambda;
pub mod linalg;
pub mod orthogonal;
pub mod path;
pub mod prox;
pub mod types;
pub mod univariate;

pub use additive::{
    AdditiveHierBasis, AdditivePathResult, AdditiveState, ConvergenceState, fit_additive,
    solve_lambda,
};
pub use basis::{CenteredDesign, polynomial_basis, weight_schedule};
pub use dof::{degrees_of_freedom, degrees_of_freedom_path};
pub use error::{HierBasisError, Result};
pub use lambda::{build_lambda_path, critical_lambda};
pub use orthogonal::{
    OrthogonalBasis, orthogonalize, orthogonalize_centered, solve_upper_triangular,
};
pub use path::CoefficientPath;
pub use prox::{prox_hierarchical, prox_hierarchical_path, weight_matrix};
pub use types::{
    AdditiveConfig, AdditiveHierBasisConfig, HierBasisConfig, LambdaPath, PathConfig,
};
pub use univariate::{
    HierBasis, SingleResponsePath, fit_single_response, fit_single_response_with_template,
};
