pub mod config;
pub mod coordinate;
pub mod data;
pub mod errors;
pub mod family;
pub mod gradient;
pub mod path;
pub mod penalty;
pub mod point;
pub mod validation;

pub use config::InternalParams;
pub use coordinate::{soft_threshold, CoordinateKernel};
pub use data::{ColumnRef, DataView, Standardization};
pub use errors::{ElnetError, PathWarning};
pub use family::Family;
pub use path::{
    fit_binomial, fit_gaussian, fit_multinomial, fit_poisson, GaussianMode, MultinomialPathFit,
    PathFit, PathOptions, Progress,
};
pub use penalty::Penalty;
