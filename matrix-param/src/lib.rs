pub mod dmatrix_beta;
pub mod dmatrix_gamma;
pub mod dmatrix_gaussian;
pub mod io;
pub mod traits;
