/// Sparse matrix type (CSC format) used for design matrices.
pub type SparseMat = sprs::CsMat<f64>;
