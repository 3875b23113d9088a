use sprs::CsMat;

/// Multiply a sparse matrix by a dense vector: result = A * x.
pub fn spmv(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.cols(), x.len());
    let mut result = vec![0.0; a.rows()];
    for (val, (row, col)) in a.iter() {
        result[row] += val * x[col];
    }
    result
}

/// Compute X' W y for a sparse matrix X, observation weights W = diag(w),
/// and dense vector y.
pub fn xt_wy(x: &CsMat<f64>, w: &[f64], y: &[f64]) -> Vec<f64> {
    let mut result = vec![0.0; x.cols()];
    for (val, (row, col)) in x.iter() {
        result[col] += val * w[row] * y[row];
    }
    result
}

/// Compute A' W B as a dense matrix, with W = diag(w).
///
/// Both inputs are walked column by column; each entry is a weighted sparse
/// dot product of one column of A with one column of B.
pub fn weighted_cross_product(
    a: &CsMat<f64>,
    b: &CsMat<f64>,
    w: &[f64],
) -> nalgebra::DMatrix<f64> {
    let a_csc = if a.is_csc() { a.clone() } else { a.to_csc() };
    let b_csc = if b.is_csc() { b.clone() } else { b.to_csc() };
    let mut result = nalgebra::DMatrix::zeros(a.cols(), b.cols());

    for i in 0..a_csc.cols() {
        let Some(col_a) = a_csc.outer_view(i) else {
            continue;
        };
        for j in 0..b_csc.cols() {
            let Some(col_b) = b_csc.outer_view(j) else {
                continue;
            };
            let mut dot = 0.0;
            for (row, &va) in col_a.iter() {
                if let Some(&vb) = col_b.get(row) {
                    dot += va * vb * w[row];
                }
            }
            result[(i, j)] = dot;
        }
    }

    result
}
