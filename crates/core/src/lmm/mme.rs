use sprs::CsMat;

use crate::error::{MaihdaError, Result};
use crate::matrix::sparse::{weighted_cross_product, xt_wy};

/// Henderson's Mixed Model Equations.
///
/// ```text
/// [X'R⁻¹X       X'R⁻¹Z          ] [b]   [X'R⁻¹y]
/// [Z'R⁻¹X       Z'R⁻¹Z + G⁻¹   ] [u] = [Z'R⁻¹y]
/// ```
///
/// R is diagonal, given by its inverse `r_inv` (one weight per
/// observation). The coefficient matrix C is symmetric positive definite.
#[derive(Debug)]
pub struct MixedModelEquations {
    /// The full coefficient matrix C (symmetric, dense).
    pub coeff_matrix: nalgebra::DMatrix<f64>,
    /// The right-hand side vector.
    pub rhs: Vec<f64>,
    /// Number of fixed effect parameters.
    pub n_fixed: usize,
    /// Number of random effect levels per random term.
    pub n_random: Vec<usize>,
    /// Total dimension of the system.
    pub dim: usize,
}

impl MixedModelEquations {
    /// Assemble the MME from model components and current variance parameters.
    ///
    /// # Arguments
    /// - `x`: Fixed effects design matrix (n x p)
    /// - `z_blocks`: Random effects design matrices, one per random term
    /// - `y`: Response vector (length n)
    /// - `r_inv`: diagonal of R⁻¹ (length n)
    /// - `g_inv_diag`: diagonal of G⁻¹ for each random term (IID effects)
    pub fn assemble(
        x: &CsMat<f64>,
        z_blocks: &[&CsMat<f64>],
        y: &[f64],
        r_inv: &[f64],
        g_inv_diag: &[Vec<f64>],
    ) -> Self {
        let p = x.cols();
        let q_vec: Vec<usize> = z_blocks.iter().map(|z| z.cols()).collect();
        let q_total: usize = q_vec.iter().sum();
        let dim = p + q_total;

        let mut c = nalgebra::DMatrix::zeros(dim, dim);
        let mut rhs = vec![0.0; dim];

        // --- X'R⁻¹X block (top-left, p x p) ---
        let xtx = weighted_cross_product(x, x, r_inv);
        c.view_mut((0, 0), (p, p)).copy_from(&xtx);

        let mut offset_k = p;
        for (k, z) in z_blocks.iter().enumerate() {
            let qk = z.cols();

            // --- X'R⁻¹Z_k and its transpose ---
            let xtz = weighted_cross_product(x, z, r_inv);
            c.view_mut((0, offset_k), (p, qk)).copy_from(&xtz);
            c.view_mut((offset_k, 0), (qk, p)).copy_from(&xtz.transpose());

            // --- Z_k'R⁻¹Z_l for l >= k, plus G⁻¹ on the diagonal block ---
            let mut offset_l = offset_k;
            for z2 in z_blocks.iter().skip(k) {
                let ql = z2.cols();
                let cross = weighted_cross_product(z, z2, r_inv);
                c.view_mut((offset_k, offset_l), (qk, ql)).copy_from(&cross);
                if offset_l != offset_k {
                    c.view_mut((offset_l, offset_k), (ql, qk))
                        .copy_from(&cross.transpose());
                }
                offset_l += ql;
            }
            if let Some(g_inv) = g_inv_diag.get(k) {
                for (i, &g) in g_inv.iter().enumerate() {
                    c[(offset_k + i, offset_k + i)] += g;
                }
            }

            // --- RHS block Z_k'R⁻¹y ---
            rhs[offset_k..offset_k + qk].copy_from_slice(&xt_wy(z, r_inv, y));
            offset_k += qk;
        }

        // --- RHS: X'R⁻¹y ---
        rhs[..p].copy_from_slice(&xt_wy(x, r_inv, y));

        Self {
            coeff_matrix: c,
            rhs,
            n_fixed: p,
            n_random: q_vec,
            dim,
        }
    }

    /// Solve the MME system C * sol = rhs using dense Cholesky.
    pub fn solve(&self) -> Result<MmeSolution> {
        let chol = self
            .coeff_matrix
            .clone()
            .cholesky()
            .ok_or(MaihdaError::NotPositiveDefinite)?;

        let rhs_vec = nalgebra::DVector::from_column_slice(&self.rhs);
        let sol = chol.solve(&rhs_vec);
        let sol_vec: Vec<f64> = sol.as_slice().to_vec();

        let fixed_effects = sol_vec[..self.n_fixed].to_vec();

        let mut random_effects = Vec::new();
        let mut offset = self.n_fixed;
        for &q in &self.n_random {
            random_effects.push(sol_vec[offset..offset + q].to_vec());
            offset += q;
        }

        // log|C| = 2 * sum(log(diag(L)))
        let l = chol.l();
        let log_det_c = 2.0 * (0..self.dim).map(|i| l[(i, i)].ln()).sum::<f64>();

        let c_inv = chol.inverse();

        Ok(MmeSolution {
            solution: sol_vec,
            fixed_effects,
            random_effects,
            log_det_c,
            c_inv,
        })
    }
}

/// Solution of the Mixed Model Equations.
pub struct MmeSolution {
    /// Full solution vector [b; u1; u2; ...].
    pub solution: Vec<f64>,
    /// Fixed effects (BLUE): b-hat.
    pub fixed_effects: Vec<f64>,
    /// Random effects (BLUP): u-hat, one vec per random term.
    pub random_effects: Vec<Vec<f64>>,
    /// Log-determinant of the coefficient matrix: log|C|.
    pub log_det_c: f64,
    /// C⁻¹; its diagonal gives prediction error variances.
    pub c_inv: nalgebra::DMatrix<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intercept(n: usize) -> CsMat<f64> {
        let mut tri = sprs::TriMat::new((n, 1));
        for i in 0..n {
            tri.add_triplet(i, 0, 1.0);
        }
        tri.to_csc()
    }

    fn two_groups() -> CsMat<f64> {
        let mut z_tri = sprs::TriMat::new((4, 2));
        z_tri.add_triplet(0, 0, 1.0);
        z_tri.add_triplet(1, 0, 1.0);
        z_tri.add_triplet(2, 1, 1.0);
        z_tri.add_triplet(3, 1, 1.0);
        z_tri.to_csc()
    }

    #[test]
    fn test_mme_simple_intercept_only() {
        // y = mu + e: X'X * b = X'y => 3*mu = sum(y)
        let x = intercept(3);
        let y = vec![5.0, 3.0, 7.0];

        let mme = MixedModelEquations::assemble(&x, &[], &y, &[1.0; 3], &[]);

        assert_eq!(mme.dim, 1);
        assert_relative_eq!(mme.coeff_matrix[(0, 0)], 3.0, epsilon = 1e-10);
        assert_relative_eq!(mme.rhs[0], 15.0, epsilon = 1e-10);

        let sol = mme.solve().unwrap();
        assert_relative_eq!(sol.fixed_effects[0], 5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_mme_one_fixed_one_random() {
        // y = mu + u + e, 4 observations in 2 groups.
        let x = intercept(4);
        let z = two_groups();
        let y = vec![10.0, 12.0, 6.0, 8.0];
        let sigma_e2 = 2.0;
        let sigma_u2 = 4.0;

        let mme = MixedModelEquations::assemble(
            &x,
            &[&z],
            &y,
            &[1.0 / sigma_e2; 4],
            &[vec![1.0 / sigma_u2; 2]],
        );

        assert_eq!(mme.dim, 3);
        assert_eq!(mme.n_fixed, 1);
        assert_eq!(mme.n_random, vec![2]);

        let sol = mme.solve().unwrap();
        // Balanced design: mu is the grand mean, BLUPs shrink the group
        // deviations (+2, -2) by sigma_u2 / (sigma_u2 + sigma_e2 / 2) = 0.8.
        assert_relative_eq!(sol.fixed_effects[0], 9.0, epsilon = 1e-10);
        assert_relative_eq!(sol.random_effects[0][0], 1.6, epsilon = 1e-10);
        assert_relative_eq!(sol.random_effects[0][1], -1.6, epsilon = 1e-10);
    }

    #[test]
    fn test_mme_weights_scale_the_system() {
        let x = intercept(4);
        let z = two_groups();
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let mme = MixedModelEquations::assemble(
            &x,
            &[&z],
            &y,
            &[1.0, 2.0, 1.0, 2.0],
            &[vec![0.5; 2]],
        );

        assert_relative_eq!(mme.coeff_matrix[(0, 0)], 6.0, epsilon = 1e-10);
        assert_relative_eq!(mme.coeff_matrix[(1, 1)], 3.5, epsilon = 1e-10);
        assert_relative_eq!(mme.rhs[0], 1.0 + 4.0 + 3.0 + 8.0, epsilon = 1e-10);

        for i in 0..mme.dim {
            for j in 0..mme.dim {
                assert_relative_eq!(
                    mme.coeff_matrix[(i, j)],
                    mme.coeff_matrix[(j, i)],
                    epsilon = 1e-10
                );
            }
        }
    }
}
