use itertools::izip;
use multiversion::multiversion;

/// Dot product of two equal-length slices.
#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());

    let mut result = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        result += x * y;
    }
    result
}

/// Weighted column sums of a row-major `n x dim` buffer.
///
/// `out[d] = sum_i weights[i] * rows[i * dim + d]`, the integrand reduction
/// used by monitors.
#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn weighted_row_sum(rows: &[f64], weights: &[f64], dim: usize, out: &mut [f64]) {
    assert!(dim > 0);
    assert!(rows.len() == weights.len() * dim);
    assert!(out.len() == dim);

    out.fill(0f64);
    for (row, weight) in rows.chunks_exact(dim).zip(weights.iter()) {
        for (acc, value) in izip!(out.iter_mut(), row.iter()) {
            *acc += weight * value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_eq!(vector_dot(&a, &b), 32.0);
    }

    #[test]
    fn weighted_rows_reduce_per_dimension() {
        // Two particles with dim 2, weights 0.25 / 0.75.
        let rows = [1.0, 10.0, 3.0, 20.0];
        let weights = [0.25, 0.75];
        let mut out = [0f64; 2];
        weighted_row_sum(&rows, &weights, 2, &mut out);
        assert_ulps_eq!(out[0], 0.25 + 2.25);
        assert_ulps_eq!(out[1], 2.5 + 15.0);
    }
}
