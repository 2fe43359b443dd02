use ndarray::{Array1, Array2};

const PIVOT_EPS: f64 = 1e-12;

/// Solves `(XᵀX + diag(penalty)) β = Xᵀy`.
pub(crate) fn ridge(x: &Array2<f64>, y: &Array1<f64>, penalty: &Array1<f64>) -> Result<Array1<f64>, String> {
    if x.nrows() != y.len() {
        return Err(format!(
            "design has {} rows but target has {}",
            x.nrows(),
            y.len()
        ));
    }
    if x.ncols() != penalty.len() {
        return Err(format!(
            "design has {} columns but {} penalties were given",
            x.ncols(),
            penalty.len()
        ));
    }

    let mut gram = x.t().dot(x);
    for (i, p) in penalty.iter().enumerate() {
        gram[[i, i]] += p;
    }
    let rhs = x.t().dot(y);
    solve(gram, rhs)
}

/// Gaussian elimination with partial pivoting.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, String> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(format!("expected a {n}x{n} system, got {:?}", a.shape()));
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err("normal equations contain non-finite values".to_string());
    }

    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);

    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&i, &j| a[[i, k]].abs().total_cmp(&a[[j, k]].abs()))
            .unwrap_or(k);
        if a[[pivot, k]].abs() <= PIVOT_EPS * scale {
            return Err("singular matrix".to_string());
        }
        if pivot != k {
            for c in 0..n {
                a.swap([k, c], [pivot, c]);
            }
            b.swap(k, pivot);
        }

        for r in (k + 1)..n {
            let factor = a[[r, k]] / a[[k, k]];
            if factor == 0.0 {
                continue;
            }
            for c in k..n {
                a[[r, c]] -= factor * a[[k, c]];
            }
            b[r] -= factor * b[k];
        }
    }

    let mut out = Array1::<f64>::zeros(n);
    for k in (0..n).rev() {
        let tail: f64 = ((k + 1)..n).map(|c| a[[k, c]] * out[c]).sum();
        out[k] = (b[k] - tail) / a[[k, k]];
    }

    if out.iter().any(|v| !v.is_finite()) {
        return Err("solution contains non-finite values".to_string());
    }
    Ok(out)
}
