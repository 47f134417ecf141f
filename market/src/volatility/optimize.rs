/// Derivative-free simplex minimizer used for likelihood fits.
#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iterations: usize,
    /// Converged once the spread of objective values across the simplex drops below this.
    pub tolerance: f64,
    pub initial_step: f64,
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 2_000,
            tolerance: 1e-9,
            initial_step: 0.5,
        }
    }
}

impl NelderMead {
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    /// Minimizes `f` starting from `x0`.
    ///
    /// Non-finite objective values are treated as `+inf`, which lets the
    /// caller express constraints by returning `f64::INFINITY`.
    pub fn minimize<F>(&self, f: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_finite() { v } else { f64::INFINITY }
        };

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((x0.to_vec(), eval(x0)));
        for i in 0..n {
            let mut x = x0.to_vec();
            x[i] += self.initial_step;
            let v = eval(&x);
            simplex.push((x, v));
        }

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            let best = simplex[0].1;
            let worst = simplex[n].1;
            if best.is_finite() && (worst - best).abs() <= self.tolerance * (1.0 + best.abs()) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|(x, _)| x[j]).sum::<f64>() / n as f64)
                .collect();
            let along = |coef: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&simplex[n].0)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = along(Self::REFLECT);
            let fr = eval(&reflected);

            if fr < simplex[0].1 {
                let expanded = along(Self::EXPAND);
                let fe = eval(&expanded);
                simplex[n] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
                continue;
            }

            if fr < simplex[n - 1].1 {
                simplex[n] = (reflected, fr);
                continue;
            }

            let (contracted, fc) = if fr < simplex[n].1 {
                let x = along(Self::CONTRACT);
                let v = eval(&x);
                (x, v)
            } else {
                let x = along(-Self::CONTRACT);
                let v = eval(&x);
                (x, v)
            };

            if fc < simplex[n].1.min(fr) {
                simplex[n] = (contracted, fc);
                continue;
            }

            let anchor = simplex[0].0.clone();
            for (x, v) in simplex.iter_mut().skip(1) {
                for (xi, ai) in x.iter_mut().zip(&anchor) {
                    *xi = ai + Self::SHRINK * (*xi - ai);
                }
                *v = eval(x);
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (x, value) = simplex.swap_remove(0);
        Minimum {
            x,
            value,
            iterations,
            converged,
        }
    }
}
