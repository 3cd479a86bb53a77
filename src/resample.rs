use rand::Rng;

/// Built-in resampling schemes.
///
/// Each scheme maps `m` normalized weights to `n` integer replication counts
/// summing exactly to `n`. The residual variants first assign
/// `floor(n * w_i)` deterministically and distribute the remainder over the
/// renormalized fractional parts with the base scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResampleScheme {
    Multinomial,
    Residual,
    Stratified,
    Systematic,
    ResidualStratified,
    ResidualSystematic,
}

impl ResampleScheme {
    /// Draw a replication vector for `weights` targeting population size `n`.
    ///
    /// `weights` must be normalized. With zero sources the result is empty;
    /// with a single source it receives all `n` replications and no
    /// randomness is consumed.
    pub fn replication<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut R,
        replication: &mut [u32],
    ) {
        let m = weights.len();
        assert!(replication.len() == m);

        if m == 0 {
            return;
        }
        if m == 1 {
            replication[0] = n as u32;
            return;
        }

        match self {
            ResampleScheme::Multinomial => {
                let mut u01 = SortedU01::new(n, rng);
                inversion(weights, &mut u01, n, replication);
            }
            ResampleScheme::Stratified => {
                let mut u01 = StratifiedU01::new(n, rng);
                inversion(weights, &mut u01, n, replication);
            }
            ResampleScheme::Systematic => {
                let mut u01 = SystematicU01::new(n, rng);
                inversion(weights, &mut u01, n, replication);
            }
            ResampleScheme::Residual => {
                residual(weights, n, rng, replication, ResampleScheme::Multinomial)
            }
            ResampleScheme::ResidualStratified => {
                residual(weights, n, rng, replication, ResampleScheme::Stratified)
            }
            ResampleScheme::ResidualSystematic => {
                residual(weights, n, rng, replication, ResampleScheme::Systematic)
            }
        }
    }
}

/// A nondecreasing sequence of uniform variates on `[0, 1)`, consumed by
/// index in increasing order. Repeated access to the same index returns the
/// cached value.
trait U01Seq {
    fn get(&mut self, n: usize) -> f64;
}

/// `n` sorted independent uniforms, generated lazily in ascending order via
/// exponential spacings instead of drawing and sorting a full vector.
struct SortedU01<'a, R: Rng + ?Sized> {
    total: usize,
    last: Option<usize>,
    u: f64,
    lmax: f64,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> SortedU01<'a, R> {
    fn new(total: usize, rng: &'a mut R) -> Self {
        Self {
            total,
            last: None,
            u: 0f64,
            lmax: 0f64,
            rng,
        }
    }
}

impl<R: Rng + ?Sized> U01Seq for SortedU01<'_, R> {
    fn get(&mut self, n: usize) -> f64 {
        assert!(n < self.total);
        if self.last == Some(n) {
            return self.u;
        }
        let draw: f64 = self.rng.random();
        self.lmax += (1f64 - draw).ln() / (self.total - n) as f64;
        self.last = Some(n);
        self.u = 1f64 - self.lmax.exp();
        self.u
    }
}

/// One uniform per stratum: `u_n = (n + U_n) / total`.
struct StratifiedU01<'a, R: Rng + ?Sized> {
    total: usize,
    last: Option<usize>,
    u: f64,
    delta: f64,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> StratifiedU01<'a, R> {
    fn new(total: usize, rng: &'a mut R) -> Self {
        Self {
            total,
            last: None,
            u: 0f64,
            delta: 1f64 / total as f64,
            rng,
        }
    }
}

impl<R: Rng + ?Sized> U01Seq for StratifiedU01<'_, R> {
    fn get(&mut self, n: usize) -> f64 {
        assert!(n < self.total);
        if self.last == Some(n) {
            return self.u;
        }
        let draw: f64 = self.rng.random();
        self.last = Some(n);
        self.u = draw * self.delta + n as f64 * self.delta;
        self.u
    }
}

/// A single uniform offset shared by all evaluation points:
/// `u_n = u0 + n / total` with `u0` in `[0, 1/total)`.
struct SystematicU01 {
    total: usize,
    u0: f64,
    delta: f64,
}

impl SystematicU01 {
    fn new<R: Rng + ?Sized>(total: usize, rng: &mut R) -> Self {
        let delta = 1f64 / total as f64;
        let draw: f64 = rng.random();
        Self {
            total,
            u0: draw * delta,
            delta,
        }
    }
}

impl U01Seq for SystematicU01 {
    fn get(&mut self, n: usize) -> f64 {
        assert!(n < self.total);
        self.u0 + n as f64 * self.delta
    }
}

// Single monotonic pass through cumulative weights and sorted evaluation
// points. The last source absorbs every remaining point, so the counts sum
// to `n` exactly no matter how the boundaries round.
fn inversion<S: U01Seq>(weights: &[f64], u01: &mut S, n: usize, replication: &mut [u32]) {
    let m = weights.len();
    debug_assert!(m >= 2);

    replication.fill(0);
    if n == 0 {
        return;
    }

    let mut point = 0usize;
    let mut accw = 0f64;
    for (i, weight) in weights.iter().enumerate().take(m - 1) {
        accw += weight;
        while point != n && u01.get(point) <= accw {
            replication[i] += 1;
            point += 1;
        }
    }
    replication[m - 1] = (n - point) as u32;
}

fn residual<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
    replication: &mut [u32],
    base: ResampleScheme,
) {
    let m = weights.len();

    let mut fractional = vec![0f64; m];
    let mut assigned = 0usize;
    for (i, weight) in weights.iter().enumerate() {
        let scaled = n as f64 * weight;
        let integral = scaled.floor();
        replication[i] = integral as u32;
        fractional[i] = scaled - integral;
        assigned += integral as usize;
    }

    let remaining = n - assigned;
    if remaining == 0 {
        return;
    }

    let total: f64 = fractional.iter().sum();
    for value in fractional.iter_mut() {
        *value /= total;
    }

    let mut extra = vec![0u32; m];
    base.replication(&fractional, remaining, rng, &mut extra);
    for (count, add) in replication.iter_mut().zip(extra.iter()) {
        *count += add;
    }
}

/// Turn a replication vector into a destination -> source copy map.
///
/// In the in-place case (`m == n`) surviving indices keep themselves as
/// source and only dead destinations are redirected to a rolling donor that
/// still has at least two children left, which keeps most copies no-ops.
/// Otherwise each source is expanded by its count.
pub fn replication_to_copy_map(replication: &[u32], copy_from: &mut [usize]) {
    let m = replication.len();
    let n = copy_from.len();
    debug_assert!(replication.iter().map(|&r| r as usize).sum::<usize>() == n);

    if m == n {
        let mut donated: u32 = 0;
        let mut from = 0usize;
        for to in 0..n {
            if replication[to] != 0 {
                copy_from[to] = to;
            } else {
                if replication[from] < donated + 2 {
                    donated = 0;
                    loop {
                        from += 1;
                        if replication[from] >= 2 {
                            break;
                        }
                    }
                }
                copy_from[to] = from;
                donated += 1;
            }
        }
    } else {
        let mut to = 0usize;
        for (from, &count) in replication.iter().enumerate() {
            for _ in 0..count {
                copy_from[to] = from;
                to += 1;
            }
        }
    }
}
