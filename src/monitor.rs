use crate::math::weighted_row_sum;
use crate::particle::Particle;
use crate::state::State;

/// How a monitor callback reports its values.
///
/// The two shapes are part of the contract, not a runtime flag: a `Direct`
/// callback writes the final per-dimension results itself, an `Integrand`
/// callback writes one row of integrand values per particle which are then
/// reduced against the normalized weights.
pub enum MonitorEval<S: State> {
    /// `f(iter, particle, out)` writes `dim` final scalars into `out`.
    Direct(Box<dyn FnMut(u64, &Particle<S>, &mut [f64]) + Send>),
    /// `f(iter, particle, buffer)` writes `dim` integrand values per
    /// particle into `buffer` (row-major, `buffer[i * dim + d]`); the result
    /// is the weighted sum over particles.
    Integrand(Box<dyn FnMut(u64, &Particle<S>, &mut [f64]) + Send>),
}

/// Records importance-sampling estimates of named quantities, one value per
/// tracked dimension per evaluated iteration.
pub struct Monitor<S: State> {
    dim: usize,
    eval: MonitorEval<S>,
    index: Vec<u64>,
    record: Vec<Vec<f64>>,
    buffer: Vec<f64>,
    result: Vec<f64>,
}

impl<S: State> Monitor<S> {
    pub fn new(dim: usize, eval: MonitorEval<S>) -> Self {
        assert!(dim > 0);
        Self {
            dim,
            eval,
            index: Vec::new(),
            record: vec![Vec::new(); dim],
            buffer: Vec::new(),
            result: vec![0f64; dim],
        }
    }

    /// Number of tracked dimensions.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of iterations recorded so far.
    pub fn iter_size(&self) -> usize {
        self.index.len()
    }

    /// Iteration numbers at which values were recorded.
    pub fn index(&self) -> &[u64] {
        &self.index
    }

    /// Recorded values of dimension `d`, parallel to `index()`.
    pub fn record(&self, d: usize) -> &[f64] {
        &self.record[d]
    }

    /// Evaluate the callback for `iter` and append the results.
    pub fn eval(&mut self, iter: u64, particle: &Particle<S>) {
        match &mut self.eval {
            MonitorEval::Direct(f) => f(iter, particle, &mut self.result),
            MonitorEval::Integrand(f) => {
                self.buffer.resize(particle.len() * self.dim, 0f64);
                f(iter, particle, &mut self.buffer);
                weighted_row_sum(
                    &self.buffer,
                    particle.weight().weights(),
                    self.dim,
                    &mut self.result,
                );
            }
        }

        self.index.push(iter);
        for (series, value) in self.record.iter_mut().zip(self.result.iter()) {
            series.push(*value);
        }
    }

    /// Drop all recorded data, keeping the callback.
    pub fn clear(&mut self) {
        self.index.clear();
        for series in self.record.iter_mut() {
            series.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::ResampleScheme;
    use crate::seed::SeedAllocator;
    use crate::state::StateMatrix;
    use approx::assert_ulps_eq;
    use pretty_assertions::assert_eq;

    fn particle(n: usize) -> Particle<StateMatrix> {
        let seeds = SeedAllocator::new(0);
        let mut particle = Particle::matrix(n, 1, ResampleScheme::Stratified, &seeds);
        for i in 0..n {
            particle.state_mut().row_mut(i)[0] = i as f64;
        }
        particle
    }

    #[test]
    fn direct_mode_records_callback_output() {
        let particle = particle(4);
        let mut monitor = Monitor::new(
            2,
            MonitorEval::Direct(Box::new(|iter, _particle, out| {
                out[0] = iter as f64;
                out[1] = -1.0;
            })),
        );
        monitor.eval(3, &particle);
        monitor.eval(5, &particle);
        assert_eq!(monitor.index(), &[3, 5]);
        assert_eq!(monitor.record(0), &[3.0, 5.0]);
        assert_eq!(monitor.record(1), &[-1.0, -1.0]);
    }

    #[test]
    fn integrand_mode_takes_weighted_mean() {
        let particle = particle(4);
        let mut monitor = Monitor::new(
            1,
            MonitorEval::Integrand(Box::new(
                |_iter, particle: &Particle<StateMatrix>, buffer: &mut [f64]| {
                    for (i, value) in buffer.iter_mut().enumerate() {
                        *value = particle.state().row(i)[0];
                    }
                },
            )),
        );
        monitor.eval(0, &particle);
        // Uniform weights: mean of 0, 1, 2, 3.
        assert_ulps_eq!(monitor.record(0)[0], 1.5);
    }

    #[test]
    fn clear_keeps_callback_usable() {
        let particle = particle(2);
        let mut monitor = Monitor::new(
            1,
            MonitorEval::Direct(Box::new(|_, _, out| out[0] = 1.0)),
        );
        monitor.eval(0, &particle);
        monitor.clear();
        assert_eq!(monitor.iter_size(), 0);
        monitor.eval(1, &particle);
        assert_eq!(monitor.index(), &[1]);
        assert_eq!(monitor.record(0), &[1.0]);
    }
}
