use crate::resample::{replication_to_copy_map, ResampleScheme};
use crate::rng_pool::{ParticleRng, RngPool};
use crate::sampler::SmcError;
use crate::seed::SeedAllocator;
use crate::state::{State, StateMatrix};
use crate::weight::WeightSet;

/// A weighted particle population: state, weights and per-particle RNG
/// streams, always of the same size.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Particle<S: State> {
    state: S,
    weight: WeightSet,
    rng_pool: RngPool,
    scheme: ResampleScheme,
    replication: Vec<u32>,
    copy_from: Vec<usize>,
}

impl Particle<StateMatrix> {
    /// A population backed by dense `n x dim` storage.
    pub fn matrix(n: usize, dim: usize, scheme: ResampleScheme, seeds: &SeedAllocator) -> Self {
        Self::new(StateMatrix::new(n, dim), scheme, seeds)
    }
}

impl<S: State> Particle<S> {
    pub fn new(state: S, scheme: ResampleScheme, seeds: &SeedAllocator) -> Self {
        let n = state.len();
        Self {
            state,
            weight: WeightSet::new(n),
            rng_pool: RngPool::new(n, seeds),
            scheme,
            replication: vec![0; n],
            copy_from: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.weight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weight.is_empty()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn weight(&self) -> &WeightSet {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut WeightSet {
        &mut self.weight
    }

    /// Effective sample size of the current weights.
    pub fn ess(&self) -> f64 {
        self.weight.ess()
    }

    /// Whether the latest resampling step replicated particles.
    pub fn resampled(&self) -> bool {
        self.weight.resampled()
    }

    pub fn scheme(&self) -> ResampleScheme {
        self.scheme
    }

    pub fn set_scheme(&mut self, scheme: ResampleScheme) {
        self.scheme = scheme;
    }

    /// The RNG stream owned by particle `id`.
    pub fn rng(&mut self, id: usize) -> &mut ParticleRng {
        self.rng_pool.rng(id)
    }

    pub(crate) fn state_and_rngs_mut(&mut self) -> (&mut S, &mut [ParticleRng]) {
        (&mut self.state, self.rng_pool.streams_mut())
    }

    /// A read-only view of one particle.
    pub fn single(&self, id: usize) -> SingleParticle<'_, S> {
        SingleParticle { id, particle: self }
    }

    /// Resample the population if its effective sample size fell below
    /// `threshold` (an absolute particle count).
    ///
    /// When triggered, a replication vector is drawn from the reserved
    /// resampling stream, converted to a copy map, applied to the state and
    /// the weights are reset to uniform. Above the threshold this is a no-op
    /// apart from clearing the `resampled` flag.
    pub fn resample(&mut self, threshold: f64) -> Result<bool, SmcError> {
        let n = self.weight.len();
        let triggered = self.weight.resample_indicator(threshold);

        if triggered {
            self.scheme.replication(
                self.weight.weights(),
                n,
                self.rng_pool.resample_rng(),
                &mut self.replication,
            );
            replication_to_copy_map(&self.replication, &mut self.copy_from);
            self.state.copy_particles(&self.copy_from);
            if self.state.len() != n {
                return Err(SmcError::SizeMismatch {
                    expected: n,
                    actual: self.state.len(),
                });
            }
            self.weight.set_equal_weight();
        }

        self.weight.set_resampled(triggered);
        Ok(triggered)
    }
}

/// A view of a single particle: its index and a shared reference to the
/// population it belongs to.
///
/// Monitor and path callbacks receive these so they can read one particle's
/// state without being able to touch any other index. Mutable per-particle
/// access (moves, initialization) goes through the backend adapters, which
/// hand each closure its own disjoint state row and RNG stream.
#[derive(Clone, Copy)]
pub struct SingleParticle<'a, S: State> {
    id: usize,
    particle: &'a Particle<S>,
}

impl<'a, S: State> SingleParticle<'a, S> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn particle(&self) -> &'a Particle<S> {
        self.particle
    }

    /// This particle's normalized weight.
    pub fn weight(&self) -> f64 {
        self.particle.weight().weights()[self.id]
    }
}

impl<'a> SingleParticle<'a, StateMatrix> {
    /// This particle's state row.
    pub fn row(&self) -> &'a [f64] {
        self.particle.state().row(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;
    use pretty_assertions::assert_eq;

    fn weighted_particle(n: usize) -> Particle<StateMatrix> {
        let seeds = SeedAllocator::new(1);
        let mut particle = Particle::matrix(n, 1, ResampleScheme::Systematic, &seeds);
        for i in 0..n {
            particle.state_mut().row_mut(i)[0] = i as f64;
        }
        particle
    }

    #[test]
    fn no_resample_above_threshold() {
        let mut particle = weighted_particle(10);
        // Uniform weights: ess == 10, threshold 5 not crossed.
        let resampled = particle.resample(5.0).unwrap();
        assert!(!resampled);
        assert!(!particle.resampled());
        assert_eq!(particle.ess(), 10.0);
    }

    #[test]
    fn resample_resets_weights_to_uniform() {
        let mut particle = weighted_particle(10);
        let mut logw = vec![0f64; 10];
        logw[7] = 50.0;
        particle.weight_mut().set_log_weight(&logw);
        assert!(particle.ess() < 2.0);

        let resampled = particle.resample(5.0).unwrap();
        assert!(resampled);
        assert!(particle.resampled());
        for &w in particle.weight().weights() {
            assert_ulps_eq!(w, 0.1);
        }
        // The dominant particle took over the population.
        for i in 0..10 {
            assert_eq!(particle.state().row(i)[0], 7.0);
        }
    }

    #[test]
    fn single_particle_view_reads_own_slice() {
        let particle = weighted_particle(4);
        let sp = particle.single(2);
        assert_eq!(sp.id(), 2);
        assert_eq!(sp.row(), &[2.0]);
        assert_eq!(sp.weight(), 0.25);
    }
}
