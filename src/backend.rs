use rayon::prelude::*;

use crate::particle::Particle;
use crate::rng_pool::ParticleRng;
use crate::sampler::MoveFn;
use crate::state::StateMatrix;

/// Execution strategy for per-particle work.
///
/// Both operations split the population into disjoint per-particle pieces,
/// so an implementation is free to run them in any order or in parallel.
/// Each particle only ever sees its own state row and its own RNG stream,
/// which keeps results identical across backends.
pub trait Backend {
    /// Apply `f(id, row, rng)` to every particle's state row and RNG
    /// stream, returning the summed accept counts.
    fn transform<F>(&self, data: &mut [f64], dim: usize, rngs: &mut [ParticleRng], f: F) -> u32
    where
        F: Fn(usize, &mut [f64], &mut ParticleRng) -> u32 + Sync + Send;

    /// Apply `f(id, row, out_row)` to every particle's state row, writing
    /// `out_dim` values per particle into `out`.
    fn fill<F>(&self, data: &[f64], dim: usize, out: &mut [f64], out_dim: usize, f: F)
    where
        F: Fn(usize, &[f64], &mut [f64]) + Sync + Send;
}

/// Runs everything on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqBackend;

impl Backend for SeqBackend {
    fn transform<F>(&self, data: &mut [f64], dim: usize, rngs: &mut [ParticleRng], f: F) -> u32
    where
        F: Fn(usize, &mut [f64], &mut ParticleRng) -> u32 + Sync + Send,
    {
        let mut accepts = 0;
        for (id, (row, rng)) in data.chunks_exact_mut(dim).zip(rngs.iter_mut()).enumerate() {
            accepts += f(id, row, rng);
        }
        accepts
    }

    fn fill<F>(&self, data: &[f64], dim: usize, out: &mut [f64], out_dim: usize, f: F)
    where
        F: Fn(usize, &[f64], &mut [f64]) + Sync + Send,
    {
        for (id, (row, out_row)) in data
            .chunks_exact(dim)
            .zip(out.chunks_exact_mut(out_dim))
            .enumerate()
        {
            f(id, row, out_row);
        }
    }
}

/// Distributes particles over the rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonBackend;

impl Backend for RayonBackend {
    fn transform<F>(&self, data: &mut [f64], dim: usize, rngs: &mut [ParticleRng], f: F) -> u32
    where
        F: Fn(usize, &mut [f64], &mut ParticleRng) -> u32 + Sync + Send,
    {
        data.par_chunks_exact_mut(dim)
            .zip(rngs.par_iter_mut())
            .enumerate()
            .map(|(id, (row, rng))| f(id, row, rng))
            .sum()
    }

    fn fill<F>(&self, data: &[f64], dim: usize, out: &mut [f64], out_dim: usize, f: F)
    where
        F: Fn(usize, &[f64], &mut [f64]) + Sync + Send,
    {
        data.par_chunks_exact(dim)
            .zip(out.par_chunks_exact_mut(out_dim))
            .enumerate()
            .for_each(|(id, (row, out_row))| f(id, row, out_row));
    }
}

impl Particle<StateMatrix> {
    /// Run a per-particle move through `backend`, handing each invocation
    /// its own state row and RNG stream.
    pub fn for_each_particle<B, F>(&mut self, backend: &B, f: F) -> u32
    where
        B: Backend,
        F: Fn(usize, &mut [f64], &mut ParticleRng) -> u32 + Sync + Send,
    {
        let dim = self.state().dim();
        let (state, rngs) = self.state_and_rngs_mut();
        backend.transform(state.as_mut_slice(), dim, rngs, f)
    }

    /// Compute `out_dim` values per particle from read-only state rows.
    pub fn fill_per_particle<B, F>(&self, backend: &B, out: &mut [f64], out_dim: usize, f: F)
    where
        B: Backend,
        F: Fn(usize, &[f64], &mut [f64]) + Sync + Send,
    {
        backend.fill(self.state().as_slice(), self.state().dim(), out, out_dim, f);
    }
}

/// Wrap a per-particle closure into a sampler move callback running on
/// `backend`.
pub fn particle_move<B, F>(backend: B, f: F) -> MoveFn<StateMatrix>
where
    B: Backend + Send + 'static,
    F: Fn(u64, usize, &mut [f64], &mut ParticleRng) -> u32 + Sync + Send + 'static,
{
    Box::new(move |iter, particle| {
        Ok(particle.for_each_particle(&backend, |id, row, rng| f(iter, id, row, rng)))
    })
}
