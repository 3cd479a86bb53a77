use crate::seed::SeedAllocator;
use crate::threefry::Threefry4x64;

/// The engine type used for particle and resampling streams.
pub type ParticleRng = Threefry4x64;

/// One independent RNG stream per particle, plus one reserved for resampling.
///
/// Stream identity is permanent: the engine at index `i` stays at index `i`
/// for the life of the pool, and resampling never touches the per-particle
/// streams. All engines are seeded once, at construction, from the allocator.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RngPool {
    streams: Vec<ParticleRng>,
    resample: ParticleRng,
}

impl RngPool {
    pub fn new(n: usize, seeds: &SeedAllocator) -> Self {
        let streams = (0..n).map(|_| ParticleRng::new(seeds.next_seed())).collect();
        let resample = ParticleRng::new(seeds.next_seed());
        Self { streams, resample }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// The stream owned by particle `id`.
    pub fn rng(&mut self, id: usize) -> &mut ParticleRng {
        &mut self.streams[id]
    }

    /// All particle streams, for backends that hand each index its own engine.
    pub fn streams_mut(&mut self) -> &mut [ParticleRng] {
        &mut self.streams
    }

    /// The stream reserved for population-wide resampling decisions.
    pub fn resample_rng(&mut self) -> &mut ParticleRng {
        &mut self.resample
    }
}
