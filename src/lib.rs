pub(crate) mod backend;
pub(crate) mod math;
pub(crate) mod monitor;
pub(crate) mod particle;
pub(crate) mod path;
pub(crate) mod resample;
pub(crate) mod rng_pool;
pub(crate) mod sampler;
pub(crate) mod seed;
pub(crate) mod state;
pub(crate) mod threefry;
pub(crate) mod weight;

pub use backend::{particle_move, Backend, RayonBackend, SeqBackend};
pub use monitor::{Monitor, MonitorEval};
pub use particle::{Particle, SingleParticle};
pub use path::{Path, PathEval};
pub use resample::{replication_to_copy_map, ResampleScheme};
pub use rng_pool::{ParticleRng, RngPool};
pub use sampler::{HistoryFormat, InitFn, MoveFn, Sampler, SmcError};
pub use seed::SeedAllocator;
pub use state::{State, StateMatrix};
pub use threefry::{
    Threefry2, Threefry2x32, Threefry2x64, Threefry4, Threefry4x32, Threefry4x64, ThreefryWord,
    XorCombine,
};
pub use weight::WeightSet;
