/// Contract the engine requires from a particle state container.
///
/// The engine never looks inside the state; it only needs the population
/// size and the ability to rearrange rows after resampling.
pub trait State {
    /// Number of particles stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rearrange the population so that row `i` afterwards equals row
    /// `copy_from[i]` beforehand.
    ///
    /// Self-copies (`copy_from[i] == i`) must be no-ops. The engine only
    /// passes maps in which every referenced source is also its own
    /// destination, so a sequential in-place copy is safe.
    fn copy_particles(&mut self, copy_from: &[usize]);
}

/// Dense row-major particle storage: `n` rows of `dim` values each.
///
/// The stock state container for models whose per-particle state is a fixed
/// number of floats. Backends split it into disjoint row slices for parallel
/// moves.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateMatrix {
    n: usize,
    dim: usize,
    data: Vec<f64>,
}

impl StateMatrix {
    pub fn new(n: usize, dim: usize) -> Self {
        assert!(dim > 0);
        Self {
            n,
            dim,
            data: vec![0f64; n * dim],
        }
    }

    /// Values per particle.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, id: usize) -> &[f64] {
        &self.data[id * self.dim..(id + 1) * self.dim]
    }

    pub fn row_mut(&mut self, id: usize) -> &mut [f64] {
        &mut self.data[id * self.dim..(id + 1) * self.dim]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl State for StateMatrix {
    fn len(&self) -> usize {
        self.n
    }

    fn copy_particles(&mut self, copy_from: &[usize]) {
        assert!(copy_from.len() == self.n);
        for (to, &from) in copy_from.iter().enumerate() {
            if from != to {
                self.data
                    .copy_within(from * self.dim..(from + 1) * self.dim, to * self.dim);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn copy_rearranges_rows() {
        let mut state = StateMatrix::new(4, 2);
        for i in 0..4 {
            state.row_mut(i).fill(i as f64);
        }
        state.copy_particles(&[1, 1, 2, 2]);
        assert_eq!(state.row(0), &[1.0, 1.0]);
        assert_eq!(state.row(1), &[1.0, 1.0]);
        assert_eq!(state.row(2), &[2.0, 2.0]);
        assert_eq!(state.row(3), &[2.0, 2.0]);
    }

    #[test]
    fn identity_copy_is_noop() {
        let mut state = StateMatrix::new(3, 1);
        for i in 0..3 {
            state.row_mut(i)[0] = i as f64;
        }
        let before = state.as_slice().to_vec();
        state.copy_particles(&[0, 1, 2]);
        assert_eq!(state.as_slice(), &before[..]);
    }
}
