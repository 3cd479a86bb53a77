use crate::math::vector_dot;
use crate::particle::Particle;
use crate::state::State;

/// How a path callback reports its integrand.
///
/// Both shapes return the width of the new grid segment; they differ in
/// whether the integrand arrives as a final scalar or as per-particle
/// contributions that still need the weighted reduction.
pub enum PathEval<S: State> {
    /// `f(iter, particle, out)` writes the final integrand into `out[0]`
    /// and returns the segment width.
    Direct(Box<dyn FnMut(u64, &Particle<S>, &mut [f64]) -> f64 + Send>),
    /// `f(iter, particle, buffer)` writes one integrand value per particle
    /// and returns the segment width; the integrand is the weighted sum.
    Integrand(Box<dyn FnMut(u64, &Particle<S>, &mut [f64]) -> f64 + Send>),
}

/// Path-sampling record for normalizing-constant ratio estimation.
///
/// Keeps four parallel series: iteration numbers, integrand values, segment
/// widths and the cumulative grid.
pub struct Path<S: State> {
    eval: PathEval<S>,
    index: Vec<u64>,
    integrand: Vec<f64>,
    width: Vec<f64>,
    grid: Vec<f64>,
    buffer: Vec<f64>,
}

impl<S: State> Path<S> {
    pub fn new(eval: PathEval<S>) -> Self {
        Self {
            eval,
            index: Vec::new(),
            integrand: Vec::new(),
            width: Vec::new(),
            grid: Vec::new(),
            buffer: Vec::new(),
        }
    }

    /// Number of iterations recorded so far.
    pub fn iter_size(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn integrand(&self) -> &[f64] {
        &self.integrand
    }

    pub fn width(&self) -> &[f64] {
        &self.width
    }

    /// Cumulative sum of the widths.
    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// Evaluate the callback for `iter` and append to all four series.
    pub fn eval(&mut self, iter: u64, particle: &Particle<S>) {
        let (width, integrand) = match &mut self.eval {
            PathEval::Direct(f) => {
                let mut out = [0f64];
                let width = f(iter, particle, &mut out);
                (width, out[0])
            }
            PathEval::Integrand(f) => {
                self.buffer.resize(particle.len(), 0f64);
                let width = f(iter, particle, &mut self.buffer);
                let integrand = vector_dot(particle.weight().weights(), &self.buffer);
                (width, integrand)
            }
        };

        self.index.push(iter);
        self.integrand.push(integrand);
        self.width.push(width);
        self.grid.push(match self.grid.last() {
            Some(last) => last + width,
            None => width,
        });
    }

    /// Trapezoid-rule estimate of the log normalizing-constant ratio.
    ///
    /// Returns zero with fewer than two recorded points.
    pub fn zconst(&self) -> f64 {
        let mut sum = 0f64;
        for i in 1..self.iter_size() {
            sum += 0.5 * self.width[i] * (self.integrand[i - 1] + self.integrand[i]);
        }
        sum
    }

    /// Drop all recorded data, keeping the callback.
    pub fn clear(&mut self) {
        self.index.clear();
        self.integrand.clear();
        self.width.clear();
        self.grid.clear();
    }
}
