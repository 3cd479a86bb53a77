use std::io;

use anyhow::Result;
use thiserror::Error;

use crate::monitor::Monitor;
use crate::particle::Particle;
use crate::path::{Path, PathEval};
use crate::state::State;

/// Contract violations of the sampler API.
///
/// These are programming errors, not data conditions: once raised the
/// sampler is in whatever state the failed call left it and the caller is
/// expected to fix the setup, not to retry.
#[derive(Error, Debug)]
pub enum SmcError {
    #[error("iterate called before initialize")]
    NotInitialized,
    #[error("initialize called without an initialization callback")]
    MissingInitializer,
    #[error("state size changed during resampling: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Initialization callback: sets state and weights for all particles and
/// returns its accept count.
pub type InitFn<S> = Box<dyn FnMut(&mut Particle<S>) -> Result<u32> + Send>;

/// Move or MCMC callback: `f(iteration, particle)` returning an accept count.
pub type MoveFn<S> = Box<dyn FnMut(u64, &mut Particle<S>) -> Result<u32> + Send>;

/// The SMC iteration state machine.
///
/// One iteration runs every move callback in registration order, checks the
/// resampling threshold, runs every MCMC callback, then evaluates the path
/// and all monitors. Resampling sits strictly between the move and MCMC
/// phases: MCMC callbacks always see the post-resampling, equal-weight
/// population.
pub struct Sampler<S: State> {
    particle: Particle<S>,
    init: Option<InitFn<S>>,
    moves: Vec<MoveFn<S>>,
    mcmcs: Vec<MoveFn<S>>,
    threshold: f64,
    iter_num: u64,
    initialized: bool,
    ess_history: Vec<f64>,
    resampled_history: Vec<bool>,
    accept_history: Vec<Vec<u32>>,
    monitors: Vec<(String, Monitor<S>)>,
    path: Option<Path<S>>,
}

impl<S: State> Sampler<S> {
    /// Create a sampler around a particle population.
    ///
    /// `resample_fraction` is the ESS/N ratio below which resampling
    /// triggers; it is converted to an absolute particle count once, here.
    /// A fraction below zero never resamples, above one always resamples.
    pub fn new(particle: Particle<S>, resample_fraction: f64) -> Self {
        let threshold = resample_fraction * particle.len() as f64;
        Self {
            particle,
            init: None,
            moves: Vec::new(),
            mcmcs: Vec::new(),
            threshold,
            iter_num: 0,
            initialized: false,
            ess_history: Vec::new(),
            resampled_history: Vec::new(),
            accept_history: Vec::new(),
            monitors: Vec::new(),
            path: None,
        }
    }

    /// Number of particles.
    pub fn size(&self) -> usize {
        self.particle.len()
    }

    /// Number of recorded iterations, the initialization step included.
    pub fn iter_size(&self) -> usize {
        self.ess_history.len()
    }

    /// The resampling threshold as an absolute particle count.
    pub fn resample_threshold(&self) -> f64 {
        self.threshold
    }

    pub fn particle(&self) -> &Particle<S> {
        &self.particle
    }

    pub fn particle_mut(&mut self) -> &mut Particle<S> {
        &mut self.particle
    }

    /// Set the initialization callback.
    pub fn init(&mut self, f: InitFn<S>) -> &mut Self {
        self.init = Some(f);
        self
    }

    /// Append a move callback, run before the resampling check.
    pub fn add_move(&mut self, f: MoveFn<S>) -> &mut Self {
        self.moves.push(f);
        self
    }

    pub fn clear_moves(&mut self) -> &mut Self {
        self.moves.clear();
        self
    }

    /// Append an MCMC callback, run after the resampling check.
    pub fn add_mcmc(&mut self, f: MoveFn<S>) -> &mut Self {
        self.mcmcs.push(f);
        self
    }

    pub fn clear_mcmcs(&mut self) -> &mut Self {
        self.mcmcs.clear();
        self
    }

    /// Register a named monitor. Monitors are evaluated in registration
    /// order after each iteration.
    pub fn add_monitor(&mut self, name: impl Into<String>, monitor: Monitor<S>) -> &mut Self {
        self.monitors.push((name.into(), monitor));
        self
    }

    pub fn monitor(&self, name: &str) -> Option<&Monitor<S>> {
        self.monitors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    pub fn remove_monitor(&mut self, name: &str) -> Option<Monitor<S>> {
        let pos = self.monitors.iter().position(|(n, _)| n == name)?;
        Some(self.monitors.remove(pos).1)
    }

    pub fn clear_monitors(&mut self) -> &mut Self {
        self.monitors.clear();
        self
    }

    /// Set the path-sampling evaluation callback.
    pub fn set_path(&mut self, eval: PathEval<S>) -> &mut Self {
        self.path = Some(Path::new(eval));
        self
    }

    pub fn path(&self) -> Option<&Path<S>> {
        self.path.as_ref()
    }

    /// Trapezoid path-sampling estimate of the log normalizing-constant
    /// ratio; zero if no path is registered.
    pub fn path_sampling(&self) -> f64 {
        self.path.as_ref().map_or(0f64, |path| path.zconst())
    }

    /// The weight set's running log normalizing-constant estimate.
    pub fn zconst(&self) -> f64 {
        self.particle.weight().zconst()
    }

    pub fn ess_history(&self) -> &[f64] {
        &self.ess_history
    }

    pub fn resampled_history(&self) -> &[bool] {
        &self.resampled_history
    }

    /// Accept counts per callback, one inner vector per iteration.
    pub fn accept_history(&self) -> &[Vec<u32>] {
        &self.accept_history
    }

    /// Run the initialization step.
    ///
    /// Clears all histories, monitors and the path, resets the iteration
    /// counter, invokes the initialization callback and records iteration 0
    /// (threshold check and monitor evaluation included).
    pub fn initialize(&mut self) -> Result<()> {
        self.ess_history.clear();
        self.resampled_history.clear();
        self.accept_history.clear();
        if let Some(path) = &mut self.path {
            path.clear();
        }
        for (_, monitor) in self.monitors.iter_mut() {
            monitor.clear();
        }
        self.iter_num = 0;

        let mut init = self.init.take().ok_or(SmcError::MissingInitializer)?;
        let outcome = init(&mut self.particle);
        self.init = Some(init);
        let accepts = outcome?;

        self.accept_history.push(vec![accepts]);
        self.do_resampling()?;
        self.do_monitoring();
        self.initialized = true;
        Ok(())
    }

    /// Run `num` iterations. Fails if the sampler was never initialized.
    pub fn iterate(&mut self, num: u64) -> Result<()> {
        if !self.initialized {
            return Err(SmcError::NotInitialized.into());
        }

        for _ in 0..num {
            self.iter_num += 1;
            let iter = self.iter_num;
            let mut accepts = Vec::with_capacity(self.moves.len() + self.mcmcs.len());

            for f in self.moves.iter_mut() {
                accepts.push(f(iter, &mut self.particle)?);
            }

            self.do_resampling()?;

            for f in self.mcmcs.iter_mut() {
                accepts.push(f(iter, &mut self.particle)?);
            }

            self.do_monitoring();
            self.accept_history.push(accepts);
        }
        Ok(())
    }

    fn do_resampling(&mut self) -> Result<()> {
        self.particle.resample(self.threshold)?;
        self.ess_history.push(self.particle.ess());
        self.resampled_history.push(self.particle.resampled());
        Ok(())
    }

    fn do_monitoring(&mut self) {
        if let Some(path) = &mut self.path {
            path.eval(self.iter_num, &self.particle);
        }
        for (_, monitor) in self.monitors.iter_mut() {
            monitor.eval(self.iter_num, &self.particle);
        }
    }

    /// Write the full iteration history as delimited text, one row per
    /// iteration.
    ///
    /// Columns: iteration, ESS/N, resampled flag, accept rates, then path
    /// and monitor series. Iterations at which a path or monitor recorded
    /// nothing get the configured placeholder.
    pub fn write_history<W: io::Write>(&self, writer: &mut W, format: &HistoryFormat) -> io::Result<()> {
        let iters = self.iter_size();
        let n = self.size() as f64;
        let sep = format.sep;

        let accept_width = self
            .accept_history
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        // Map iteration number -> record position for sparse series.
        let position_mask = |index: &[u64]| {
            let mut mask = vec![None; iters];
            for (pos, &iter) in index.iter().enumerate() {
                mask[iter as usize] = Some(pos);
            }
            mask
        };

        let path_mask = self.path.as_ref().map(|path| position_mask(path.index()));
        let monitor_masks: Vec<Vec<Option<usize>>> = self
            .monitors
            .iter()
            .map(|(_, monitor)| position_mask(monitor.index()))
            .collect();

        if format.header {
            write!(writer, "Iter{sep}ESS{sep}Resampled")?;
            for d in 0..accept_width {
                if accept_width == 1 {
                    write!(writer, "{sep}Accept")?;
                } else {
                    write!(writer, "{sep}Accept.{}", d + 1)?;
                }
            }
            if self.path.is_some() {
                write!(writer, "{sep}Path.Integrand{sep}Path.Width{sep}Path.Grid")?;
            }
            for (name, monitor) in self.monitors.iter() {
                if monitor.dim() == 1 {
                    write!(writer, "{sep}{name}")?;
                } else {
                    for d in 0..monitor.dim() {
                        write!(writer, "{sep}{name}.{}", d + 1)?;
                    }
                }
            }
            writeln!(writer)?;
        }

        for iter in 0..iters {
            write!(
                writer,
                "{iter}{sep}{}{sep}{}",
                self.ess_history[iter] / n,
                self.resampled_history[iter]
            )?;
            let accepts = &self.accept_history[iter];
            for d in 0..accept_width {
                match accepts.get(d) {
                    Some(&count) => write!(writer, "{sep}{}", count as f64 / n)?,
                    None => write!(writer, "{sep}0")?,
                }
            }
            if let (Some(path), Some(mask)) = (&self.path, &path_mask) {
                match mask[iter] {
                    Some(pos) => write!(
                        writer,
                        "{sep}{}{sep}{}{sep}{}",
                        path.integrand()[pos],
                        path.width()[pos],
                        path.grid()[pos]
                    )?,
                    None => write!(
                        writer,
                        "{sep}{missing}{sep}{missing}{sep}{missing}",
                        missing = format.missing
                    )?,
                }
            }
            for ((_, monitor), mask) in self.monitors.iter().zip(monitor_masks.iter()) {
                match mask[iter] {
                    Some(pos) => {
                        for d in 0..monitor.dim() {
                            write!(writer, "{sep}{}", monitor.record(d)[pos])?;
                        }
                    }
                    None => {
                        for _ in 0..monitor.dim() {
                            write!(writer, "{sep}{}", format.missing)?;
                        }
                    }
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Formatting options for [`Sampler::write_history`].
#[derive(Debug, Clone)]
pub struct HistoryFormat {
    pub header: bool,
    pub sep: char,
    /// Placeholder for iterations without a path or monitor record.
    pub missing: String,
}

impl Default for HistoryFormat {
    fn default() -> Self {
        Self {
            header: true,
            sep: ',',
            missing: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorEval;
    use crate::resample::ResampleScheme;
    use crate::seed::SeedAllocator;
    use crate::state::StateMatrix;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn sampler(n: usize, fraction: f64) -> Sampler<StateMatrix> {
        let seeds = SeedAllocator::new(3);
        let particle = Particle::matrix(n, 1, ResampleScheme::Stratified, &seeds);
        Sampler::new(particle, fraction)
    }

    #[test]
    fn iterate_before_initialize_is_an_error() {
        let mut sampler = sampler(10, 0.5);
        let err = sampler.iterate(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SmcError>(),
            Some(SmcError::NotInitialized)
        ));
    }

    #[test]
    fn initialize_without_callback_is_an_error() {
        let mut sampler = sampler(10, 0.5);
        let err = sampler.initialize().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SmcError>(),
            Some(SmcError::MissingInitializer)
        ));
    }

    #[test]
    fn histories_grow_one_entry_per_iteration() {
        let mut sampler = sampler(10, 0.5);
        sampler.init(Box::new(|_particle| Ok(0)));
        sampler.add_move(Box::new(|_iter, _particle| Ok(3)));
        sampler.add_mcmc(Box::new(|_iter, _particle| Ok(7)));

        sampler.initialize().unwrap();
        sampler.iterate(4).unwrap();

        assert_eq!(sampler.iter_size(), 5);
        assert_eq!(sampler.ess_history().len(), 5);
        assert_eq!(sampler.resampled_history().len(), 5);
        assert_eq!(sampler.accept_history().len(), 5);
        assert_eq!(sampler.accept_history()[0], vec![0]);
        for iter in 1..5 {
            assert_eq!(sampler.accept_history()[iter], vec![3, 7]);
        }
    }

    #[test]
    fn resampling_happens_between_move_and_mcmc() {
        let mut sampler = sampler(8, 2.0); // always resample
        let log = Arc::new(Mutex::new(Vec::new()));

        sampler.init(Box::new(|_particle| Ok(0)));

        let move_log = log.clone();
        sampler.add_move(Box::new(move |_iter, particle| {
            // Skew the weights so resampling has something to undo.
            let mut logw = vec![0f64; particle.len()];
            logw[0] = 30.0;
            particle.weight_mut().set_log_weight(&logw);
            move_log.lock().unwrap().push("move");
            Ok(0)
        }));

        let mcmc_log = log.clone();
        sampler.add_mcmc(Box::new(move |_iter, particle| {
            // MCMC must observe the post-resampling uniform weights.
            let n = particle.len() as f64;
            assert!(particle
                .weight()
                .weights()
                .iter()
                .all(|&w| (w - 1.0 / n).abs() < 1e-12));
            mcmc_log.lock().unwrap().push("mcmc");
            Ok(0)
        }));

        sampler.initialize().unwrap();
        sampler.iterate(2).unwrap();
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["move", "mcmc", "move", "mcmc"]
        );
    }

    #[test]
    fn initialize_clears_previous_run() {
        let mut sampler = sampler(10, 0.5);
        sampler.init(Box::new(|_particle| Ok(1)));
        sampler.add_monitor(
            "mean",
            Monitor::new(1, MonitorEval::Direct(Box::new(|_, _, out| out[0] = 2.0))),
        );
        sampler.initialize().unwrap();
        sampler.iterate(3).unwrap();
        assert_eq!(sampler.iter_size(), 4);

        sampler.initialize().unwrap();
        assert_eq!(sampler.iter_size(), 1);
        assert_eq!(sampler.monitor("mean").unwrap().iter_size(), 1);
    }

    #[test]
    fn monitors_keep_registration_order() {
        let mut sampler = sampler(4, 0.5);
        sampler.init(Box::new(|_particle| Ok(0)));
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["b", "a", "c"] {
            let order = order.clone();
            sampler.add_monitor(
                name,
                Monitor::new(
                    1,
                    MonitorEval::Direct(Box::new(move |_, _, out| {
                        order.lock().unwrap().push(name);
                        out[0] = 0.0;
                    })),
                ),
            );
        }
        sampler.initialize().unwrap();
        assert_eq!(order.lock().unwrap().as_slice(), &["b", "a", "c"]);
    }

    #[test]
    fn history_export_marks_missing_records() {
        let mut sampler = sampler(4, 0.5);
        sampler.init(Box::new(|_particle| Ok(2)));
        sampler.add_move(Box::new(|_iter, _particle| Ok(4)));
        sampler.add_monitor(
            "late",
            Monitor::new(
                1,
                MonitorEval::Direct(Box::new(|_, _, out| out[0] = 9.0)),
            ),
        );
        sampler.initialize().unwrap();
        // Drop the monitor's iteration-0 record to leave a hole.
        let mut monitor = sampler.remove_monitor("late").unwrap();
        monitor.clear();
        sampler.add_monitor("late", monitor);
        sampler.iterate(1).unwrap();

        let format = HistoryFormat {
            missing: "NA".into(),
            ..Default::default()
        };
        let mut out = Vec::new();
        sampler.write_history(&mut out, &format).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Iter,ESS,Resampled,Accept,late");
        assert!(lines[1].starts_with("0,1,false,0.5,NA"));
        assert!(lines[2].starts_with("1,1,false,1,9"));
    }
}
