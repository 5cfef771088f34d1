//! Driving an engine forward in time, and the host loop around it.

use log::{debug, info};

use crate::engine::EngineHandle;
use crate::error::{Error, EvolutionError};
use crate::output::OutputWriter;
use crate::solution::{materialize, SolverState};
use crate::status::Status;




/**
 * Remembers how far the engine has been driven, so that targets already
 * reached cost nothing.
 */
#[derive(Clone, Debug, Default)]
pub struct EvolutionDriver {
    reached: Option<f64>,
}




// ============================================================================
impl EvolutionDriver {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn reached(&self) -> Option<f64> {
        self.reached
    }
}




// ============================================================================
impl EngineHandle {

    /**
     * Drive the engine until its time reaches `target_time`, and return the
     * time reached. A target at or before the last reached time returns
     * immediately without calling into the engine. After an error the
     * engine state is undefined and the handle should be destroyed.
     */
    pub fn evolve_to_time(&mut self, target_time: f64) -> Result<f64, Error> {
        if self.is_destroyed() {
            return Err(Error::UseAfterTeardown);
        }
        if target_time.is_nan() {
            return Err(EvolutionError::InvalidTarget(target_time).into());
        }
        if let Some(reached) = self.driver.reached {
            if target_time <= reached {
                return Ok(reached);
            }
        }
        if target_time.is_infinite() {
            return Err(EvolutionError::InvalidTarget(target_time).into());
        }

        let callbacks = self.registry.handles();
        let before = self.registry.stats().total();
        // Failures already recovered from in earlier calls.
        self.registry.clear_last_error();
        let engine = self.engine.as_deref_mut().ok_or(Error::UseAfterTeardown)?;

        let reached = match engine.evolve_to_time(target_time, &callbacks) {
            Ok(reached) => reached,
            Err(fault) => {
                return Err(EvolutionError::Aborted {
                    target_time,
                    status: fault.status,
                    detail: fault.detail,
                    callback: self.registry.take_last_error(),
                }
                .into());
            }
        };

        if reached.is_nan() || reached < target_time {
            return Err(EvolutionError::Aborted {
                target_time,
                status: Status::EngineFailure,
                detail: format!("engine stopped at t={}", reached),
                callback: self.registry.take_last_error(),
            }
            .into());
        }

        debug!(
            "evolved to t={} ({} callbacks)",
            reached,
            self.registry.stats().total() - before);

        self.driver.reached = Some(reached);
        Ok(reached)
    }
}




/**
 * The host loop: evolve to a sequence of evenly spaced output times and
 * materialize (and optionally write) the solution at each.
 */
pub struct Controller {
    pub t_final: f64,
    pub num_output_times: usize,
    pub output: Option<OutputWriter>,
}




// ============================================================================
impl Controller {

    pub fn new(t_final: f64, num_output_times: usize) -> Self {
        Self { t_final, num_output_times, output: None }
    }

    pub fn with_output(mut self, output: OutputWriter) -> Self {
        self.output = Some(output);
        self
    }

    /// The output times, `t_final * k / n` for `k = 0..=n`.
    ///
    pub fn output_times(&self) -> Vec<f64> {
        let n = self.num_output_times.max(1);
        (0..=n).map(|k| if k == n { self.t_final } else { self.t_final * k as f64 / n as f64 }).collect()
    }

    /**
     * Run the whole schedule, returning the solution of the last frame.
     */
    pub fn run(&self, handle: &mut EngineHandle) -> Result<SolverState, Error> {
        let mut state = self.frame(handle, 0, 0.0)?;

        for (frame, t) in self.output_times().into_iter().enumerate().skip(1) {
            state = self.frame(handle, frame, t)?;
        }
        Ok(state)
    }

    fn frame(&self, handle: &mut EngineHandle, frame: usize, t: f64) -> Result<SolverState, Error> {
        let reached = handle.evolve_to_time(t)?;
        let state = materialize(handle)?;

        if let Some(output) = &self.output {
            let path = output.write_frame(frame, &state)?;
            info!("frame {:04} t={:.4} written to {}", frame, reached, path.display());
        } else {
            info!("frame {:04} t={:.4}", frame, reached);
        }
        Ok(state)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Controller;

    #[test]
    fn output_times_end_exactly_at_the_final_time() {
        let times = Controller::new(0.5, 12).output_times();
        assert_eq!(times.len(), 13);
        assert_eq!(times[0], 0.0);
        assert_eq!(times[12], 0.5);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}
