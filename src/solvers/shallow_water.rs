use crate::index_space::Axis;
use crate::state::State;
use super::error::SolverError;
use super::{riemann_hlle, ConservationLaw};

/// Gravity used when the problem data does not name one.
pub const DEFAULT_GRAVITY: f64 = 1.0;




/**
 * The 2D shallow water equations in conserved form, `(h, hu, hv)`.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShallowWater {
    pub gravity: f64,
}




// ============================================================================
impl ShallowWater {

    pub fn new(gravity: f64) -> Self {
        Self { gravity }
    }

    /// Read the gravitational acceleration from the `grav` problem parameter.
    ///
    pub fn from_state(state: &State) -> Self {
        Self::new(state.problem_value("grav").unwrap_or(DEFAULT_GRAVITY))
    }

    fn depth(&self, q: &[f64]) -> Result<f64, SolverError> {
        if !q.iter().all(|x| x.is_finite()) {
            Err(SolverError::NonFiniteState)
        } else if q[0] <= 0.0 {
            Err(SolverError::NegativeDepth(q[0]))
        } else {
            Ok(q[0])
        }
    }

    fn normal_velocity(&self, q: &[f64], axis: Axis) -> f64 {
        q[self.normal_component(axis)] / q[0]
    }

    fn outer_wavespeeds(&self, q: &[f64], axis: Axis) -> Result<(f64, f64), SolverError> {
        let h = self.depth(q)?;
        let c = (self.gravity * h).sqrt();
        let un = self.normal_velocity(q, axis);
        Ok((un - c, un + c))
    }

    fn flux_vector(&self, q: &[f64], axis: Axis, f: &mut [f64]) {
        let h = q[0];
        let un = self.normal_velocity(q, axis);
        let p = 0.5 * self.gravity * h * h;
        f[0] = h * un;
        f[1] = q[1] * un;
        f[2] = q[2] * un;
        f[self.normal_component(axis)] += p;
    }
}




// ============================================================================
impl ConservationLaw for ShallowWater {

    fn num_eqn(&self) -> usize {
        3
    }

    fn normal_component(&self, axis: Axis) -> usize {
        match axis {
            Axis::I => 1,
            Axis::J => 2,
        }
    }

    fn max_wave_speed(&self, q: &[f64], axis: Axis) -> Result<f64, SolverError> {
        let (am, ap) = self.outer_wavespeeds(q, axis)?;
        Ok(am.abs().max(ap.abs()))
    }

    fn riemann_flux(&self, ql: &[f64], qr: &[f64], axis: Axis, flux: &mut [f64]) -> Result<(), SolverError> {
        let (alm, alp) = self.outer_wavespeeds(ql, axis)?;
        let (arm, arp) = self.outer_wavespeeds(qr, axis)?;
        let mut fl = [0.0; 3];
        let mut fr = [0.0; 3];
        self.flux_vector(ql, axis, &mut fl);
        self.flux_vector(qr, axis, &mut fr);
        riemann_hlle(ql, qr, &fl, &fr, alm.min(arm), alp.max(arp), flux);
        Ok(())
    }

    fn check_admissible(&self, q: &[f64]) -> Result<(), SolverError> {
        self.depth(q).map(|_| ())
    }
}
