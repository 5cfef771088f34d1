use crate::index_space::Axis;
use crate::state::State;
use super::error::SolverError;
use super::{riemann_hlle, ConservationLaw};




/**
 * Linear acoustics in a uniform medium, `(p, u, v)`.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Acoustics {
    pub rho: f64,
    pub bulk: f64,
}




// ============================================================================
impl Acoustics {

    pub fn new(rho: f64, bulk: f64) -> Self {
        Self { rho, bulk }
    }

    /// Read density and bulk modulus from the `rho` and `bulk` problem
    /// parameters, defaulting to 1 and 4.
    ///
    pub fn from_state(state: &State) -> Self {
        Self::new(
            state.problem_value("rho").unwrap_or(1.0),
            state.problem_value("bulk").unwrap_or(4.0))
    }

    pub fn sound_speed(&self) -> f64 {
        (self.bulk / self.rho).sqrt()
    }

    pub fn impedance(&self) -> f64 {
        self.rho * self.sound_speed()
    }

    /// Publish the medium parameters, and the derived sound speed `cc` and
    /// impedance `zz`, as problem data.
    ///
    pub fn set_problem_data(&self, state: &mut State) {
        state.set_problem_data("rho", self.rho);
        state.set_problem_data("bulk", self.bulk);
        state.set_problem_data("zz", self.impedance());
        state.set_problem_data("cc", self.sound_speed());
    }

    fn flux_vector(&self, q: &[f64], axis: Axis, f: &mut [f64]) {
        let n = self.normal_component(axis);
        f[0] = self.bulk * q[n];
        f[1] = 0.0;
        f[2] = 0.0;
        f[n] = q[0] / self.rho;
    }
}




// ============================================================================
impl ConservationLaw for Acoustics {

    fn num_eqn(&self) -> usize {
        3
    }

    fn normal_component(&self, axis: Axis) -> usize {
        match axis {
            Axis::I => 1,
            Axis::J => 2,
        }
    }

    fn max_wave_speed(&self, q: &[f64], _: Axis) -> Result<f64, SolverError> {
        self.check_admissible(q)?;
        Ok(self.sound_speed())
    }

    fn riemann_flux(&self, ql: &[f64], qr: &[f64], axis: Axis, flux: &mut [f64]) -> Result<(), SolverError> {
        self.check_admissible(ql)?;
        self.check_admissible(qr)?;
        let c = self.sound_speed();
        let mut fl = [0.0; 3];
        let mut fr = [0.0; 3];
        self.flux_vector(ql, axis, &mut fl);
        self.flux_vector(qr, axis, &mut fr);
        riemann_hlle(ql, qr, &fl, &fr, -c, c, flux);
        Ok(())
    }

    fn check_admissible(&self, q: &[f64]) -> Result<(), SolverError> {
        if q.iter().all(|x| x.is_finite()) {
            Ok(())
        } else {
            Err(SolverError::NonFiniteState)
        }
    }
}
