//! First-order finite-volume patch solvers.
//!
//! These are the solver-side collaborators the engine calls into: a
//! [`FiniteVolumeSolver`] implements [`PatchSolver`] for any
//! [`ConservationLaw`], with piecewise-constant reconstruction and HLLE
//! fluxes, either unsplit or dimensionally split as the patch requests.

pub mod acoustics;
pub mod boundary;
pub mod error;
pub mod shallow_water;

use crate::callbacks::{PatchSolver, StepOutcome};
use crate::error::CallbackError;
use crate::index_space::{Axis, IndexSpace, Side};
use crate::patch::{PatchGeometry, PatchState};

pub use acoustics::Acoustics;
pub use boundary::{BoundaryConditions, BoundaryKind};
pub use error::SolverError;
pub use shallow_water::ShallowWater;




/**
 * A hyperbolic system in conserved variables, as seen by a first-order
 * finite-volume update.
 */
pub trait ConservationLaw {

    fn num_eqn(&self) -> usize;

    /// The field holding the velocity (or momentum) normal to faces along
    /// `axis`; it changes sign at a wall.
    fn normal_component(&self, axis: Axis) -> usize;

    fn max_wave_speed(&self, q: &[f64], axis: Axis) -> Result<f64, SolverError>;

    fn riemann_flux(&self, ql: &[f64], qr: &[f64], axis: Axis, flux: &mut [f64]) -> Result<(), SolverError>;

    fn check_admissible(&self, q: &[f64]) -> Result<(), SolverError>;
}




/**
 * The HLLE flux from the outer wavespeeds `am <= ap` of a Riemann problem.
 */
pub fn riemann_hlle(ul: &[f64], ur: &[f64], fl: &[f64], fr: &[f64], am: f64, ap: f64, flux: &mut [f64]) {
    let ap = ap.max(0.0);
    let am = am.min(0.0);

    for n in 0..flux.len() {
        flux[n] = if ap > am {
            (fl[n] * ap - fr[n] * am - (ul[n] - ur[n]) * ap * am) / (ap - am)
        } else {
            0.5 * (fl[n] + fr[n])
        };
    }
}




type InitialCondition = dyn Fn((f64, f64), &mut [f64]);

/**
 * Initial condition with one state inside a circle and another outside.
 */
pub fn circular_step(center: (f64, f64), radius: f64, inside: Vec<f64>, outside: Vec<f64>) -> impl Fn((f64, f64), &mut [f64]) {
    move |(x, y): (f64, f64), q: &mut [f64]| {
        let r = ((x - center.0).powi(2) + (y - center.1).powi(2)).sqrt();
        q.copy_from_slice(if r <= radius { &inside } else { &outside });
    }
}




/**
 * A first-order Godunov-type solver for a conservation law on one patch.
 */
pub struct FiniteVolumeSolver<L> {
    pub law: L,
    pub boundary: BoundaryConditions,
    /// Largest Courant number a step may be taken at.
    pub cfl_max: f64,
    /// Courant number the timestep is chosen for when it has to be reduced.
    pub cfl_desired: f64,
    initial_condition: Box<InitialCondition>,
}




// ============================================================================
impl<L: ConservationLaw> FiniteVolumeSolver<L> {

    pub fn new<F>(law: L, boundary: BoundaryConditions, initial_condition: F) -> Self
    where
        F: Fn((f64, f64), &mut [f64]) + 'static,
    {
        Self {
            law,
            boundary,
            cfl_max: 0.5,
            cfl_desired: 0.45,
            initial_condition: Box::new(initial_condition),
        }
    }

    pub fn with_cfl(mut self, cfl_max: f64, cfl_desired: f64) -> Self {
        self.cfl_max = cfl_max;
        self.cfl_desired = cfl_desired;
        self
    }

    /**
     * The Courant number per unit timestep over every cell the update reads.
     * Under dimensional splitting each sweep is limited on its own; unsplit,
     * the two directions add up.
     */
    fn courant_rate(&self, g: &PatchGeometry, q: &[f64]) -> Result<f64, SolverError> {
        let n = self.law.num_eqn();
        let extended = g.extended();
        let interior = g.interior();
        let (dx, dy) = g.cell_spacing();

        let widen = |cells: &IndexSpace, axis: Axis| {
            let r = cells.range(axis);
            cells.with_range(axis, r.start - 1..r.end + 1)
        };
        let x_cells = if g.dimensional_splitting {
            widen(&interior.with_range(Axis::J, extended.range(Axis::J)), Axis::I)
        } else {
            widen(&interior, Axis::I)
        };
        let y_cells = widen(&interior, Axis::J);

        let max_speed = |cells: IndexSpace, axis: Axis| -> Result<f64, SolverError> {
            let mut s = 0.0f64;
            for index in cells.iter() {
                let o = extended.row_major_offset(index) * n;
                s = s.max(self.law.max_wave_speed(&q[o..o + n], axis)?);
            }
            Ok(s)
        };
        let sx = max_speed(x_cells, Axis::I)?;
        let sy = max_speed(y_cells, Axis::J)?;

        if g.dimensional_splitting {
            Ok((sx / dx).max(sy / dy))
        } else {
            Ok(sx / dx + sy / dy)
        }
    }

    /**
     * Riemann fluxes on all faces along `axis` bounding the given cells.
     * Face `f` separates cells `f - 1` and `f`.
     */
    fn fluxes(&self, g: &PatchGeometry, q: &[f64], axis: Axis, cells: &IndexSpace) -> Result<Vec<f64>, SolverError> {
        let n = self.law.num_eqn();
        let extended = g.extended();
        let faces = cells.extend_upper(1, axis);
        let mut flux = vec![0.0; faces.len() * n];

        for (k, face) in faces.iter().enumerate() {
            let l = extended.row_major_offset(shift(face, axis, -1)) * n;
            let r = extended.row_major_offset(face) * n;
            self.law.riemann_flux(&q[l..l + n], &q[r..r + n], axis, &mut flux[k * n..(k + 1) * n])?;
        }
        Ok(flux)
    }

    fn apply(&self, g: &PatchGeometry, q: &mut [f64], flux: &[f64], axis: Axis, cells: &IndexSpace, dt_over_dx: f64) {
        let n = self.law.num_eqn();
        let extended = g.extended();
        let faces = cells.extend_upper(1, axis);

        for index in cells.iter() {
            let fm = faces.row_major_offset(index) * n;
            let fp = faces.row_major_offset(shift(index, axis, 1)) * n;
            let s = extended.row_major_offset(index) * n;

            for m in 0..n {
                q[s + m] -= dt_over_dx * (flux[fp + m] - flux[fm + m]);
            }
        }
    }

    /**
     * Advance the interior of `q` by `dt`. Under splitting the I sweep also
     * updates the ghost rows, which the J sweep reads.
     */
    fn update(&self, g: &PatchGeometry, q: &mut [f64], dt: f64) -> Result<(), SolverError> {
        let (dx, dy) = g.cell_spacing();
        let interior = g.interior();

        if g.dimensional_splitting {
            let rows = interior.with_range(Axis::J, g.extended().range(Axis::J));
            let fi = self.fluxes(g, q, Axis::I, &rows)?;
            self.apply(g, q, &fi, Axis::I, &rows, dt / dx);
            let fj = self.fluxes(g, q, Axis::J, &interior)?;
            self.apply(g, q, &fj, Axis::J, &interior, dt / dy);
        } else {
            let fi = self.fluxes(g, q, Axis::I, &interior)?;
            let fj = self.fluxes(g, q, Axis::J, &interior)?;
            self.apply(g, q, &fi, Axis::I, &interior, dt / dx);
            self.apply(g, q, &fj, Axis::J, &interior, dt / dy);
        }
        Ok(())
    }
}

fn shift(index: (i64, i64), axis: Axis, delta: i64) -> (i64, i64) {
    match axis {
        Axis::I => (index.0 + delta, index.1),
        Axis::J => (index.0, index.1 + delta),
    }
}




// ============================================================================
impl<L: ConservationLaw> PatchSolver for FiniteVolumeSolver<L> {

    fn initialize(&self, patch: &mut PatchState) -> Result<(), CallbackError> {
        let g = *patch.geometry();

        if g.num_eqn != self.law.num_eqn() {
            return Err(CallbackError::Fatal(format!("patch carries {} equations, solver expects {}", g.num_eqn, self.law.num_eqn())));
        }
        for index in g.interior().iter() {
            (self.initial_condition)(g.cell_center(index), patch.get_slice_mut(index));
        }
        Ok(())
    }

    fn fill_boundary(&self, patch: &mut PatchState, axis: Axis, side: Side) -> Result<(), CallbackError> {
        self.boundary.fill(patch, axis, side, self.law.normal_component(axis));
        Ok(())
    }

    fn step(&self, patch: &mut PatchState, max_dt: f64) -> Result<StepOutcome, CallbackError> {
        if !(max_dt.is_finite() && max_dt > 0.0) {
            return Err(CallbackError::Fatal(format!("offered timestep {} is not positive", max_dt)));
        }
        let g = *patch.geometry();
        let rate = self.courant_rate(&g, patch.q())?;

        let dt = if rate * max_dt <= self.cfl_max {
            max_dt
        } else {
            self.cfl_desired / rate
        };

        let mut q = patch.q().to_vec();
        self.update(&g, &mut q, dt)?;

        let extended = g.extended();
        let n = self.law.num_eqn();

        for index in g.interior().iter() {
            let s = extended.row_major_offset(index) * n;
            if let Err(e) = self.law.check_admissible(&q[s..s + n]) {
                return Err(CallbackError::StepRejected { suggested_dt: Some(0.5 * dt), reason: e.to_string() });
            }
        }
        for index in g.interior().iter() {
            let s = extended.row_major_offset(index) * n;
            patch.get_slice_mut(index).copy_from_slice(&q[s..s + n]);
        }

        let rate = self.courant_rate(&g, patch.q())?;
        let dt_estimated = if rate > 0.0 { self.cfl_desired / rate } else { dt };

        Ok(StepOutcome { dt_used: dt, dt_estimated })
    }
}
