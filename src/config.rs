//! Engine construction parameters.
//!
//! [`EngineConfig`] is the typed, serializable configuration a host builds
//! once. [`ConstructionParameters`] is its positional ABI rendering (three
//! axes, `i32` counts, C string path), produced only after validation.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InitializationError;
use crate::state::State;

/// Name of the engine configuration file, looked up next to the host
/// executable by default.
pub const CONFIGURATION_FILE_NAME: &str = "peanoclaw-config.xml";




/// Which engine implementation backs a handle.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Backend {
    /// The shared Peano library. `library_dir` overrides the search path.
    Native { library_dir: Option<PathBuf> },
    /// The in-process reference engine.
    Reference(ReferenceSettings),
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Native { library_dir: None }
    }
}




/// Tunables of the in-process reference engine.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    /// How many times one step may be retried after rejections before the
    /// evolution fails.
    pub max_retries: u32,
    /// Install a SIGINT handler at construction, as native engines do.
    pub install_interrupt_handler: bool,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            max_retries: 8,
            install_interrupt_handler: false,
        }
    }
}




/// Global simulation parameters, fixed when the engine is created.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for the cell width of the initial grid.
    pub initial_minimal_mesh_width: f64,
    pub domain_origin: [f64; 2],
    pub domain_size: [f64; 2],
    /// Cells per patch along each axis.
    pub subdivision_factor: [usize; 2],
    pub num_eqn: usize,
    pub num_aux: usize,
    pub ghost_layer_width: usize,
    pub dt_initial: f64,
    pub configuration_file: PathBuf,
    pub use_dimensional_splitting: bool,
    pub backend: Backend,
}




/// Positional, ABI-typed rendering of an [`EngineConfig`].
///
#[derive(Debug)]
pub struct ConstructionParameters {
    pub initial_minimal_mesh_width: f64,
    pub domain_origin: [f64; 3],
    pub domain_size: [f64; 3],
    pub subdivision_factor: [i32; 3],
    pub unknowns_per_cell: i32,
    pub aux_fields_per_cell: i32,
    pub ghostlayer_width: i32,
    pub dt_initial: f64,
    pub configuration_file: CString,
    pub use_dimensional_splitting: bool,
}




// ============================================================================
impl EngineConfig {

    /// Derive the engine configuration from the solver-side state: the
    /// domain bounds give origin and size, and the cell count of each grid
    /// dimension becomes the per-patch subdivision factor.
    ///
    pub fn from_state(
        state: &State,
        initial_minimal_mesh_width: f64,
        ghost_layer_width: usize,
        dt_initial: f64,
        use_dimensional_splitting: bool,
    ) -> Self {
        let [x, y] = state.domain.dimensions();
        Self {
            initial_minimal_mesh_width,
            domain_origin: [x.lower, y.lower],
            domain_size: [x.extent(), y.extent()],
            subdivision_factor: [x.num_cells, y.num_cells],
            num_eqn: state.num_eqn,
            num_aux: state.num_aux,
            ghost_layer_width,
            dt_initial,
            configuration_file: Self::default_configuration_file(),
            use_dimensional_splitting,
            backend: Backend::default(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_configuration_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.configuration_file = path.as_ref().to_path_buf();
        self
    }

    /// `peanoclaw-config.xml` in the directory of the running executable,
    /// or in the working directory if that cannot be determined.
    ///
    pub fn default_configuration_file() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIGURATION_FILE_NAME)
    }

    /// Check the parameters for consistency. Nothing is loaded or allocated
    /// before this succeeds.
    ///
    pub fn validate(&self) -> Result<(), InitializationError> {
        let fail = |reason: String| Err(InitializationError::InvalidConfig(reason));

        if !(self.initial_minimal_mesh_width.is_finite() && self.initial_minimal_mesh_width > 0.0) {
            return fail(format!("initial minimal mesh width must be positive, got {}", self.initial_minimal_mesh_width));
        }
        for axis in 0..2 {
            if !self.domain_origin[axis].is_finite() {
                return fail(format!("domain origin on axis {} is not finite", axis));
            }
            if !(self.domain_size[axis].is_finite() && self.domain_size[axis] > 0.0) {
                return fail(format!("domain size on axis {} must be positive, got {}", axis, self.domain_size[axis]));
            }
            if self.subdivision_factor[axis] == 0 {
                return fail(format!("subdivision factor on axis {} must be positive", axis));
            }
            if self.subdivision_factor[axis] > i32::MAX as usize {
                return fail(format!("subdivision factor on axis {} is too large", axis));
            }
        }
        if self.num_eqn == 0 {
            return fail("number of equations must be positive".to_string());
        }
        if self.num_eqn > i32::MAX as usize || self.num_aux > i32::MAX as usize {
            return fail("equation or auxiliary field count is too large".to_string());
        }
        if self.ghost_layer_width == 0 {
            return fail("ghost layer width must be at least one".to_string());
        }
        let min_subdivision = self.subdivision_factor[0].min(self.subdivision_factor[1]);
        if self.ghost_layer_width > min_subdivision {
            return fail(format!(
                "ghost layer width {} exceeds the subdivision factor {}",
                self.ghost_layer_width, min_subdivision
            ));
        }
        if !(self.dt_initial.is_finite() && self.dt_initial > 0.0) {
            return fail(format!("initial timestep must be positive, got {}", self.dt_initial));
        }
        Ok(())
    }

    /// Validate and convert into the positional ABI parameters.
    ///
    pub fn construction_parameters(&self) -> Result<ConstructionParameters, InitializationError> {
        self.validate()?;

        let path = self.configuration_file.to_string_lossy().into_owned();
        let configuration_file = CString::new(path).map_err(|_| {
            InitializationError::InvalidConfig("configuration file path contains a NUL byte".to_string())
        })?;

        Ok(ConstructionParameters {
            initial_minimal_mesh_width: self.initial_minimal_mesh_width,
            domain_origin: [self.domain_origin[0], self.domain_origin[1], 0.0],
            domain_size: [self.domain_size[0], self.domain_size[1], 0.0],
            subdivision_factor: [self.subdivision_factor[0] as i32, self.subdivision_factor[1] as i32, 0],
            unknowns_per_cell: self.num_eqn as i32,
            aux_fields_per_cell: self.num_aux as i32,
            ghostlayer_width: self.ghost_layer_width as i32,
            dt_initial: self.dt_initial,
            configuration_file,
            use_dimensional_splitting: self.use_dimensional_splitting,
        })
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Backend, EngineConfig, ReferenceSettings, CONFIGURATION_FILE_NAME};
    use crate::error::InitializationError;
    use crate::state::{Dimension, Domain, State};

    fn config() -> EngineConfig {
        let x = Dimension::new("x", 0.0, 1.0, 6);
        let y = Dimension::new("y", -1.0, 1.0, 4);
        let state = State::new(Domain::new(x, y), 3);
        EngineConfig::from_state(&state, 1.0 / 54.0, 2, 1.0, true)
            .with_backend(Backend::Reference(ReferenceSettings::default()))
    }

    #[test]
    fn config_is_derived_from_the_solver_state() {
        let c = config();
        assert_eq!(c.domain_origin, [0.0, -1.0]);
        assert_eq!(c.domain_size, [1.0, 2.0]);
        assert_eq!(c.subdivision_factor, [6, 4]);
        assert_eq!(c.num_eqn, 3);
        assert_eq!(c.num_aux, 0);
        assert!(c.configuration_file.ends_with(CONFIGURATION_FILE_NAME));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn construction_parameters_zero_the_third_axis() {
        let p = config().construction_parameters().unwrap();
        assert_eq!(p.domain_origin[2], 0.0);
        assert_eq!(p.domain_size[2], 0.0);
        assert_eq!(p.subdivision_factor, [6, 4, 0]);
        assert_eq!(p.unknowns_per_cell, 3);
        assert!(p.use_dimensional_splitting);
    }

    #[test]
    fn zero_subdivision_factor_is_rejected() {
        for axis in 0..2 {
            let mut c = config();
            c.subdivision_factor[axis] = 0;
            assert!(matches!(c.validate(), Err(InitializationError::InvalidConfig(_))));
        }
    }

    #[test]
    fn inconsistent_parameters_are_rejected() {
        let mut c = config();
        c.ghost_layer_width = 5;
        assert!(c.validate().is_err());

        let mut c = config();
        c.dt_initial = 0.0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.domain_size[1] = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = config();
        c.num_eqn = 0;
        assert!(c.validate().is_err());

        let c = config().with_configuration_file("bad\0path.xml");
        assert!(c.construction_parameters().is_err());
    }

    #[test]
    fn config_survives_cbor() {
        let c = config();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&c, &mut bytes).unwrap();
        let back: EngineConfig = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(back, c);
    }
}
