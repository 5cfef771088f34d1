//! Solver-side description of the problem: the grid a solver was set up
//! with, its equation counts and named problem parameters. The engine
//! configuration is derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InitializationError;




/// One axis of the solver-side grid.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub num_cells: usize,
}

impl Dimension {
    pub fn new(name: &str, lower: f64, upper: f64, num_cells: usize) -> Self {
        Self { name: name.to_string(), lower, upper, num_cells }
    }

    pub fn extent(&self) -> f64 {
        self.upper - self.lower
    }
}




/// A rectangular 2D domain.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    dimensions: [Dimension; 2],
}

impl Domain {
    pub fn new(x: Dimension, y: Dimension) -> Self {
        Self { dimensions: [x, y] }
    }

    /// Build a domain from a list of dimensions; only two are supported.
    ///
    pub fn from_dimensions(dimensions: Vec<Dimension>) -> Result<Self, InitializationError> {
        match <[Dimension; 2]>::try_from(dimensions) {
            Ok(dimensions) => Ok(Self { dimensions }),
            Err(d) => Err(InitializationError::InvalidConfig(format!(
                "expected a 2D domain, got {} dimensions",
                d.len()
            ))),
        }
    }

    pub fn dimensions(&self) -> &[Dimension; 2] {
        &self.dimensions
    }
}




/// The solver-side state a problem is configured with.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub domain: Domain,
    pub num_eqn: usize,
    pub num_aux: usize,
    problem_data: BTreeMap<String, f64>,
}

impl State {
    pub fn new(domain: Domain, num_eqn: usize) -> Self {
        Self {
            domain,
            num_eqn,
            num_aux: 0,
            problem_data: BTreeMap::new(),
        }
    }

    pub fn with_aux(mut self, num_aux: usize) -> Self {
        self.num_aux = num_aux;
        self
    }

    pub fn set_problem_data(&mut self, name: &str, value: f64) {
        self.problem_data.insert(name.to_string(), value);
    }

    pub fn problem_value(&self, name: &str) -> Option<f64> {
        self.problem_data.get(name).copied()
    }

    pub fn problem_data(&self) -> &BTreeMap<String, f64> {
        &self.problem_data
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Dimension, Domain, State};

    #[test]
    fn domain_requires_two_dimensions() {
        let x = Dimension::new("x", 0.0, 1.0, 6);
        assert!(Domain::from_dimensions(vec![x.clone()]).is_err());
        assert!(Domain::from_dimensions(vec![x.clone(), x.clone(), x.clone()]).is_err());
        let domain = Domain::from_dimensions(vec![x.clone(), Dimension::new("y", 0.0, 2.0, 3)]).unwrap();
        assert_eq!(domain.dimensions()[1].extent(), 2.0);
    }

    #[test]
    fn problem_data_is_a_named_scalar_map() {
        let x = Dimension::new("x", 0.0, 1.0, 6);
        let y = Dimension::new("y", 0.0, 1.0, 6);
        let mut state = State::new(Domain::new(x, y), 3);
        state.set_problem_data("rho", 1.0);
        state.set_problem_data("bulk", 4.0);
        state.set_problem_data("rho", 2.0);
        assert_eq!(state.problem_value("rho"), Some(2.0));
        assert_eq!(state.problem_value("cc"), None);
        assert_eq!(state.problem_data().len(), 2);
    }
}
