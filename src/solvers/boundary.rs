use serde::{Deserialize, Serialize};

use crate::index_space::{Axis, Side};
use crate::patch::PatchState;




/// How ghost cells outside the physical domain are filled.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Mirror the interior and negate the normal velocity component.
    Wall,
    /// Copy the outermost interior cell (zero-order extrapolation).
    Extrapolation,
}




/// Boundary kinds per axis, for the lower and upper faces.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConditions {
    pub lower: [BoundaryKind; 2],
    pub upper: [BoundaryKind; 2],
}




// ============================================================================
impl BoundaryConditions {

    pub fn uniform(kind: BoundaryKind) -> Self {
        Self { lower: [kind; 2], upper: [kind; 2] }
    }

    pub fn kind(&self, axis: Axis, side: Side) -> BoundaryKind {
        match side {
            Side::Lower => self.lower[axis.dimension()],
            Side::Upper => self.upper[axis.dimension()],
        }
    }

    /**
     * Fill the ghost strip of one face, corners included. Only ghost cells
     * are written. `normal` is the field holding the velocity (or momentum)
     * component normal to faces along `axis`.
     */
    pub fn fill(&self, patch: &mut PatchState, axis: Axis, side: Side, normal: usize) {
        let kind = self.kind(axis, side);
        let n = patch.geometry().subdivision_factor[axis.dimension()] as i64;
        let strip = patch.geometry().ghost_region(axis, side);

        for index in strip.iter() {
            let c = match axis {
                Axis::I => index.0,
                Axis::J => index.1,
            };
            let source = match (kind, side) {
                (BoundaryKind::Wall, Side::Lower) => -1 - c,
                (BoundaryKind::Wall, Side::Upper) => 2 * n - 1 - c,
                (BoundaryKind::Extrapolation, Side::Lower) => 0,
                (BoundaryKind::Extrapolation, Side::Upper) => n - 1,
            };
            let source = match axis {
                Axis::I => (source, index.1),
                Axis::J => (index.0, source),
            };
            patch.copy_cell(source, index);

            if kind == BoundaryKind::Wall {
                patch.get_slice_mut(index)[normal] *= -1.0;
            }
        }
    }
}
