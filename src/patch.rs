//! The data contract for one adaptive mesh patch.
//!
//! [`PatchDescriptor`] is what crosses the C ABI: geometry, counts and raw
//! pointers to the engine-owned buffers. Solver-side code never sees it;
//! callbacks receive a [`PatchState`] (or [`PatchRef`] for read-only roles),
//! which borrows the engine buffers for the duration of one invocation.
//!
//! Buffers cover the ghosted index space `[-g, nx+g) × [-g, ny+g)` in
//! row-major order (I outermost), with the values of one cell contiguous.

use std::slice;

use crate::error::CallbackError;
use crate::index_space::{Axis, IndexSpace, Side};




/**
 * ABI view of a patch, as handed to every callback by the engine. The third
 * spatial axis is carried for layout compatibility and is always zero.
 */
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PatchDescriptor {
    /// Solution buffer, `q_len` doubles.
    pub q: *mut f64,
    pub q_len: u64,
    /// Auxiliary buffer, `aux_len` doubles (may be null when `aux_len` is 0).
    pub aux: *mut f64,
    pub aux_len: u64,
    /// Lower corner of the patch.
    pub position: [f64; 3],
    /// Extent of the patch.
    pub size: [f64; 3],
    /// Simulation time of the patch data.
    pub current_time: f64,
    /// Suggested (or estimated) timestep for this patch.
    pub timestep: f64,
    pub subdivision_factor: [i32; 3],
    pub unknowns_per_cell: i32,
    pub aux_fields_per_cell: i32,
    pub ghostlayer_width: i32,
    pub level: i32,
    /// Non-zero when the solver should use dimensional splitting.
    pub dimensional_splitting: i32,
}

/// Written by the solver callback on return.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Timestep actually taken; may be smaller than the one offered.
    pub dt_used: f64,
    /// Estimate for the next stable timestep (or the suggestion after a
    /// rejection).
    pub dt_estimated: f64,
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(std::mem::size_of::<PatchDescriptor>() == 128);
const _: () = assert!(std::mem::align_of::<PatchDescriptor>() == 8);
const _: () = assert!(std::mem::size_of::<StepReport>() == 16);




/**
 * Geometry and per-run constants of a patch, without the buffers.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchGeometry {
    pub position: [f64; 2],
    pub size: [f64; 2],
    pub subdivision_factor: [usize; 2],
    pub num_eqn: usize,
    pub num_aux: usize,
    pub ghost_layer_width: usize,
    pub level: u32,
    pub current_time: f64,
    pub timestep: f64,
    pub dimensional_splitting: bool,
}




// ============================================================================
impl PatchGeometry {

    pub fn cell_spacing(&self) -> (f64, f64) {
        let d0 = self.size[0] / self.subdivision_factor[0] as f64;
        let d1 = self.size[1] / self.subdivision_factor[1] as f64;
        (d0, d1)
    }

    /**
     * Return the center of the given cell. Ghost cells (negative indexes or
     * indexes past the subdivision factor) are valid input.
     */
    pub fn cell_center(&self, index: (i64, i64)) -> (f64, f64) {
        let (d0, d1) = self.cell_spacing();
        let x0 = self.position[0] + d0 * (index.0 as f64 + 0.5);
        let x1 = self.position[1] + d1 * (index.1 as f64 + 0.5);
        (x0, x1)
    }

    /**
     * The non-ghost cells.
     */
    pub fn interior(&self) -> IndexSpace {
        IndexSpace::new(
            0..self.subdivision_factor[0] as i64,
            0..self.subdivision_factor[1] as i64)
    }

    /**
     * All cells of the buffer, ghosts included.
     */
    pub fn extended(&self) -> IndexSpace {
        self.interior().extend_all(self.ghost_layer_width as i64)
    }

    /**
     * The ghost cells on one face, including the corners shared with the
     * neighboring faces.
     */
    pub fn ghost_region(&self, axis: Axis, side: Side) -> IndexSpace {
        let g = self.ghost_layer_width as i64;
        let across = match axis {
            Axis::I => self.extended().range(Axis::J),
            Axis::J => self.extended().range(Axis::I),
        };
        self.interior().face_strip(axis, side, g, across)
    }

    pub fn q_len(&self) -> usize {
        self.extended().len() * self.num_eqn
    }

    pub fn aux_len(&self) -> usize {
        self.extended().len() * self.num_aux
    }

    pub fn lower(&self, axis: Axis) -> f64 {
        self.position[axis.dimension()]
    }

    pub fn upper(&self, axis: Axis) -> f64 {
        self.position[axis.dimension()] + self.size[axis.dimension()]
    }

    /**
     * Build the ABI descriptor pointing at the given buffers. The caller
     * keeps the buffers alive and unaliased for as long as the descriptor is
     * in use.
     */
    pub fn descriptor(&self, q: *mut f64, aux: *mut f64) -> PatchDescriptor {
        PatchDescriptor {
            q,
            q_len: self.q_len() as u64,
            aux,
            aux_len: self.aux_len() as u64,
            position: [self.position[0], self.position[1], 0.0],
            size: [self.size[0], self.size[1], 0.0],
            current_time: self.current_time,
            timestep: self.timestep,
            subdivision_factor: [self.subdivision_factor[0] as i32, self.subdivision_factor[1] as i32, 0],
            unknowns_per_cell: self.num_eqn as i32,
            aux_fields_per_cell: self.num_aux as i32,
            ghostlayer_width: self.ghost_layer_width as i32,
            level: self.level as i32,
            dimensional_splitting: self.dimensional_splitting as i32,
        }
    }

    /**
     * Recover the geometry from a descriptor, validating everything that
     * the buffer arithmetic depends on.
     */
    pub fn from_descriptor(d: &PatchDescriptor) -> Result<Self, CallbackError> {
        let invalid = |reason: String| Err(CallbackError::InvalidPatch(reason));

        if d.subdivision_factor[0] <= 0 || d.subdivision_factor[1] <= 0 {
            return invalid(format!("non-positive subdivision factor {:?}", d.subdivision_factor));
        }
        if d.unknowns_per_cell <= 0 {
            return invalid(format!("non-positive unknown count {}", d.unknowns_per_cell));
        }
        if d.aux_fields_per_cell < 0 || d.ghostlayer_width < 0 || d.level < 0 {
            return invalid("negative aux count, ghost width or level".to_string());
        }
        let geometry = Self {
            position: [d.position[0], d.position[1]],
            size: [d.size[0], d.size[1]],
            subdivision_factor: [d.subdivision_factor[0] as usize, d.subdivision_factor[1] as usize],
            num_eqn: d.unknowns_per_cell as usize,
            num_aux: d.aux_fields_per_cell as usize,
            ghost_layer_width: d.ghostlayer_width as usize,
            level: d.level as u32,
            current_time: d.current_time,
            timestep: d.timestep,
            dimensional_splitting: d.dimensional_splitting != 0,
        };
        if d.q_len as usize != geometry.q_len() {
            return invalid(format!("solution buffer holds {} values, expected {}", d.q_len, geometry.q_len()));
        }
        if d.aux_len as usize != geometry.aux_len() {
            return invalid(format!("auxiliary buffer holds {} values, expected {}", d.aux_len, geometry.aux_len()));
        }
        if d.q.is_null() {
            return invalid("null solution buffer".to_string());
        }
        if d.aux.is_null() && d.aux_len > 0 {
            return invalid("null auxiliary buffer".to_string());
        }
        Ok(geometry)
    }

    fn validate_index(&self, index: (i64, i64)) {
        if !self.extended().contains(index) {
            let (i1, j1) = self.extended().end();
            let g = self.ghost_layer_width as i64;
            panic!("index ({} {}) out of range on patch ({}..{} {}..{})",
                index.0,
                index.1,
                -g,
                i1,
                -g,
                j1);
        }
    }

    fn offset(&self, index: (i64, i64), fields: usize) -> usize {
        self.validate_index(index);
        self.extended().row_major_offset(index) * fields
    }
}




/**
 * Mutable view of a patch, valid for the duration of one callback.
 */
pub struct PatchState<'a> {
    geometry: PatchGeometry,
    q: &'a mut [f64],
    aux: &'a mut [f64],
}

/**
 * Shared view of a patch, used where the callback only reads (the source
 * of an interpolation or restriction, and solution gathering).
 */
pub struct PatchRef<'a> {
    geometry: PatchGeometry,
    q: &'a [f64],
    aux: &'a [f64],
}




// ============================================================================
impl<'a> PatchState<'a> {

    /**
     * Wrap caller-owned buffers. Panics if their lengths disagree with the
     * geometry.
     */
    pub fn new(geometry: PatchGeometry, q: &'a mut [f64], aux: &'a mut [f64]) -> Self {
        assert_eq!(q.len(), geometry.q_len(), "solution buffer length mismatch");
        assert_eq!(aux.len(), geometry.aux_len(), "auxiliary buffer length mismatch");
        Self { geometry, q, aux }
    }

    /**
     * Borrow the buffers behind an engine descriptor.
     *
     * # Safety
     *
     * `descriptor` must be null or point to a descriptor whose buffers are
     * valid for reads and writes of their stated lengths, and not aliased
     * elsewhere, for the lifetime `'a`.
     */
    pub unsafe fn from_descriptor(descriptor: *mut PatchDescriptor) -> Result<Self, CallbackError> {
        let d = descriptor
            .as_ref()
            .ok_or_else(|| CallbackError::InvalidPatch("null patch descriptor".to_string()))?;
        let geometry = PatchGeometry::from_descriptor(d)?;
        let q = slice::from_raw_parts_mut(d.q, d.q_len as usize);
        let aux: &mut [f64] = if d.aux_len == 0 {
            &mut []
        } else {
            slice::from_raw_parts_mut(d.aux, d.aux_len as usize)
        };
        Ok(Self { geometry, q, aux })
    }

    pub fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    pub fn q(&self) -> &[f64] {
        &self.q[..]
    }

    pub fn q_mut(&mut self) -> &mut [f64] {
        &mut self.q[..]
    }

    pub fn aux(&self) -> &[f64] {
        &self.aux[..]
    }

    pub fn aux_mut(&mut self) -> &mut [f64] {
        &mut self.aux[..]
    }

    /**
     * The `num_eqn` values of one cell.
     */
    pub fn get_slice(&self, index: (i64, i64)) -> &[f64] {
        let n = self.geometry.num_eqn;
        let s = self.geometry.offset(index, n);
        &self.q[s..s + n]
    }

    pub fn get_slice_mut(&mut self, index: (i64, i64)) -> &mut [f64] {
        let n = self.geometry.num_eqn;
        let s = self.geometry.offset(index, n);
        &mut self.q[s..s + n]
    }

    pub fn aux_slice(&self, index: (i64, i64)) -> &[f64] {
        let n = self.geometry.num_aux;
        let s = self.geometry.offset(index, n);
        &self.aux[s..s + n]
    }

    pub fn aux_slice_mut(&mut self, index: (i64, i64)) -> &mut [f64] {
        let n = self.geometry.num_aux;
        let s = self.geometry.offset(index, n);
        &mut self.aux[s..s + n]
    }

    /**
     * Copy the values of `source` into `destination` within this patch.
     */
    pub fn copy_cell(&mut self, source: (i64, i64), destination: (i64, i64)) {
        let n = self.geometry.num_eqn;
        let s = self.geometry.offset(source, n);
        let d = self.geometry.offset(destination, n);
        self.q.copy_within(s..s + n, d);
    }

    pub fn as_patch_ref(&self) -> PatchRef<'_> {
        PatchRef { geometry: self.geometry, q: &self.q[..], aux: &self.aux[..] }
    }
}




// ============================================================================
impl<'a> PatchRef<'a> {

    pub fn new(geometry: PatchGeometry, q: &'a [f64], aux: &'a [f64]) -> Self {
        assert_eq!(q.len(), geometry.q_len(), "solution buffer length mismatch");
        assert_eq!(aux.len(), geometry.aux_len(), "auxiliary buffer length mismatch");
        Self { geometry, q, aux }
    }

    /**
     * Borrow the buffers behind an engine descriptor, read-only.
     *
     * # Safety
     *
     * `descriptor` must be null or point to a descriptor whose buffers are
     * valid for reads of their stated lengths for the lifetime `'a`.
     */
    pub unsafe fn from_descriptor(descriptor: *const PatchDescriptor) -> Result<Self, CallbackError> {
        let d = descriptor
            .as_ref()
            .ok_or_else(|| CallbackError::InvalidPatch("null patch descriptor".to_string()))?;
        let geometry = PatchGeometry::from_descriptor(d)?;
        let q = slice::from_raw_parts(d.q as *const f64, d.q_len as usize);
        let aux: &[f64] = if d.aux_len == 0 {
            &[]
        } else {
            slice::from_raw_parts(d.aux as *const f64, d.aux_len as usize)
        };
        Ok(Self { geometry, q, aux })
    }

    pub fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    pub fn q(&self) -> &[f64] {
        self.q
    }

    pub fn aux(&self) -> &[f64] {
        self.aux
    }

    pub fn get_slice(&self, index: (i64, i64)) -> &[f64] {
        let n = self.geometry.num_eqn;
        let s = self.geometry.offset(index, n);
        &self.q[s..s + n]
    }

    /**
     * Copy the interior cells (no ghosts) into a new buffer, in the same
     * row-major layout over `[0, nx) × [0, ny)`.
     */
    pub fn interior_values(&self) -> Vec<f64> {
        self.geometry
            .interior()
            .iter()
            .flat_map(|index| self.get_slice(index).iter().copied())
            .collect()
    }
}
