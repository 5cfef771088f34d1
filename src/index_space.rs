use core::ops::Range;




/**
 * Identifier for a Cartesian axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    I,
    J,
}

impl Axis {

    /**
     * Map the integer dimension used by the engine ABI onto an axis. The
     * engine is strictly 2D, so anything but 0 or 1 is rejected.
     */
    pub fn from_dimension(dimension: i32) -> Option<Self> {
        match dimension {
            0 => Some(Axis::I),
            1 => Some(Axis::J),
            _ => None,
        }
    }

    pub fn dimension(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
        }
    }

    pub fn both() -> [Axis; 2] {
        [Axis::I, Axis::J]
    }
}




/**
 * One of the two faces of a patch along an axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Lower,
    Upper,
}

impl Side {
    pub fn from_set_upper(set_upper: i32) -> Self {
        if set_upper != 0 { Side::Upper } else { Side::Lower }
    }

    pub fn is_upper(self) -> bool {
        self == Side::Upper
    }

    pub fn both() -> [Side; 2] {
        [Side::Lower, Side::Upper]
    }
}




#[derive(Clone, Debug, PartialEq, Eq)]

/**
 * Represents a rectangular region in a discrete index space
 */
pub struct IndexSpace {
    di: Range<i64>,
    dj: Range<i64>,
}




/**
 * Describes a rectangular index space. The index type is signed 64-bit
 * integer, so ghost cells of a patch sit at negative indexes.
 */
impl IndexSpace {


    pub fn new(di: Range<i64>, dj: Range<i64>) -> Self {

        assert!(
            di.start <= di.end && dj.start <= dj.end,
            "index space has negative volume");

        Self { di, dj }
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> (usize, usize) {
        ((self.di.end - self.di.start) as usize,
         (self.dj.end - self.dj.start) as usize)
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        let (l, m) = self.dim();
        l * m
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> (i64, i64) {
        (self.di.start, self.dj.start)
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> (i64, i64) {
        (self.di.end, self.dj.end)
    }


    /**
     * Return the range of indexes along one axis.
     */
    pub fn range(&self, axis: Axis) -> Range<i64> {
        match axis {
            Axis::I => self.di.clone(),
            Axis::J => self.dj.clone(),
        }
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: (i64, i64)) -> bool {
        self.di.contains(&index.0) && self.dj.contains(&index.1)
    }


    /**
     * Expand this index space by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        Self::new(
            self.di.start - delta .. self.di.end + delta,
            self.dj.start - delta .. self.dj.end + delta)
    }


    /**
     * Extend just the upper elements of this index space by a certain amount
     * on the given axis. Used to address the faces between cells: face `i`
     * separates cells `i - 1` and `i`.
     */
    pub fn extend_upper(&self, delta: i64, axis: Axis) -> Self {
        match axis {
            Axis::I => Self::new(self.di.start .. self.di.end + delta, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), self.dj.start .. self.dj.end + delta),
        }
    }


    /**
     * Replace the range along one axis, keeping the other.
     */
    pub fn with_range(&self, axis: Axis, range: Range<i64>) -> Self {
        match axis {
            Axis::I => Self::new(range, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), range),
        }
    }


    /**
     * Return the strip of `width` indexes lying just outside this space on
     * the given face, spanning `across` on the other axis. With `across` set
     * to the ghosted range this includes the corners.
     */
    pub fn face_strip(&self, axis: Axis, side: Side, width: i64, across: Range<i64>) -> Self {
        let r = self.range(axis);
        let strip = match side {
            Side::Lower => r.start - width .. r.start,
            Side::Upper => r.end .. r.end + width,
        };
        match axis {
            Axis::I => Self::new(strip, across),
            Axis::J => Self::new(across, strip),
        }
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: (i64, i64)) -> usize {
        let i = (index.0 - self.di.start) as usize;
        let j = (index.1 - self.dj.start) as usize;
        let m = (self.dj.end - self.dj.start) as usize;
        i * m + j
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.di.clone().flat_map(move |i| self.dj.clone().map(move |j| (i, j)))
    }
}
