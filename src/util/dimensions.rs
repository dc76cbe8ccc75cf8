//! Array sample shapes.

use smallvec::SmallVec;

/// Rank and per-axis extent of an array sample.
///
/// The element count is the product of the axes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    dims: SmallVec<[usize; 4]>,
}

impl Dimensions {
    /// Rank 0, grown with [`push`](Self::push) while decoding.
    pub fn empty() -> Self {
        Self { dims: SmallVec::new() }
    }

    pub fn d1(size: usize) -> Self {
        Self { dims: smallvec::smallvec![size] }
    }

    pub fn d2(width: usize, height: usize) -> Self {
        Self { dims: smallvec::smallvec![width, height] }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements.
    pub fn num_points(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn push(&mut self, size: usize) {
        self.dims.push(size);
    }
}

impl From<(usize, usize)> for Dimensions {
    fn from((w, h): (usize, usize)) -> Self {
        Self::d2(w, h)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "]")
    }
}
