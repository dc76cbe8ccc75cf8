//! Persisted block addresses.

use std::fmt;

const DATA_FLAG: u64 = 1 << 63;

/// Address of a block in a container.
///
/// The top bit tags the block kind (set = Data, clear = Group); the rest is
/// the backend-defined position. Position 0 is reserved for the empty
/// block of either kind, which is never stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(u64);

impl Location {
    /// A group with no children.
    pub const EMPTY_GROUP: Self = Self(0);
    /// A data block with no bytes.
    pub const EMPTY_DATA: Self = Self(DATA_FLAG);

    #[inline]
    pub const fn group(pos: u64) -> Self {
        Self(pos & !DATA_FLAG)
    }

    #[inline]
    pub const fn data(pos: u64) -> Self {
        Self(pos | DATA_FLAG)
    }

    /// Rebuild from the persisted 64-bit value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Backend position without the kind flag.
    #[inline]
    pub const fn pos(self) -> u64 {
        self.0 & !DATA_FLAG
    }

    #[inline]
    pub const fn is_data(self) -> bool {
        self.0 & DATA_FLAG != 0
    }

    #[inline]
    pub const fn is_group(self) -> bool {
        !self.is_data()
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.pos() == 0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_data() { "Data" } else { "Group" };
        if self.is_empty() {
            write!(f, "{}(empty)", kind)
        } else {
            write!(f, "{}@{}", kind, self.pos())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_flag() {
        let d = Location::data(42);
        assert!(d.is_data());
        assert_eq!(d.pos(), 42);
        assert_eq!(d.raw(), 42 | (1 << 63));

        let g = Location::group(42);
        assert!(g.is_group());
        assert_eq!(Location::from_raw(g.raw()), g);
    }

    #[test]
    fn test_empty_sentinels() {
        assert!(Location::EMPTY_GROUP.is_empty() && Location::EMPTY_GROUP.is_group());
        assert!(Location::EMPTY_DATA.is_empty() && Location::EMPTY_DATA.is_data());
        assert!(!Location::data(16).is_empty());
        assert_eq!(format!("{:?}", Location::EMPTY_DATA), "Data(empty)");
    }
}
