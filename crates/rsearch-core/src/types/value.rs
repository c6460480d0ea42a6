//! Search score

/// Search score in internal units
///
/// Stored in the transposition table as `i16`, so every value the search
/// produces must fit in that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Value(i32);

impl Value {
    pub const ZERO: Value = Value(0);
    pub const DRAW: Value = Value(0);
    pub const MATE: Value = Value(32000);
    pub const INFINITE: Value = Value(32001);
    pub const NONE: Value = Value(32002);

    #[inline]
    pub const fn new(v: i32) -> Value {
        Value(v)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl From<i16> for Value {
    #[inline]
    fn from(v: i16) -> Self {
        Value(v as i32)
    }
}
