//! Score bound kind

/// Relationship between a stored score and the true value of the position.
///
/// The discriminants occupy the low two bits of the packed generation byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Bound {
    #[default]
    None = 0,
    /// Fail-low: the true value is at most the stored score
    Upper = 1,
    /// Fail-high: the true value is at least the stored score
    Lower = 2,
    Exact = 3,
}

impl Bound {
    /// Decodes the low two bits of a packed byte
    #[inline]
    pub const fn from_bits(bits: u8) -> Bound {
        match bits & 0x3 {
            1 => Bound::Upper,
            2 => Bound::Lower,
            3 => Bound::Exact,
            _ => Bound::None,
        }
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}
