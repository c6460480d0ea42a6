//! 16-bit packed move
//!
//! Layout: bits 0-5 destination square, bits 6-11 origin square,
//! bits 12-15 flags. The core never interprets the flags; it only stores the
//! value verbatim in table entries.

use super::Square;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    /// No move
    pub const NONE: Move = Move(0);

    #[inline]
    pub const fn new(from: Square, to: Square) -> Move {
        Move(((from.index() as u16) << 6) | to.index() as u16)
    }

    #[inline]
    pub const fn from_u16(raw: u16) -> Move {
        Move(raw)
    }

    #[inline]
    pub const fn to_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_sq(self) -> Square {
        Square::new(((self.0 >> 6) & 0x3F) as u8)
    }

    #[inline]
    pub const fn to_sq(self) -> Square {
        Square::new((self.0 & 0x3F) as u8)
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}
