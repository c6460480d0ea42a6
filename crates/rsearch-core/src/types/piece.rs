//! Piece and square indices used by the history statistics

/// Colored piece index in `0..Piece::NUM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Piece(u8);

impl Piece {
    pub const NUM: usize = 16;
    pub const NONE: Piece = Piece(0);

    #[inline]
    pub const fn new(raw: u8) -> Piece {
        debug_assert!((raw as usize) < Self::NUM);
        Piece(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Board square in `0..Square::NUM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Square(u8);

impl Square {
    pub const NUM: usize = 64;

    #[inline]
    pub const fn new(raw: u8) -> Square {
        debug_assert!((raw as usize) < Self::NUM);
        Square(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
