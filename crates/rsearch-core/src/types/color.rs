//! Clock side

/// Side whose clock is running; indexes the per-side arrays of `SearchLimits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    pub const NUM: usize = 2;
    pub const ALL: [Color; Color::NUM] = [Color::White, Color::Black];

    /// Side to move at game ply `ply` (White moves on even plies)
    #[inline]
    pub const fn to_move(ply: i32) -> Color {
        if ply.rem_euclid(2) == 0 { Color::White } else { Color::Black }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// `go` parameter carrying this side's remaining time
    pub const fn time_param(self) -> &'static str {
        match self {
            Color::White => "wtime",
            Color::Black => "btime",
        }
    }

    /// `go` parameter carrying this side's increment
    pub const fn inc_param(self) -> &'static str {
        match self {
            Color::White => "winc",
            Color::Black => "binc",
        }
    }
}
