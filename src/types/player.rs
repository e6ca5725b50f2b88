use std::fmt::Display;

use enum_map::Enum;

/// Content of one board cell. The discriminants are the 2-bit cell codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Enum)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Mark {
    #[default]
    Empty = 0,
    O = 1,
    X = 2,
}

impl Mark {
    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Decodes a 2-bit cell code. The unused code 3 reads as empty.
    #[inline]
    pub const fn from_bits(bits: u32) -> Mark {
        match bits & 0b11 {
            1 => Mark::O,
            2 => Mark::X,
            _ => Mark::Empty,
        }
    }

    #[inline]
    pub const fn player(self) -> Option<Player> {
        match self {
            Mark::Empty => None,
            Mark::O => Some(Player::O),
            Mark::X => Some(Player::X),
        }
    }

    #[inline]
    pub const fn to_char(self) -> char {
        match self {
            Mark::Empty => '.',
            Mark::O => 'O',
            Mark::X => 'X',
        }
    }
}

/// One side of a match. `O` always moves first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Enum)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Player {
    #[default]
    O = 0,
    X = 1,
}

impl Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::O => f.write_str("O"),
            Player::X => f.write_str("X"),
        }
    }
}

impl Player {
    pub const ALL: [Player; 2] = [Player::O, Player::X];

    #[inline]
    pub const fn opposite(self) -> Player {
        match self {
            Player::O => Player::X,
            Player::X => Player::O,
        }
    }

    #[inline]
    pub const fn mark(self) -> Mark {
        match self {
            Player::O => Mark::O,
            Player::X => Mark::X,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn select<T>(self, tuple: (T, T)) -> T {
        match self {
            Player::O => tuple.0,
            Player::X => tuple.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_bits() {
        for mark in [Mark::Empty, Mark::O, Mark::X] {
            assert_eq!(mark, Mark::from_bits(mark.bits()));
        }
        assert_eq!(Mark::Empty, Mark::from_bits(3));
    }

    #[test]
    fn test_player_mark() {
        assert_eq!(Some(Player::O), Player::O.mark().player());
        assert_eq!(Some(Player::X), Player::X.mark().player());
        assert_eq!(Player::X, Player::O.opposite());
        assert_eq!(Player::O, Player::O.opposite().opposite());
    }
}
