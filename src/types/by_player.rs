use std::ops::{Index, IndexMut};

use super::player::Player;

/// A pair of values, one per side, indexed by [`Player`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByPlayer<T>(pub T, pub T);

impl<T> From<(T, T)> for ByPlayer<T> {
    #[inline]
    fn from((o, x): (T, T)) -> Self {
        Self(o, x)
    }
}

impl<T> From<ByPlayer<T>> for (T, T) {
    #[inline]
    fn from(value: ByPlayer<T>) -> Self {
        (value.0, value.1)
    }
}

impl<T> ByPlayer<T> {
    #[inline]
    pub const fn new(o: T, x: T) -> Self {
        Self(o, x)
    }

    #[inline]
    pub fn get(&self, player: Player) -> &T {
        match player {
            Player::O => &self.0,
            Player::X => &self.1,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, player: Player) -> &mut T {
        match player {
            Player::O => &mut self.0,
            Player::X => &mut self.1,
        }
    }

    /// Returns `(player's value, opponent's value)`.
    #[inline]
    pub fn get_two(&self, player: Player) -> (&T, &T) {
        match player {
            Player::O => (&self.0, &self.1),
            Player::X => (&self.1, &self.0),
        }
    }

    #[inline]
    pub fn map<A, F: FnMut(T) -> A>(self, mut f: F) -> ByPlayer<A> {
        ByPlayer::<A>::new(f(self.0), f(self.1))
    }

    #[inline]
    pub fn as_ref(&self) -> ByPlayer<&T> {
        ByPlayer(&self.0, &self.1)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Player, &T)> {
        [(Player::O, &self.0), (Player::X, &self.1)].into_iter()
    }
}

impl<T: Clone> ByPlayer<T> {
    #[inline]
    pub fn splat(value: T) -> Self {
        Self(value.clone(), value)
    }
}

impl<T> Index<Player> for ByPlayer<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Player) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<Player> for ByPlayer<T> {
    #[inline]
    fn index_mut(&mut self, index: Player) -> &mut Self::Output {
        self.get_mut(index)
    }
}
