use super::*;

/// Scores children during the selection phase of MCTS.
///
/// The child with the highest score is descended into. Scores are in
/// [`Fixed`] so that the whole search stays in integer arithmetic.
pub trait SelectionPolicy: Send + Sync {
    fn score(&self, parent_visits: u32, child: &NodeData) -> Fixed;
}

/// UCT: `score / n + c * sqrt(ln(N) / n)`, where `n` counts the child's
/// visits and `N` the parent's. Unvisited children score `Fixed::MAX`.
///
/// See also: <https://en.wikipedia.org/wiki/Monte_Carlo_tree_search#Exploration_and_exploitation>
#[derive(Debug, Copy, Clone)]
pub struct Uct {
    pub exploration: Fixed,
}

impl Default for Uct {
    fn default() -> Self {
        Self {
            exploration: Fixed::from_f32(std::f32::consts::SQRT_2),
        }
    }
}

impl Uct {
    #[inline]
    pub fn exploitation(child: &NodeData) -> Fixed {
        child.score.div_int(child.visits)
    }

    #[inline]
    pub fn exploration_term(&self, parent_visits: u32, child_visits: u32) -> Fixed {
        let ln = Fixed::from_int(parent_visits).ln().clear_sign();
        self.exploration * ln.div_int(child_visits).sqrt()
    }
}

impl SelectionPolicy for Uct {
    #[inline]
    fn score(&self, parent_visits: u32, child: &NodeData) -> Fixed {
        if child.visits == 0 {
            return Fixed::MAX;
        }
        Self::exploitation(child) + self.exploration_term(parent_visits, child.visits)
    }
}
