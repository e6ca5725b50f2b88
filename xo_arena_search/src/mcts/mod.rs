use std::ops::ControlFlow;

use atree::{Arena, Token};
use instant::Instant;
use log::debug;
use xo_arena::board::N_CELLS;
use xo_arena::prelude::*;
use xo_arena::rand::Rng;

use crate::{SearchCounter, SearchResult, Strategy, StrategyKind};

pub mod policy;
pub use policy::*;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MctsConfig {
    /// Iterations per decision.
    pub iterations: u32,
    /// UCT exploration constant.
    pub exploration: f32,
    /// Upper bound on tree nodes. An iteration that would expand past it is abandoned.
    pub max_nodes: usize,
}

/// Smallest tree that can hold an expanded root of the empty board.
pub const MIN_MAX_NODES: usize = N_CELLS + 1;

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            iterations: 20_000,
            exploration: std::f32::consts::SQRT_2,
            max_nodes: 500_000,
        }
    }
}

/// One search tree node.
///
/// `score` accumulates playout values from the point of view of the player
/// who made `mv`, which is the opponent of `to_move`.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub mv: Option<Cell>,
    pub board: Board,
    pub to_move: Player,
    pub visits: u32,
    pub score: Fixed,
    pub parent: Option<Token>,
    pub expanded: bool,
}

impl NodeData {
    #[inline]
    pub fn root(board: Board, to_move: Player) -> Self {
        Self {
            mv: None,
            board,
            to_move,
            visits: 0,
            score: Fixed::ZERO,
            parent: None,
            expanded: false,
        }
    }

    #[inline]
    fn child(&self, parent: Token, mv: Cell, board: Board) -> Self {
        Self {
            mv: Some(mv),
            board,
            to_move: self.to_move.opposite(),
            visits: 0,
            score: Fixed::ZERO,
            parent: Some(parent),
            expanded: false,
        }
    }

    /// The player whose move led to this node.
    #[inline]
    pub fn mover(&self) -> Player {
        self.to_move.opposite()
    }
}

enum IterationEnd {
    TreeFull,
    MissingNode,
}

/// Per-decision tree. Built from scratch on every call and dropped as a unit.
pub struct SearchTree {
    pub tree: Arena<NodeData>,
    pub root: Token,
    nodes: usize,
}

impl SearchTree {
    pub fn new(board: Board, to_move: Player) -> Self {
        let (tree, root) = Arena::with_data(NodeData::root(board, to_move));
        Self { tree, root, nodes: 1 }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    pub fn root_data(&self) -> Option<&NodeData> {
        self.tree.get(self.root).map(|n| &n.data)
    }

    /// Children of the root in move order.
    pub fn root_children(&self) -> Vec<&NodeData> {
        match self.tree.get(self.root) {
            Some(node) => node.children(&self.tree).map(|c| &c.data).collect(),
            None => Vec::new(),
        }
    }

    /// Most visited root child; the first one wins ties.
    pub fn best_child(&self) -> Option<&NodeData> {
        let mut best: Option<&NodeData> = None;
        for child in self.root_children() {
            if best.map_or(true, |b| child.visits > b.visits) {
                best = Some(child);
            }
        }
        best
    }

    fn expand(&mut self, token: Token, max_nodes: usize) -> ControlFlow<IterationEnd, u64> {
        let Some(node) = self.tree.get(token) else {
            return ControlFlow::Break(IterationEnd::MissingNode);
        };
        let data = node.data.clone();
        let moves = data.board.legal_moves();
        if self.nodes + moves.len() > max_nodes {
            return ControlFlow::Break(IterationEnd::TreeFull);
        }
        for mv in moves.iter().copied() {
            let next = data.board.set_cell(mv, data.to_move.mark());
            token.append(&mut self.tree, data.child(token, mv, next));
        }
        self.nodes += moves.len();
        if let Some(node) = self.tree.get_mut(token) {
            node.data.expanded = true;
        }
        ControlFlow::Continue(moves.len() as u64)
    }

    fn select_child<S: SelectionPolicy>(&self, token: Token, policy: &S) -> Option<Token> {
        let node = self.tree.get(token)?;
        let parent_visits = node.data.visits;
        let mut best: Option<(Token, Fixed)> = None;
        for child in node.children(&self.tree) {
            let score = policy.score(parent_visits, &child.data);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((child.token(), score));
            }
        }
        best.map(|(t, _)| t)
    }

    /// Adds `value` to every node from `token` up to the root, flipping the
    /// point of view at each level.
    fn backpropagate(&mut self, token: Token, value: Fixed) {
        let mut value = value;
        let mut current = Some(token);
        while let Some(t) = current {
            let Some(node) = self.tree.get_mut(t) else { break };
            node.data.visits += 1;
            node.data.score += value;
            value = value.complement();
            current = node.data.parent;
        }
    }
}

/// Plays uniformly random moves until the game ends. Returns the result for
/// the player who made the last move on `board`, and the number of moves played.
pub fn random_playout<R: Rng + ?Sized>(board: Board, to_move: Player, rng: &mut R) -> (Fixed, u64) {
    let perspective = to_move.opposite();
    let mut board = board;
    let mut player = to_move;
    let mut count = 0;
    loop {
        let outcome = board.check_terminal();
        if outcome.is_terminal() {
            return (terminal_value(outcome, perspective), count);
        }
        let moves = board.legal_moves();
        let mv = moves[rng.gen_range(0..moves.len())];
        board = board.set_cell(mv, player.mark());
        player = player.opposite();
        count += 1;
    }
}

#[derive(Debug, Clone)]
pub struct Mcts<S: SelectionPolicy = Uct> {
    pub config: MctsConfig,
    pub selection_policy: S,
}

impl Mcts<Uct> {
    pub fn new(config: MctsConfig) -> Self {
        let selection_policy = Uct {
            exploration: Fixed::from_f32(config.exploration),
        };
        Self {
            config,
            selection_policy,
        }
    }
}

impl<S: SelectionPolicy> Mcts<S> {
    pub fn new_with_selection_policy(config: MctsConfig, selection_policy: S) -> Self {
        Self {
            config,
            selection_policy,
        }
    }

    fn iteration<R: Rng + ?Sized>(&self, st: &mut SearchTree, rng: &mut R) -> ControlFlow<IterationEnd, u64> {
        let mut token = st.root;
        let mut states_visited = 0u64;
        let value = loop {
            let Some(node) = st.tree.get(token) else {
                return ControlFlow::Break(IterationEnd::MissingNode);
            };
            let data = &node.data;
            let outcome = data.board.check_terminal();
            if outcome.is_terminal() {
                break terminal_value(outcome, data.mover());
            }
            if data.visits == 0 && token != st.root {
                let (value, n) = random_playout(data.board, data.to_move, rng);
                states_visited += n;
                break value;
            }
            if !data.expanded {
                states_visited += self.expand_checked(st, token)?;
            }
            let Some(next) = st.select_child(token, &self.selection_policy) else {
                return ControlFlow::Break(IterationEnd::MissingNode);
            };
            token = next;
        };
        st.backpropagate(token, value);
        ControlFlow::Continue(1 + states_visited)
    }

    #[inline]
    fn expand_checked(&self, st: &mut SearchTree, token: Token) -> ControlFlow<IterationEnd, u64> {
        st.expand(token, self.config.max_nodes)
    }

    /// Runs the configured number of iterations and returns the tree.
    pub fn build_tree<R: Rng + ?Sized>(
        &self,
        board: Board,
        player: Player,
        rng: &mut R,
        counter: &mut SearchCounter,
    ) -> SearchTree {
        let mut st = SearchTree::new(board, player);
        for _ in 0..self.config.iterations {
            match self.iteration(&mut st, rng) {
                ControlFlow::Continue(n) => counter.states_visited += n,
                ControlFlow::Break(IterationEnd::TreeFull) => counter.aborted_iterations += 1,
                ControlFlow::Break(IterationEnd::MissingNode) => break,
            }
        }
        if counter.aborted_iterations > 0 {
            debug!(
                "mcts: {} of {} iterations abandoned at {} nodes",
                counter.aborted_iterations,
                self.config.iterations,
                st.node_count()
            );
        }
        st
    }
}

impl<S: SelectionPolicy> Strategy for Mcts<S> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mcts
    }

    fn search(&self, board: Board, player: Player, rng: &mut RngState) -> SearchResult {
        if board.check_terminal().is_terminal() {
            return Default::default();
        }
        let t0 = Instant::now();
        let mut counter = SearchCounter::default();
        let st = self.build_tree(board, player, rng, &mut counter);
        let Some(best) = st.best_child().filter(|c| c.visits > 0) else {
            let fallback = board.legal_moves().first().copied();
            debug!("mcts: no iteration completed, {player} falls back to {fallback:?}");
            return SearchResult::new(fallback, None, counter);
        };
        let eval = Some(best.score.div_int(best.visits));
        debug!(
            "mcts: {player} plays {:?} visits={} eval={:?} {}",
            best.mv,
            best.visits,
            eval,
            counter.summary(t0.elapsed().as_nanos())
        );
        SearchResult::new(best.mv, eval, counter)
    }
}
