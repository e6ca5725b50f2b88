pub mod by_player;
pub mod move_record;
pub mod player;

pub use by_player::ByPlayer;
pub use move_record::MoveRecord;
pub use player::{Mark, Player};
