pub mod block;
pub mod coin;
pub mod transaction;

pub use block::Block;
pub use coin::Coin;
pub use transaction::{InputId, Transaction};
