pub mod blocktree;
pub mod pool;
pub mod semaphore;
pub mod statecache;

pub use blocktree::{Address, BlockTree};
pub use pool::Pool;
pub use semaphore::Semaphore;
pub use statecache::StateCache;
