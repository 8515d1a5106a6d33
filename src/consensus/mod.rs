pub mod params;
pub mod state;
pub mod xstate;

pub use state::State;
pub use xstate::ExtendedState;
