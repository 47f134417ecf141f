pub mod apy;
pub mod keeper_loop;
pub mod outcome;
pub mod policy;
pub mod state;

pub use keeper_loop::{KeeperDeps, KeeperLoop};
pub use outcome::{CycleDisposition, CycleOutcome, ShutdownReason};
pub use policy::LoopPolicy;
pub use state::{KeeperState, LoopState};
