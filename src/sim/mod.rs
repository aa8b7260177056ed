pub mod chaser;
pub mod coordinator;
pub mod grid;
pub mod params;
pub mod runner;
pub mod spawn;
pub mod vector;

pub use chaser::{Chaser, Mode, Sighting, StrategyKind, TickContext};
pub use coordinator::{Capture, Coordinator, Frame, TickOutcome};
pub use grid::ExplorationGrid;
pub use params::{ArenaConfig, ChaserConfig, RunnerConfig, SimParams};
pub use runner::Runner;
pub use vector::Vec2;
