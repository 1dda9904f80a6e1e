pub mod refresh;
pub mod runner;

pub use refresh::RefreshJob;
pub use runner::JobRunner;
