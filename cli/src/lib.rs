//! Scenario runner and reporting behind the `custody` binary

pub mod report;
pub mod scenario;

pub use report::Summary;
pub use scenario::{Scenario, ScenarioError, Simulation, Step, StepReport};
