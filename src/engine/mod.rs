//! In-process test engine
//!
//! Test units, the coordinator that runs them and notifies observers, the
//! cooperative stop token, and the factory that turns class names into tests.

mod coordinator;
mod factory;
mod recorder;
mod stop;

pub use coordinator::{Coordinator, TestListener};
pub use factory::{TestFactory, TestRegistry};
pub use recorder::SummaryRecorder;
pub use stop::StopToken;
pub use test::{Test, TestCase, TestSuite};
