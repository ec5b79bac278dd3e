mod reconcile;
mod stream;

pub use reconcile::{StepDiagnostics, StepEngine, TodaySnapshot};
pub use stream::{StepSubscription, StepUpdate};
