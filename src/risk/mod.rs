//! Risk controls: daily budget, trigger evaluation, dump detection

pub mod budget;
pub mod dump;
pub mod evaluator;

pub use budget::RiskBudget;
pub use dump::{detect, DumpVerdict};
pub use evaluator::{TriggerEvaluator, TriggerEvent, TriggerKind};
