//! Muster Engine: rank catalog, promotion rules, the disciplinary
//! ledger, the member lifecycle state machine and roster reconciliation.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod promotion;
pub mod reconciler;

pub use catalog::RankCatalog;
pub use config::{EngineConfig, ThresholdConfig};
pub use error::EngineError;
pub use lifecycle::{Actor, MemberLifecycleController, PromotionOutcome, WarningRevocation};
pub use promotion::{PromotionEngine, PromotionResult, ThresholdTable};
pub use reconciler::{ChangeReconciler, MergeOutcome, RosterView};

#[cfg(test)]
mod testing;
