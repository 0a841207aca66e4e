//! Quota ledger
//!
//! Per-user, per-dimension usage accounting against static plan limits.

mod ledger;
mod types;

pub use ledger::{current_period, QuotaLedger, SqliteQuotaLedger};
pub(crate) use ledger::parse_timestamp;
pub use types::{
    evaluate, Dimension, PlanLimits, PlanTable, PlanTier, QuotaDecision, QuotaDenial,
    UsageCounters, UsageDelta, UserAccount,
};
