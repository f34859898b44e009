//! Temporal context selection for evolution reports.
//!
//! A user's reflection history is reduced to a small, chronologically ordered
//! sample that spans the whole timeline. The sample size is bounded by a
//! per-tier policy table, and a report is only attempted once a minimum number
//! of reflections exists.

mod policy;
mod record;
mod report;
mod selection;

pub use policy::{
    clamp_limit, context_limit, meets_threshold, policy_entry, policy_table, threshold, PolicyEntry,
    ReportKind, Tier, CROSS_DREAM_THRESHOLD, DREAM_SPECIFIC_THRESHOLD,
};
pub use record::{ReflectionId, ReflectionRecord};
pub use report::{
    prepare_report_context, selection_digest, ReflectionSource, ReportContext, ReportContextId,
    ReportRequest, ReportSubject, TierResolver,
};
pub use selection::{
    period_bounds, period_quotas, sample_evenly, select_temporal_context,
    select_temporal_context_traced, Period, PeriodQuotas, PeriodTrace, SelectionTrace,
    TemporalSelection,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ContextError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{kind} reports are unavailable on the {tier} tier")]
    FeatureUnavailable { tier: Tier, kind: ReportKind },
    #[error("{kind} report requires at least {threshold} reflections (found {count})")]
    Ineligible { kind: ReportKind, count: usize, threshold: usize },
    #[error("reflection source error: {0}")]
    Source(String),
}
