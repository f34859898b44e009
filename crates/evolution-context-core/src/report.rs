use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::policy::{meets_threshold, policy_entry, PolicyEntry, ReportKind, Tier};
use crate::record::ReflectionRecord;
use crate::selection::{select_temporal_context_traced, SelectionTrace};
use crate::ContextError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ReportContextId(pub Ulid);

impl ReportContextId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Identifier whose timestamp component is `as_of`.
    #[must_use]
    pub fn at(as_of: OffsetDateTime) -> Self {
        Self(Ulid::from_datetime(SystemTime::from(as_of)))
    }
}

impl Default for ReportContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ReportContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an evolution report covers.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ReportSubject {
    Dream { dream_id: String },
    AllDreams,
}

impl ReportSubject {
    #[must_use]
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Dream { .. } => ReportKind::DreamSpecific,
            Self::AllDreams => ReportKind::CrossDream,
        }
    }
}

/// Supplies a user's reflections in any order.
pub trait ReflectionSource<T> {
    /// Every reflection belonging to `subject` for `user_id`.
    ///
    /// # Errors
    /// Returns [`ContextError::Source`] when the backing store cannot be read.
    fn reflections(
        &self,
        user_id: &str,
        subject: &ReportSubject,
    ) -> Result<Vec<ReflectionRecord<T>>, ContextError>;

    /// Number of reflections `reflections` would return.
    ///
    /// # Errors
    /// Returns [`ContextError::Source`] when the backing store cannot be read.
    fn count_reflections(
        &self,
        user_id: &str,
        subject: &ReportSubject,
    ) -> Result<usize, ContextError> {
        Ok(self.reflections(user_id, subject)?.len())
    }
}

pub trait TierResolver {
    /// # Errors
    /// Returns [`ContextError::Source`] when the subscription cannot be resolved.
    fn tier_for(&self, user_id: &str) -> Result<Tier, ContextError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReportRequest {
    pub user_id: String,
    pub subject: ReportSubject,
    #[serde(with = "time::serde::rfc3339")]
    pub as_of: OffsetDateTime,
}

/// Evidence handed to report generation: a bounded, oldest-first sample of
/// reflections plus the policy that shaped it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportContext<T> {
    pub report_context_id: ReportContextId,
    pub user_id: String,
    pub subject: ReportSubject,
    pub kind: ReportKind,
    pub tier: Tier,
    pub policy: PolicyEntry,
    pub reflection_count: usize,
    pub selection_digest: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub reflections: Vec<ReflectionRecord<T>>,
    pub trace: SelectionTrace,
}

/// Short fingerprint of a selection: the limit followed by the selected ids in
/// order. Identical selections always share a digest.
#[must_use]
pub fn selection_digest<T>(limit: usize, selected: &[ReflectionRecord<T>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(limit.to_string().as_bytes());
    for record in selected {
        hasher.update(b"\n");
        hasher.update(record.id.to_string().as_bytes());
    }

    let digest = hasher.finalize();
    let digest_hex = format!("{digest:x}");
    format!("sel_{}", &digest_hex[..16])
}

fn ensure_unique_ids<T>(reflections: &[ReflectionRecord<T>]) -> Result<(), ContextError> {
    let mut seen = BTreeSet::new();
    for record in reflections {
        if !seen.insert(&record.id) {
            return Err(ContextError::Validation(format!(
                "reflection id {} appears more than once",
                record.id
            )));
        }
    }
    Ok(())
}

/// Gate and select the reflections for one evolution report.
///
/// Resolves the caller's tier, refuses kinds the tier does not include,
/// refuses histories below the kind's threshold, then samples the history
/// down to the tier's context limit.
///
/// # Errors
/// Returns [`ContextError::Validation`] for a blank user id or duplicate
/// reflection ids, [`ContextError::FeatureUnavailable`] when the tier's limit
/// for the kind is zero, [`ContextError::Ineligible`] when too few reflections
/// exist, and propagates [`ContextError::Source`] from the collaborators.
pub fn prepare_report_context<T, S, R>(
    source: &S,
    tiers: &R,
    request: ReportRequest,
) -> Result<ReportContext<T>, ContextError>
where
    T: Clone,
    S: ReflectionSource<T> + ?Sized,
    R: TierResolver + ?Sized,
{
    if request.user_id.trim().is_empty() {
        return Err(ContextError::Validation("user_id MUST be non-empty".to_string()));
    }

    let tier = tiers.tier_for(&request.user_id)?;
    let kind = request.subject.kind();
    let policy = policy_entry(tier, kind);
    tracing::debug!(
        user_id = %request.user_id,
        %tier,
        %kind,
        threshold = policy.threshold,
        context_limit = policy.context_limit,
        "resolved report policy"
    );

    if !policy.is_available() {
        tracing::debug!(%tier, %kind, "report kind not included in tier");
        return Err(ContextError::FeatureUnavailable { tier, kind });
    }

    let count = source.count_reflections(&request.user_id, &request.subject)?;
    if !meets_threshold(i64::try_from(count).unwrap_or(i64::MAX), kind) {
        tracing::debug!(count, threshold = policy.threshold, %kind, "not enough reflections");
        return Err(ContextError::Ineligible { kind, count, threshold: policy.threshold });
    }

    let reflections = source.reflections(&request.user_id, &request.subject)?;
    ensure_unique_ids(&reflections)?;
    if reflections.len() != count {
        tracing::warn!(
            counted = count,
            fetched = reflections.len(),
            "reflection count changed between count and fetch"
        );
    }

    let selection = select_temporal_context_traced(&reflections, policy.context_limit);
    let digest = selection_digest(policy.context_limit, &selection.records);
    tracing::info!(
        user_id = %request.user_id,
        %kind,
        total = selection.trace.total,
        selected = selection.records.len(),
        selection_digest = %digest,
        "prepared report context"
    );

    Ok(ReportContext {
        report_context_id: ReportContextId::at(request.as_of),
        user_id: request.user_id,
        subject: request.subject,
        kind,
        tier,
        policy,
        reflection_count: reflections.len(),
        selection_digest: digest,
        generated_at: request.as_of,
        reflections: selection.records,
        trace: selection.trace,
    })
}
