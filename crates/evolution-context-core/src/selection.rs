use serde::{Deserialize, Serialize};

use crate::record::ReflectionRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Early,
    Middle,
    Recent,
}

impl Period {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Middle => "middle",
            Self::Recent => "recent",
        }
    }
}

/// Per-period sample sizes for one context limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct PeriodQuotas {
    pub early: usize,
    pub middle: usize,
    pub recent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PeriodTrace {
    pub period: Period,
    pub available: usize,
    pub quota: usize,
    pub selected: usize,
}

/// How a selection was produced. `periods` is empty on passthrough.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SelectionTrace {
    pub total: usize,
    pub limit: usize,
    pub passthrough: bool,
    pub periods: Vec<PeriodTrace>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalSelection<T> {
    pub records: Vec<ReflectionRecord<T>>,
    pub trace: SelectionTrace,
}

/// Picks `count` evenly spaced elements from `period`, keeping their order.
///
/// Element `i` of the result is `period[floor(i * len / count)]`. When the
/// period already fits, it is returned whole.
#[must_use]
pub fn sample_evenly<T: Clone>(period: &[T], count: usize) -> Vec<T> {
    let len = period.len();
    if len <= count {
        return period.to_vec();
    }
    if count == 0 {
        return Vec::new();
    }

    // len > count, so the step exceeds one and indices strictly increase.
    (0..count).map(|index| period[index * len / count].clone()).collect()
}

/// Split points `(early_end, middle_end)` for a sorted history of `total` items.
#[must_use]
pub fn period_bounds(total: usize) -> (usize, usize) {
    (total / 3, total * 2 / 3)
}

/// Even split of `limit` across the three periods; the recent period takes
/// the remainder.
#[must_use]
pub fn period_quotas(limit: usize) -> PeriodQuotas {
    let per_period = limit / 3;
    PeriodQuotas { early: per_period, middle: per_period, recent: per_period + limit % 3 }
}

/// Caps each quota at the size of its period and pushes any shortfall back
/// toward earlier periods, recent first.
fn fit_quotas(available: [usize; 3], quotas: [usize; 3]) -> [usize; 3] {
    let mut fitted = [0_usize; 3];
    let mut carry = 0_usize;
    for index in (0..3).rev() {
        let wanted = quotas[index] + carry;
        fitted[index] = wanted.min(available[index]);
        carry = wanted - fitted[index];
    }
    fitted
}

fn sorted_by_creation<T: Clone>(reflections: &[ReflectionRecord<T>]) -> Vec<ReflectionRecord<T>> {
    let mut sorted = reflections.to_vec();
    // slice::sort_by_key is stable: equal timestamps keep their input order.
    sorted.sort_by_key(|record| record.created_at);
    sorted
}

/// Selects at most `limit` reflections spread across early, middle, and
/// recent thirds of the history, returned oldest first, along with a trace of
/// how each period was sampled.
#[must_use]
pub fn select_temporal_context_traced<T: Clone>(
    reflections: &[ReflectionRecord<T>],
    limit: usize,
) -> TemporalSelection<T> {
    let sorted = sorted_by_creation(reflections);
    let total = sorted.len();

    if total <= limit {
        return TemporalSelection {
            records: sorted,
            trace: SelectionTrace { total, limit, passthrough: true, periods: Vec::new() },
        };
    }

    let (early_end, middle_end) = period_bounds(total);
    let slices = [&sorted[..early_end], &sorted[early_end..middle_end], &sorted[middle_end..]];
    let quotas = period_quotas(limit);
    let nominal = [quotas.early, quotas.middle, quotas.recent];
    let fitted = fit_quotas(slices.map(<[ReflectionRecord<T>]>::len), nominal);

    let mut records = Vec::with_capacity(limit);
    let mut periods = Vec::with_capacity(3);
    for (index, period) in [Period::Early, Period::Middle, Period::Recent].into_iter().enumerate() {
        let sampled = sample_evenly(slices[index], fitted[index]);
        periods.push(PeriodTrace {
            period,
            available: slices[index].len(),
            quota: nominal[index],
            selected: sampled.len(),
        });
        records.extend(sampled);
    }

    TemporalSelection {
        records,
        trace: SelectionTrace { total, limit, passthrough: false, periods },
    }
}

/// Selects at most `limit` reflections spanning the whole history, oldest
/// first. The input slice is left untouched.
#[must_use]
pub fn select_temporal_context<T: Clone>(
    reflections: &[ReflectionRecord<T>],
    limit: usize,
) -> Vec<ReflectionRecord<T>> {
    select_temporal_context_traced(reflections, limit).records
}
