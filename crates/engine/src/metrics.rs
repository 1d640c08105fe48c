use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tracing::trace;
use tradegate_core::*;

/// Stats kept for the most recent calls.
const RECENT_LIMIT: usize = 256;

/// Aggregate stats for one `shortname:stub:kind:method` name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodSummary {
    pub name: String,
    pub calls: usize,
    pub cached: usize,
    pub errors: usize,
    pub total_ms: i64,
    pub max_ms: i64,
}

impl MethodSummary {
    /// Percentage of calls served from the cache.
    pub fn hit_rate(&self) -> Decimal {
        if self.calls == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.cached) / Decimal::from(self.calls) * dec!(100)
        }
    }

    /// Mean wall time of calls that went through to the venue.
    pub fn avg_ms(&self) -> Decimal {
        let through = self.calls - self.cached;
        if through == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.total_ms) / Decimal::from(through)
        }
    }

    fn add(&mut self, stat: &MethodStat) {
        self.calls += 1;
        if stat.cached {
            self.cached += 1;
        } else {
            let ms = stat.elapsed().num_milliseconds();
            self.total_ms += ms;
            self.max_ms = self.max_ms.max(ms);
        }
        if !stat.ok {
            self.errors += 1;
        }
    }
}

#[derive(Default)]
struct Aggregates {
    summaries: BTreeMap<String, MethodSummary>,
    recent: VecDeque<MethodStat>,
}

/// In-process [`StatsRecorder`] keeping per-method totals and a window of recent calls.
#[derive(Default)]
pub struct StatsAggregator {
    inner: Mutex<Aggregates>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, name: &str) -> Option<MethodSummary> {
        self.lock().summaries.get(name).cloned()
    }

    /// Every summary, ordered by name.
    pub fn summaries(&self) -> Vec<MethodSummary> {
        self.lock().summaries.values().cloned().collect()
    }

    /// Most recent calls, oldest first.
    pub fn recent(&self) -> Vec<MethodStat> {
        self.lock().recent.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Aggregates> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatsRecorder for StatsAggregator {
    fn record(&self, stat: MethodStat) {
        trace!(name = %stat.name, cached = stat.cached, ok = stat.ok, "Call recorded");
        let mut inner = self.lock();
        inner
            .summaries
            .entry(stat.name.clone())
            .or_insert_with(|| MethodSummary {
                name: stat.name.clone(),
                ..Default::default()
            })
            .add(&stat);
        if inner.recent.len() == RECENT_LIMIT {
            inner.recent.pop_front();
        }
        inner.recent.push_back(stat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(method: &str, cached: bool, ok: bool) -> MethodStat {
        let mut stat = MethodStat::start("main", "b1", CallKind::PassThrough, method);
        stat.cached = cached;
        stat.end(ok)
    }

    #[test]
    fn test_summary_counts() {
        let stats = StatsAggregator::new();
        stats.record(stat("fetch_balance", false, true));
        stats.record(stat("fetch_balance", true, true));
        stats.record(stat("fetch_balance", true, true));
        stats.record(stat("fetch_balance", false, false));

        let summary = stats.summary("main:b1:passthrough:fetch_balance").unwrap();
        assert_eq!(summary.calls, 4);
        assert_eq!(summary.cached, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.hit_rate(), dec!(50));
        assert!(stats.summary("main:b1:passthrough:fetch_ticker").is_none());
    }

    #[test]
    fn test_empty_summary_rates() {
        let summary = MethodSummary::default();
        assert_eq!(summary.hit_rate(), Decimal::ZERO);
        assert_eq!(summary.avg_ms(), Decimal::ZERO);
    }

    #[test]
    fn test_recent_window_is_bounded() {
        let stats = StatsAggregator::new();
        for _ in 0..RECENT_LIMIT + 10 {
            stats.record(stat("fetch_ticker", false, true));
        }
        assert_eq!(stats.recent().len(), RECENT_LIMIT);
        assert_eq!(stats.summaries().len(), 1);
        assert_eq!(stats.summaries()[0].calls, RECENT_LIMIT + 10);
    }
}
