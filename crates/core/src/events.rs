use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a dispatched call was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Venue-specific normalizer logic.
    Normalizer,
    /// Generic call forwarded to the venue connector.
    PassThrough,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Normalizer => "normalizer",
            CallKind::PassThrough => "passthrough",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record for one dispatched call. Emitted once, after the call ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodStat {
    /// `shortname:stub:kind:method`
    pub name: String,
    pub kind: CallKind,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Served from the cache without calling through.
    pub cached: bool,
    /// The call produced a success outcome.
    pub ok: bool,
}

impl MethodStat {
    pub fn start(shortname: &str, stub: &str, kind: CallKind, method: &str) -> Self {
        Self {
            name: [shortname, stub, kind.as_str(), method].join(":"),
            kind,
            method: method.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            cached: false,
            ok: false,
        }
    }

    pub fn end(mut self, ok: bool) -> Self {
        self.ended_at = Some(Utc::now());
        self.ok = ok;
        self
    }

    /// Wall time spent, zero if the stat was never ended.
    pub fn elapsed(&self) -> chrono::Duration {
        self.ended_at
            .map(|end| end - self.started_at)
            .unwrap_or_else(chrono::Duration::zero)
    }
}
