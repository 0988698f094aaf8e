//! Hybrid timestamps, read times, TTLs, and user-supplied timestamps
//!
//! Every stored record version is tagged with a [`HybridTime`]. Reads pick the
//! newest version at or below their [`ReadHybridTime`]; expiry is computed from
//! the version's write time plus its [`Ttl`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A point on the hybrid clock, stored as microseconds.
///
/// The engine never generates these itself; commit times come from the caller
/// (or the in-memory store's test clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HybridTime(u64);

impl HybridTime {
    /// The earliest representable time. Sorts before every real write.
    pub const MIN: HybridTime = HybridTime(0);
    /// The latest representable time.
    pub const MAX: HybridTime = HybridTime(u64::MAX);

    /// Builds a hybrid time from a microsecond count.
    pub const fn from_micros(micros: u64) -> Self {
        HybridTime(micros)
    }

    /// Microseconds since the clock epoch.
    pub const fn micros(&self) -> u64 {
        self.0
    }

    /// Saturating addition of a duration, in microsecond resolution.
    pub fn saturating_add(&self, d: Duration) -> HybridTime {
        HybridTime(self.0.saturating_add(d.as_micros() as u64))
    }
}

/// The snapshot time a read runs at.
///
/// Versions written at or below `read` are visible. Versions in the
/// uncertainty window `(read, global_limit]` are not visible but may force
/// the read to restart at a higher time; versions above `global_limit` are
/// known to be concurrent and are ignored outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHybridTime {
    /// Versions with write time `<= read` are visible.
    pub read: HybridTime,
    /// Upper edge of the uncertainty window. Never below `read`.
    pub global_limit: HybridTime,
}

impl ReadHybridTime {
    /// Read at the given time with an empty uncertainty window.
    pub const fn at(read: HybridTime) -> Self {
        ReadHybridTime { read, global_limit: read }
    }

    /// Read at `read` with uncertainty up to `global_limit`.
    pub fn with_uncertainty(read: HybridTime, global_limit: HybridTime) -> Self {
        ReadHybridTime { read, global_limit: global_limit.max(read) }
    }

    /// Read at the maximum time, seeing every committed version.
    pub const fn latest() -> Self {
        ReadHybridTime { read: HybridTime::MAX, global_limit: HybridTime::MAX }
    }
}

/// Running maximum of write times a read had to skip past its snapshot.
///
/// When a scan observes a version newer than its read time, the read may have
/// to restart at or above that time to stay consistent. The hint is folded as
/// a maximum across every lookup a statement performs and surfaced to the
/// caller, who decides whether to retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartReadHt(Option<HybridTime>);

impl RestartReadHt {
    /// No restart required so far.
    pub const fn none() -> Self {
        RestartReadHt(None)
    }

    /// Folds in another observed time, keeping the maximum.
    pub fn make_at_least(&mut self, ht: HybridTime) {
        match self.0 {
            Some(cur) if cur >= ht => {}
            _ => self.0 = Some(ht),
        }
    }

    /// Folds in another hint.
    pub fn merge(&mut self, other: RestartReadHt) {
        if let Some(ht) = other.0 {
            self.make_at_least(ht);
        }
    }

    /// The restart time, if any lookup required one.
    pub fn as_option(&self) -> Option<HybridTime> {
        self.0
    }
}

/// Time-to-live attached to a stored value.
///
/// The default is "no expiry"; [`Ttl::is_unlimited`] distinguishes it from a
/// finite duration. An unlimited write-level TTL defers to the table-level TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ttl(Option<Duration>);

impl Ttl {
    /// No expiry.
    pub const UNLIMITED: Ttl = Ttl(None);

    /// A finite TTL measured in milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Ttl(Some(Duration::from_millis(ms)))
    }

    /// True when the value never expires.
    pub const fn is_unlimited(&self) -> bool {
        self.0.is_none()
    }

    /// The expiry time for a value written at `write_time`, if finite.
    pub fn expiry_time(&self, write_time: HybridTime) -> Option<HybridTime> {
        self.0.map(|d| write_time.saturating_add(d))
    }

    /// True when a value written at `write_time` is already dead at `read`.
    pub fn is_expired_at(&self, write_time: HybridTime, read: HybridTime) -> bool {
        match self.expiry_time(write_time) {
            Some(expiry) => expiry <= read,
            None => false,
        }
    }

    /// Write-level TTL resolution: a finite TTL wins, otherwise the table's.
    pub fn or(self, table_ttl: Ttl) -> Ttl {
        if self.is_unlimited() {
            table_ttl
        } else {
            self
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Ttl::UNLIMITED
    }
}

/// A user-supplied timestamp, in microseconds.
///
/// When present on a write, it replaces the commit hybrid time as the
/// version's write time, so user timestamps and commit times share one
/// ordering domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserTimestamp(pub u64);

impl UserTimestamp {
    /// The hybrid time this timestamp maps to.
    pub fn as_hybrid_time(&self) -> HybridTime {
        HybridTime::from_micros(self.0)
    }
}
