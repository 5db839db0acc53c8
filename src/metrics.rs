//! Process-wide counters for container sessions.
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static SESSIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
static MIRRORS_ATTACHED: AtomicU64 = AtomicU64::new(0);
static PROMOTIONS: AtomicU64 = AtomicU64::new(0);
static FLUSHES: AtomicU64 = AtomicU64::new(0);
static FLUSH_FAILURES: AtomicU64 = AtomicU64::new(0);
static OPEN_FAILURES: AtomicU64 = AtomicU64::new(0);
static SILENT_CLOSES: AtomicU64 = AtomicU64::new(0);
static NOTIFIED_CLOSES: AtomicU64 = AtomicU64::new(0);

pub fn inc_sessions_opened() {
    SESSIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sessions_closed() {
    SESSIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_mirrors_attached() {
    MIRRORS_ATTACHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_promotions() {
    PROMOTIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_flushes() {
    FLUSHES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_flush_failures() {
    FLUSH_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_open_failures() {
    OPEN_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_silent_closes() {
    SILENT_CLOSES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_notified_closes() {
    NOTIFIED_CLOSES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_active: u64,
    pub mirrors_attached: u64,
    pub promotions: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub open_failures: u64,
    pub silent_closes: u64,
    pub notified_closes: u64,
}

pub fn snapshot() -> Snapshot {
    let opened = SESSIONS_OPENED.load(Ordering::Relaxed);
    let closed = SESSIONS_CLOSED.load(Ordering::Relaxed);
    Snapshot {
        sessions_opened: opened,
        sessions_closed: closed,
        sessions_active: opened.saturating_sub(closed),
        mirrors_attached: MIRRORS_ATTACHED.load(Ordering::Relaxed),
        promotions: PROMOTIONS.load(Ordering::Relaxed),
        flushes: FLUSHES.load(Ordering::Relaxed),
        flush_failures: FLUSH_FAILURES.load(Ordering::Relaxed),
        open_failures: OPEN_FAILURES.load(Ordering::Relaxed),
        silent_closes: SILENT_CLOSES.load(Ordering::Relaxed),
        notified_closes: NOTIFIED_CLOSES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_sessions_opened();
        inc_promotions();
        let after = snapshot();
        assert!(after.sessions_opened > before.sessions_opened);
        assert!(after.promotions > before.promotions);
    }
}
