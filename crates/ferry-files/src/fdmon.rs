//! Best-effort file-descriptor headroom checks.
//!
//! The writer discipline keeps descriptor use flat, but a receiver that
//! is already near its limit deserves a heads-up before a large batch
//! starts. Everything here is advisory: on platforms where the numbers
//! cannot be read, the check silently does nothing.

use crate::warnlog::WarningSink;

/// Snapshot of process descriptor usage.
#[derive(Debug, Clone, Copy)]
pub struct FdUsage {
    /// Currently open descriptors
    pub current: u64,
    /// Soft limit (`RLIMIT_NOFILE`)
    pub soft_limit: u64,
}

/// Read current descriptor usage and the soft limit.
///
/// Returns `None` where either number is unavailable (non-Linux
/// descriptor counting, non-Unix limits, unlimited rlimit).
#[must_use]
pub fn fd_usage() -> Option<FdUsage> {
    Some(FdUsage {
        current: open_fd_count()?,
        soft_limit: fd_soft_limit()?,
    })
}

/// Warn when an incoming batch would push usage past 80% of the limit.
pub fn check_fd_headroom(incoming_files: u64, warnings: &WarningSink) {
    let Some(usage) = fd_usage() else {
        return;
    };

    if over_threshold(usage.current, incoming_files, usage.soft_limit) {
        warnings.warn(&format!(
            "descriptor headroom low: {} open + {} incoming vs soft limit {}",
            usage.current, incoming_files, usage.soft_limit
        ));
    }
}

/// `current + incoming > 0.8 * limit`, in integer arithmetic.
fn over_threshold(current: u64, incoming: u64, limit: u64) -> bool {
    let projected = current.saturating_add(incoming);
    projected.saturating_mul(5) > limit.saturating_mul(4)
}

#[cfg(target_os = "linux")]
fn open_fd_count() -> Option<u64> {
    let entries = std::fs::read_dir("/proc/self/fd").ok()?;
    // The read_dir handle itself is one of the entries; do not count it.
    Some(entries.count().saturating_sub(1) as u64)
}

#[cfg(not(target_os = "linux"))]
fn open_fd_count() -> Option<u64> {
    None
}

#[cfg(unix)]
fn fd_soft_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as u64)
}

#[cfg(not(unix))]
fn fd_soft_limit() -> Option<u64> {
    None
}
