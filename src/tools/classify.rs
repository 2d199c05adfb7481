//! Threshold classification shared by the check tools
//!
//! Every function is monotone: a worse input never yields a better severity.

use std::time::Duration;

use crate::collaborators::RateLimitInfo;
use crate::config::defaults;
use crate::types::Severity;

/// `done / total`, with an empty population counted as complete.
pub fn completion_rate(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        (done.min(total) as f64) / (total as f64)
    }
}

/// `< 0.5` Critical, `[0.5, 0.8)` Degraded, otherwise Healthy.
pub fn classify_ratio(rate: f64) -> Severity {
    if rate.is_nan() || rate < defaults::RATIO_CRITICAL_BELOW {
        Severity::Critical
    } else if rate < defaults::RATIO_DEGRADED_BELOW {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}

/// `age >= stuck` Degraded, `age >= stuck * multiplier` Critical.
pub fn classify_staleness(age: Duration, stuck: Duration, critical_multiplier: u32) -> Severity {
    let critical = stuck.saturating_mul(critical_multiplier.max(1));
    if age >= critical {
        Severity::Critical
    } else if age >= stuck {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}

/// Latency strictly above `slow` is Degraded.
pub fn classify_latency(latency: Duration, slow: Duration) -> Severity {
    if latency > slow {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}

/// `usage >= critical` Critical, `usage >= warning` Degraded.
pub fn classify_usage(usage: f64, warning: f64, critical: f64) -> Severity {
    if usage.is_nan() || usage >= critical {
        Severity::Critical
    } else if usage >= warning {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}

/// Exhausted budget Critical, below `warning_ratio` of the limit Degraded.
pub fn classify_remaining(info: &RateLimitInfo, warning_ratio: f64) -> Severity {
    if info.limit > 0 && info.remaining == 0 {
        Severity::Critical
    } else if info.remaining_ratio() < warning_ratio {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}
