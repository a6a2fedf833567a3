//! Expiration policies.
//!
//! A policy is plain data plus a pure evaluation function over a ticket's
//! usage timestamps and the current time. Policies never look at the wall
//! clock themselves.
//!
//! | Policy | Expired when |
//! |---|---|
//! | `Never` | never |
//! | `HardTimeout` | `now - creation > time_to_kill` |
//! | `Timeout` | `now - last_used > time_to_idle` |
//! | `TicketGranting` | hard cap OR idle cap exceeded (0 disables a cap) |
//! | `MultiTimeUseOrTimeout` | uses exhausted OR `now - last_used > time_to_kill` |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default TGT hard cap (8 hours)
pub const DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS: u64 = 28_800;

/// Default TGT idle cap (2 hours)
pub const DEFAULT_TGT_TIME_TO_IDLE_SECONDS: u64 = 7_200;

/// Default ST kill time (5 minutes)
pub const DEFAULT_ST_TIME_TO_KILL_SECONDS: u64 = 300;

/// Default ST use count
pub const DEFAULT_ST_NUMBER_OF_USES: u32 = 1;

/// Default PT kill time
pub const DEFAULT_PT_TIME_TO_KILL_SECONDS: u64 = 10;

/// Default PT use count
pub const DEFAULT_PT_NUMBER_OF_USES: u32 = 1;

/// Default transient session ticket kill time (5 minutes)
pub const DEFAULT_TST_TIME_TO_KILL_SECONDS: u64 = 300;

/// Usage metadata an expiration policy evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketUsage {
    pub creation_time: DateTime<Utc>,
    pub last_time_used: DateTime<Utc>,
    pub count_of_uses: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Never expires on its own (only by explicit invalidation)
    Never,
    /// Flat kill time measured from creation, no idle component
    HardTimeout { time_to_kill_seconds: u64 },
    /// Idle timeout measured from last use
    Timeout { time_to_idle_seconds: u64 },
    /// Hard cap from creation plus idle cap from last use
    TicketGranting {
        max_time_to_live_seconds: u64,
        time_to_idle_seconds: u64,
    },
    /// Limited number of uses within a kill time from last use
    MultiTimeUseOrTimeout {
        time_to_kill_seconds: u64,
        number_of_uses: u32,
    },
}

impl ExpirationPolicy {
    pub fn is_expired(&self, usage: &TicketUsage, now: DateTime<Utc>) -> bool {
        match *self {
            ExpirationPolicy::Never => false,
            ExpirationPolicy::HardTimeout {
                time_to_kill_seconds,
            } => exceeded(usage.creation_time, now, time_to_kill_seconds),
            ExpirationPolicy::Timeout {
                time_to_idle_seconds,
            } => exceeded(usage.last_time_used, now, time_to_idle_seconds),
            ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds,
                time_to_idle_seconds,
            } => {
                let hard = max_time_to_live_seconds > 0
                    && exceeded(usage.creation_time, now, max_time_to_live_seconds);
                let idle = time_to_idle_seconds > 0
                    && exceeded(usage.last_time_used, now, time_to_idle_seconds);
                hard || idle
            }
            ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds,
                number_of_uses,
            } => {
                usage.count_of_uses >= number_of_uses
                    || exceeded(usage.last_time_used, now, time_to_kill_seconds)
            }
        }
    }

    /// Seconds until the ticket expires by time alone, `None` if unbounded.
    ///
    /// Used to derive the physical TTL handed to storage backends; the value
    /// is rounded up and never negative.
    pub fn remaining_lifetime(&self, usage: &TicketUsage, now: DateTime<Utc>) -> Option<u64> {
        let deadline = match *self {
            ExpirationPolicy::Never => None,
            ExpirationPolicy::HardTimeout {
                time_to_kill_seconds,
            } => Some(deadline(usage.creation_time, time_to_kill_seconds)),
            ExpirationPolicy::Timeout {
                time_to_idle_seconds,
            } => Some(deadline(usage.last_time_used, time_to_idle_seconds)),
            ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds,
                time_to_idle_seconds,
            } => {
                let hard = (max_time_to_live_seconds > 0)
                    .then(|| deadline(usage.creation_time, max_time_to_live_seconds));
                let idle = (time_to_idle_seconds > 0)
                    .then(|| deadline(usage.last_time_used, time_to_idle_seconds));
                match (hard, idle) {
                    (Some(h), Some(i)) => Some(h.min(i)),
                    (h, i) => h.or(i),
                }
            }
            ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds,
                ..
            } => Some(deadline(usage.last_time_used, time_to_kill_seconds)),
        }?;

        let remaining_ms = deadline.signed_duration_since(now).num_milliseconds().max(0);
        // Round up to whole seconds
        Some(u64::try_from(remaining_ms).unwrap_or(0).div_ceil(1000))
    }

    /// The policy's nominal maximum lifetime in seconds, `None` if unbounded.
    pub fn time_to_live(&self) -> Option<u64> {
        match *self {
            ExpirationPolicy::Never => None,
            ExpirationPolicy::HardTimeout {
                time_to_kill_seconds,
            }
            | ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds,
                ..
            } => Some(time_to_kill_seconds),
            ExpirationPolicy::Timeout {
                time_to_idle_seconds,
            } => Some(time_to_idle_seconds),
            ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds,
                time_to_idle_seconds,
            } => match (max_time_to_live_seconds, time_to_idle_seconds) {
                (0, 0) => None,
                (0, idle) => Some(idle),
                (max, _) => Some(max),
            },
        }
    }
}

fn limit(seconds: u64) -> Duration {
    let millis = i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    Duration::milliseconds(millis)
}

fn exceeded(since: DateTime<Utc>, now: DateTime<Utc>, seconds: u64) -> bool {
    now.signed_duration_since(since) > limit(seconds)
}

fn deadline(since: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    since
        .checked_add_signed(limit(seconds))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
