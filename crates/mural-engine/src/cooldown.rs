use chrono::{DateTime, Utc};

/// Outcome of the per-(board, actor) rate check. `retry_after_seconds` is
/// only meaningful when `allowed` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownVerdict {
    pub allowed: bool,
    pub retry_after_seconds: i64,
}

const ALLOWED: CooldownVerdict = CooldownVerdict {
    allowed: true,
    retry_after_seconds: 0,
};

/// Pure gate: compares `now` against the actor's last accepted placement.
/// A rejection records nothing; the caller must only write state for allowed
/// placements, inside the same transaction that re-read `last_placement_at`.
pub fn check(
    last_placement_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_seconds: i64,
) -> CooldownVerdict {
    if cooldown_seconds <= 0 {
        return ALLOWED;
    }
    let Some(last) = last_placement_at else {
        return ALLOWED;
    };

    let elapsed_ms = (now - last).num_milliseconds();
    let window_ms = cooldown_seconds.saturating_mul(1000);
    if elapsed_ms >= window_ms {
        return ALLOWED;
    }

    // Ceil to whole seconds so the client never retries early.
    let remaining_ms = window_ms - elapsed_ms;
    CooldownVerdict {
        allowed: false,
        retry_after_seconds: (remaining_ms + 999) / 1000,
    }
}
