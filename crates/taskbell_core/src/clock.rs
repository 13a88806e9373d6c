use std::sync::Mutex;
use time::{OffsetDateTime, UtcOffset};

/// Source of the current instant and the local offset used for calendar math.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;

    fn local_offset(&self) -> UtcOffset;

    fn now_local(&self) -> OffsetDateTime {
        let now = self.now_utc();
        now.checked_to_offset(self.local_offset()).unwrap_or(now)
    }
}

pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    /// Captures the local offset once; `time` refuses to read it after threads
    /// are spawned on some platforms, so it falls back to UTC.
    pub fn new() -> Self {
        Self {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn local_offset(&self) -> UtcOffset {
        self.offset
    }
}

/// Manually driven clock for tests and replays.
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
    offset: UtcOffset,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            offset: now.offset(),
            now: Mutex::new(now),
        }
    }

    pub fn with_offset(now: OffsetDateTime, offset: UtcOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .to_offset(UtcOffset::UTC)
    }

    fn local_offset(&self) -> UtcOffset {
        self.offset
    }
}
