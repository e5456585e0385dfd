use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Modification and access times carried by one `T` record.
///
/// The protocol always transmits the pair together, so the type has no
/// half-present state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimePair {
    mtime: SystemTime,
    atime: SystemTime,
}

impl TimePair {
    /// Creates a pair from modification and access times.
    #[must_use]
    pub const fn new(mtime: SystemTime, atime: SystemTime) -> Self {
        Self { mtime, atime }
    }

    /// Returns the modification time.
    #[must_use]
    pub const fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// Returns the access time.
    #[must_use]
    pub const fn atime(&self) -> SystemTime {
        self.atime
    }

    /// Converts the pair to its wire representation, `(mtime, atime)`.
    #[must_use]
    pub fn to_wire(&self) -> (WireTime, WireTime) {
        (
            WireTime::from_system_time(self.mtime),
            WireTime::from_system_time(self.atime),
        )
    }

    /// Rebuilds a pair from decoded wire timestamps.
    #[must_use]
    pub fn from_wire(mtime: WireTime, atime: WireTime) -> Self {
        Self {
            mtime: mtime.to_system_time(),
            atime: atime.to_system_time(),
        }
    }
}

/// One timestamp as the `T` record encodes it: Unix seconds plus
/// microseconds, truncated toward zero.
///
/// The classic protocol has no encoding for pre-epoch times; such values
/// clamp to the epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireTime {
    seconds: u64,
    microseconds: u32,
}

impl WireTime {
    /// Builds a wire timestamp, rejecting microsecond values of one
    /// million or more.
    #[must_use]
    pub const fn new(seconds: u64, microseconds: u32) -> Option<Self> {
        if microseconds < 1_000_000 {
            Some(Self {
                seconds,
                microseconds,
            })
        } else {
            None
        }
    }

    /// Returns the whole-second part.
    #[must_use]
    pub const fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Returns the sub-second part in microseconds, always below one
    /// million.
    #[must_use]
    pub const fn microseconds(&self) -> u32 {
        self.microseconds
    }

    /// Truncates a [`SystemTime`] to microsecond precision.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self {
                seconds: elapsed.as_secs(),
                microseconds: elapsed.subsec_micros(),
            },
            Err(_) => Self {
                seconds: 0,
                microseconds: 0,
            },
        }
    }

    /// Converts back to a [`SystemTime`].
    #[must_use]
    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.seconds, self.microseconds * 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_time_truncates_to_microseconds() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 1_999);
        let wire = WireTime::from_system_time(time);
        assert_eq!(wire.seconds(), 1_700_000_000);
        assert_eq!(wire.microseconds(), 1);
    }

    #[test]
    fn wire_time_clamps_pre_epoch_values() {
        let time = UNIX_EPOCH - Duration::from_secs(10);
        let wire = WireTime::from_system_time(time);
        assert_eq!(wire.seconds(), 0);
        assert_eq!(wire.microseconds(), 0);
    }

    #[test]
    fn wire_time_rejects_overflowing_microseconds() {
        assert!(WireTime::new(1, 1_000_000).is_none());
        assert!(WireTime::new(1, 999_999).is_some());
    }

    #[test]
    fn pair_round_trips_through_wire_representation() {
        let pair = TimePair::new(
            UNIX_EPOCH + Duration::new(1_600_000_000, 250_000_000),
            UNIX_EPOCH + Duration::new(1_600_000_100, 0),
        );
        let (mtime, atime) = pair.to_wire();
        let back = TimePair::from_wire(mtime, atime);
        assert_eq!(back, pair);
    }
}
