//! Time types and wait timeouts.

/// Nanoseconds since some arbitrary epoch.
///
/// Only differences between instants from the same clock are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    /// Create a new instant from nanoseconds since epoch.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get nanoseconds since epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Read the architecture counter.
    ///
    /// On AArch64 this is the Generic Timer (`CNTPCT_EL0` scaled by
    /// `CNTFRQ_EL0`). Other targets have no portable counter without an OS
    /// and always read zero; hosted code should use the scheduler's clock.
    pub fn now() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            let cnt: u64;
            let freq: u64;
            unsafe {
                core::arch::asm!(
                    "mrs {}, cntpct_el0",
                    out(reg) cnt,
                    options(nostack, nomem, preserves_flags)
                );
                core::arch::asm!(
                    "mrs {}, cntfrq_el0",
                    out(reg) freq,
                    options(nostack, nomem, preserves_flags)
                );
            }
            // u128 keeps ticks * 1e9 from overflowing
            let nanos = if freq > 0 {
                ((cnt as u128 * 1_000_000_000) / freq as u128) as u64
            } else {
                0
            };
            Self(nanos)
        }

        #[cfg(not(target_arch = "aarch64"))]
        {
            Self(0)
        }
    }

    /// Duration since `earlier`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Instant) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// `self + duration`, saturating at the end of time.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        self.saturating_add(duration)
    }
}

/// A duration of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// The empty duration.
    pub const ZERO: Duration = Duration(0);

    /// Create a duration from nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create a duration from microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Create a duration from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Create a duration from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Get nanoseconds in this duration.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Get microseconds in this duration.
    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get milliseconds in this duration.
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Whether this duration is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<core::time::Duration> for Duration {
    fn from(d: core::time::Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<Duration> for core::time::Duration {
    fn from(d: Duration) -> Self {
        core::time::Duration::from_nanos(d.0)
    }
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately if the resource is unavailable.
    NoWait,
    /// Wait until the resource becomes available, however long that takes.
    Forever,
    /// Wait at most this long.
    After(Duration),
}

impl Timeout {
    /// Bounded timeout in milliseconds. Zero means [`Timeout::NoWait`].
    pub const fn from_millis(millis: u64) -> Self {
        Self::after(Duration::from_millis(millis))
    }

    /// Bounded timeout in microseconds. Zero means [`Timeout::NoWait`].
    pub const fn from_micros(micros: u64) -> Self {
        Self::after(Duration::from_micros(micros))
    }

    /// Bounded timeout. A zero duration means [`Timeout::NoWait`].
    pub const fn after(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(duration)
        }
    }

    /// Whether the caller must not be suspended.
    pub fn is_no_wait(self) -> bool {
        match self {
            Timeout::NoWait => true,
            Timeout::Forever => false,
            Timeout::After(d) => d.is_zero(),
        }
    }

    /// Absolute deadline relative to `now`; `None` means no deadline.
    pub fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Timeout::NoWait => Some(now),
            Timeout::Forever => None,
            Timeout::After(d) => Some(now + d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::after(d)
    }
}
