//! Microsecond-precision UTC timestamps and the wire TIME grammar.
//!
//! The handshake transmits time windows as `Y,Mo,D,H,Mi,S[,micros]` where
//! the microsecond field is zero-padded to 6 digits and included only when
//! nonzero, and an empty spec means "unset". Both quirks are frozen wire
//! behavior and must round-trip exactly.

use crate::error::{CapsError, Result};

/// UTC timestamp as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    micros: i64,
}

impl Time {
    /// Build from epoch seconds and a sub-second microsecond part.
    /// Returns `None` when the value does not fit the microsecond range;
    /// wire headers carry arbitrary i64 seconds, so this must not wrap.
    pub fn from_epoch(seconds: i64, micros: i64) -> Option<Self> {
        let micros = seconds.checked_mul(1_000_000)?.checked_add(micros)?;
        Some(Self { micros })
    }

    /// Build from civil components. Returns `None` for out-of-range fields
    /// (month 13, Feb 30, hour 24, micros >= 1_000_000, ...).
    pub fn from_civil(
        year: i64,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        micros: u32,
    ) -> Option<Self> {
        if !(1..=12).contains(&month) || hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        if micros >= 1_000_000 {
            return None;
        }
        let lengths = month_lengths(year);
        if day < 1 || day > lengths[(month - 1) as usize] {
            return None;
        }

        let mut days: i64 = 0;
        if year >= 1970 {
            for y in 1970..year {
                days += if is_leap(y) { 366 } else { 365 };
            }
        } else {
            for y in year..1970 {
                days -= if is_leap(y) { 366 } else { 365 };
            }
        }
        for &len in lengths.iter().take((month - 1) as usize) {
            days += len as i64;
        }
        days += (day as i64) - 1;

        let seconds =
            days * 86400 + (hour as i64) * 3600 + (minute as i64) * 60 + (second as i64);
        Self::from_epoch(seconds, micros as i64)
    }

    /// Build from a year and 1-based day-of-year, as used by miniSEED BTime.
    pub fn from_year_doy(
        year: i64,
        doy: u32,
        hour: u32,
        minute: u32,
        second: u32,
        micros: u32,
    ) -> Option<Self> {
        let max_doy = if is_leap(year) { 366 } else { 365 };
        if doy < 1 || doy > max_doy {
            return None;
        }
        let lengths = month_lengths(year);
        let mut month = 1u32;
        let mut day = doy;
        for (i, &len) in lengths.iter().enumerate() {
            if day <= len {
                month = i as u32 + 1;
                break;
            }
            day -= len;
        }
        Self::from_civil(year, month, day, hour, minute, second, micros)
    }

    /// Whole seconds since the Unix epoch (truncated towards negative infinity).
    pub fn epoch_seconds(self) -> i64 {
        self.micros.div_euclid(1_000_000)
    }

    /// Sub-second microsecond part, always in `0..1_000_000`.
    pub fn subsec_micros(self) -> u32 {
        self.micros.rem_euclid(1_000_000) as u32
    }

    /// Total microseconds since the Unix epoch.
    pub fn epoch_micros(self) -> i64 {
        self.micros
    }

    /// Shift by a signed number of microseconds, saturating at the
    /// representable range.
    pub fn add_micros(self, delta: i64) -> Self {
        Self {
            micros: self.micros.saturating_add(delta),
        }
    }

    /// Decompose into `(year, month, day, hour, minute, second, micros)`.
    pub fn civil(self) -> (i64, u32, u32, u32, u32, u32, u32) {
        let secs = self.epoch_seconds();
        let micros = self.subsec_micros();
        let mut days = secs.div_euclid(86400);
        let rem = secs.rem_euclid(86400);
        let hour = (rem / 3600) as u32;
        let minute = (rem % 3600 / 60) as u32;
        let second = (rem % 60) as u32;

        let mut year: i64 = 1970;
        if days >= 0 {
            loop {
                let len = if is_leap(year) { 366 } else { 365 };
                if days < len {
                    break;
                }
                days -= len;
                year += 1;
            }
        } else {
            while days < 0 {
                year -= 1;
                days += if is_leap(year) { 366 } else { 365 };
            }
        }

        let lengths = month_lengths(year);
        let mut month = 1u32;
        let mut day = days as u32;
        for (i, &len) in lengths.iter().enumerate() {
            if day < len {
                month = i as u32 + 1;
                break;
            }
            day -= len;
        }
        (year, month, day + 1, hour, minute, second, micros)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (y, mo, d, h, mi, s, us) = self.civil();
        write!(f, "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}")
    }
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

fn month_lengths(year: i64) -> [u32; 12] {
    let leap = is_leap(year);
    [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ]
}

/// Parse one side of a `TIME` window. Empty means unset.
pub fn parse_spec(spec: &str) -> Result<Option<Time>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 6 && parts.len() != 7 {
        return Err(CapsError::InvalidTimeSpec(spec.to_owned()));
    }

    let field = |i: usize| -> Result<i64> {
        parts[i]
            .parse()
            .map_err(|_| CapsError::InvalidTimeSpec(spec.to_owned()))
    };

    let year = field(0)?;
    let month = field(1)? as u32;
    let day = field(2)? as u32;
    let hour = field(3)? as u32;
    let minute = field(4)? as u32;
    let second = field(5)? as u32;
    let micros = if parts.len() == 7 { field(6)? as u32 } else { 0 };

    Time::from_civil(year, month, day, hour, minute, second, micros)
        .map(Some)
        .ok_or_else(|| CapsError::InvalidTimeSpec(spec.to_owned()))
}

/// Format one side of a `TIME` window. Unset formats as the empty string;
/// the microsecond field appears only when nonzero, zero-padded to 6 digits.
pub fn format_spec(time: Option<Time>) -> String {
    match time {
        None => String::new(),
        Some(t) => {
            let (y, mo, d, h, mi, s, us) = t.civil();
            if us == 0 {
                format!("{y},{mo},{d},{h},{mi},{s}")
            } else {
                format!("{y},{mo},{d},{h},{mi},{s},{us:06}")
            }
        }
    }
}
