//! Randomness, sleep, clock and last-error services.

use crate::error;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Julian day number of the Unix epoch.
pub const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

/// The Unix epoch as a Julian day in milliseconds.
pub const UNIX_EPOCH_JULIAN_MS: i64 = 210_866_760_000_000;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Signed milliseconds between the Unix epoch and `at`.
fn unix_millis(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
    }
}

/// Returns `at` as a fractional Julian day.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn julian_day(at: SystemTime) -> f64 {
    UNIX_EPOCH_JULIAN_DAY + unix_millis(at) as f64 / MS_PER_DAY
}

/// Returns `at` as a Julian day scaled to milliseconds.
#[must_use]
pub fn julian_day_ms(at: SystemTime) -> i64 {
    UNIX_EPOCH_JULIAN_MS.saturating_add(unix_millis(at))
}

/// The host services a VFS hands to the engine besides file access.
///
/// Stateless: every call reads the host clock or entropy source afresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostServices;

impl HostServices {
    /// Creates the services.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fills `buf` with best-effort random bytes and returns its length.
    ///
    /// Each call seeds a new generator from host entropy. Not suitable for
    /// cryptographic use.
    pub fn randomness(&self, buf: &mut [u8]) -> usize {
        let mut rng = StdRng::from_entropy();
        for chunk in buf.chunks_mut(4) {
            let word = rng.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        buf.len()
    }

    /// Sleeps at least `micros` microseconds and returns the time slept.
    pub fn sleep(&self, micros: u64) -> u64 {
        let start = Instant::now();
        thread::sleep(Duration::from_micros(micros));
        u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Returns the current UTC time as a fractional Julian day.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        julian_day(SystemTime::now())
    }

    /// Returns the current UTC time as a Julian day in milliseconds.
    #[must_use]
    pub fn current_time_i64(&self) -> i64 {
        julian_day_ms(SystemTime::now())
    }

    /// Copies the last host failure message of this thread into `buf`.
    ///
    /// Falls back to the operating system's last error when no provider
    /// failure has been recorded. The message is truncated to leave room
    /// for a trailing NUL, which is always written when `buf` is non-empty.
    /// Returns the number of message bytes copied.
    pub fn last_error(&self, buf: &mut [u8]) -> usize {
        let Some(room) = buf.len().checked_sub(1) else {
            return 0;
        };
        let message = error::last_error().unwrap_or_else(|| io::Error::last_os_error().to_string());
        let len = message.len().min(room);
        buf[..len].copy_from_slice(&message.as_bytes()[..len]);
        buf[len] = 0;
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_julian_constant() {
        assert_eq!(julian_day(UNIX_EPOCH), UNIX_EPOCH_JULIAN_DAY);
        assert_eq!(julian_day_ms(UNIX_EPOCH), UNIX_EPOCH_JULIAN_MS);
    }

    #[test]
    fn one_day_after_epoch() {
        let day = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(julian_day(day), UNIX_EPOCH_JULIAN_DAY + 1.0);
        assert_eq!(julian_day_ms(day), UNIX_EPOCH_JULIAN_MS + 86_400_000);
    }

    #[test]
    fn before_epoch_is_earlier() {
        let before = UNIX_EPOCH - Duration::from_secs(43_200);
        assert_eq!(julian_day(before), UNIX_EPOCH_JULIAN_DAY - 0.5);
    }

    #[test]
    fn current_time_variants_agree() {
        let services = HostServices::new();
        let day = services.current_time();
        let ms = services.current_time_i64();
        // 2020-01-01 is Julian day 2458849.5
        assert!(day > 2_458_849.5);
        #[allow(clippy::cast_precision_loss)]
        let from_ms = ms as f64 / MS_PER_DAY;
        assert!((from_ms - day).abs() < 1.0 / 24.0);
    }

    #[test]
    fn randomness_fills_odd_lengths() {
        let services = HostServices::new();
        let mut a = [0u8; 37];
        let mut b = [0u8; 37];
        assert_eq!(services.randomness(&mut a), 37);
        services.randomness(&mut b);
        assert_ne!(a, b);
        assert_eq!(services.randomness(&mut []), 0);
    }

    #[test]
    fn sleep_waits_at_least_requested() {
        let slept = HostServices::new().sleep(2_000);
        assert!(slept >= 2_000);
    }

    #[test]
    fn last_error_truncates_with_nul() {
        let services = HostServices::new();
        error::set_last_error("disk full on volume 7");

        let mut small = [0xFFu8; 5];
        assert_eq!(services.last_error(&mut small), 4);
        assert_eq!(&small, b"disk\0");

        let mut large = [0xFFu8; 64];
        let n = services.last_error(&mut large);
        assert_eq!(&large[..n], b"disk full on volume 7");
        assert_eq!(large[n], 0);

        assert_eq!(services.last_error(&mut []), 0);
        error::clear_last_error();
    }
}
