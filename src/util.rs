use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tokio::{
    task::JoinHandle,
    time::{Duration, Instant},
};
use uuid::Uuid;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Prefix of every tail-light identifier
pub const DEVICE_ID_PREFIX: &str = "bike_light_";

static DEVICE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bike_light_[a-zA-Z0-9]{6,12}$").expect("device id pattern is valid")
});

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Format a timestamp as `YYYY/MM/DD HH:MM:SS`
#[must_use]
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format("%Y/%m/%d %H:%M:%S").to_string()
}

/// Zero-pad a number to two digits
#[must_use]
pub fn format_number(n: u32) -> String {
    format!("{n:02}")
}

/// Great-circle distance between two coordinates in meters (haversine)
#[must_use]
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Format a distance: whole meters below 1 km, kilometers with two decimals above
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0}米", meters.round())
    } else {
        format!("{:.2}公里", meters / 1000.0)
    }
}

/// Format a duration as `M:SS`, or `H:MM:SS` from one hour on
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Format a speed given in meters per second as km/h with one decimal
#[must_use]
pub fn format_speed(mps: f64) -> String {
    format!("{:.1}km/h", mps * 3.6)
}

/// Check the `bike_light_` + 6-12 alphanumerics identifier format
#[must_use]
pub fn is_valid_device_id(device_id: &str) -> bool {
    DEVICE_ID_PATTERN.is_match(device_id)
}

/// Loose email address check
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn random_base36(len: usize) -> String {
    let mut digits = to_base36(Uuid::new_v4().as_u128());
    digits.truncate(len);
    digits
}

/// Generate a client-side unique id: `id_` + random part + `_` + time part
#[must_use]
pub fn generate_id() -> String {
    let millis = u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    format!("id_{}_{}", random_base36(9), to_base36(millis))
}

/// Generate a well-formed tail-light identifier
#[must_use]
pub fn generate_device_id() -> String {
    format!("{DEVICE_ID_PREFIX}{}", random_base36(12))
}

/// Delays a callback until calls have stopped for `wait`
///
/// In trailing mode the last callback runs once the burst is over. In
/// leading mode the first callback of a burst runs immediately and the rest
/// of the burst is dropped. Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    wait: Duration,
    immediate: bool,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Trailing-edge debouncer
    #[must_use]
    pub const fn new(wait: Duration) -> Self {
        Self {
            wait,
            immediate: false,
            pending: None,
        }
    }

    /// Leading-edge debouncer
    #[must_use]
    pub const fn leading(wait: Duration) -> Self {
        Self {
            wait,
            immediate: true,
            pending: None,
        }
    }

    /// Register a call
    pub fn call<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let call_now = self.immediate && !self.is_pending();

        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        let wait = self.wait;
        if self.immediate {
            self.pending = Some(tokio::spawn(tokio::time::sleep(wait)));
            if call_now {
                f();
            }
        } else {
            self.pending = Some(tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                f();
            }));
        }
    }

    /// Whether a burst is still open
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Drop the pending trailing call, if any
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Lets at most one call through per `limit`
#[derive(Debug, Clone)]
pub struct Throttle {
    limit: Duration,
    last: Option<Instant>,
}

impl Throttle {
    /// Create a throttle
    #[must_use]
    pub const fn new(limit: Duration) -> Self {
        Self { limit, last: None }
    }

    /// Run `f` unless a call went through less than `limit` ago
    pub fn call<R>(&mut self, f: impl FnOnce() -> R) -> Option<R> {
        let now = Instant::now();
        if self.last.is_some_and(|last| now.duration_since(last) < self.limit) {
            return None;
        }
        self.last = Some(now);
        Some(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(500.0), "500米");
        assert_eq!(format_distance(0.0), "0米");
        assert_eq!(format_distance(0.5), "1米");
        assert_eq!(format_distance(2.5), "3米");
        assert_eq!(format_distance(500.5), "501米");
        assert_eq!(format_distance(1500.0), "1.50公里");
        assert_eq!(format_distance(12_340.0), "12.34公里");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(125), "2:05");
        assert_eq!(format_duration(3665), "1:01:05");
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(3600), "1:00:00");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(5.0), "18.0km/h");
        assert_eq!(format_speed(0.0), "0.0km/h");
    }

    #[test]
    fn test_format_time() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap();
        assert_eq!(format_time(&time), "2024/03/07 09:05:02");
        assert_eq!(format_number(7), "07");
        assert_eq!(format_number(12), "12");
    }

    #[test]
    fn test_device_id_validation() {
        assert!(is_valid_device_id("bike_light_ab12cd"));
        assert!(is_valid_device_id("bike_light_ABCDEF123456"));
        assert!(!is_valid_device_id("light_ab12"));
        assert!(!is_valid_device_id("bike_light_ab12"));
        assert!(!is_valid_device_id("bike_light_ABCDEF1234567"));
        assert!(!is_valid_device_id("bike_light_ab-12cd"));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("rider@example.com"));
        assert!(!is_valid_email("rider@example"));
        assert!(!is_valid_email("rider example@x.com"));
    }

    #[test]
    fn test_distance_coincident_points() {
        for (lat, lon) in [(0.0, 0.0), (31.2304, 121.4737), (-33.86, 151.2), (89.9, -179.9)] {
            assert!(calculate_distance(lat, lon, lat, lon).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_distance_known_value() {
        // One degree of latitude is roughly 111.2 km
        let d = calculate_distance(30.0, 120.0, 31.0, 120.0);
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_generated_ids() {
        let id = generate_id();
        assert!(id.starts_with("id_"));
        assert_eq!(id.matches('_').count(), 2);
        assert_ne!(generate_id(), generate_id());

        let device_id = generate_device_id();
        assert!(is_valid_device_id(&device_id), "{device_id}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_trailing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        for _ in 0..5 {
            let hits = hits.clone();
            debouncer.call(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_leading() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::leading(Duration::from_millis(300));

        for _ in 0..3 {
            let hits = hits.clone();
            debouncer.call(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let again = hits.clone();
        debouncer.call(move || {
            again.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle() {
        let mut throttle = Throttle::new(Duration::from_secs(1));

        assert_eq!(throttle.call(|| 1), Some(1));
        assert_eq!(throttle.call(|| 2), None);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(throttle.call(|| 3), Some(3));
    }
}
