use chrono::{DateTime, Utc};
use rand::Rng;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Applies uniform jitter of ±20% to a delay, per the backoff design
/// (prevents thundering-herd on retried waves).
pub fn jitter(delay_ms: u64) -> u64 {
    let mut rng = rand::thread_rng();
    let factor = rng.gen_range(0.8..=1.2);
    ((delay_ms as f64) * factor).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_twenty_percent() {
        for _ in 0..1000 {
            let d = jitter(1000);
            assert!(d >= 800 && d <= 1200, "jitter {} out of bounds", d);
        }
    }
}
