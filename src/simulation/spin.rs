//! CPU busy-wait used to simulate inference cost.

use std::time::{Duration, Instant};

/// Occupy the calling thread until `duration` of wall-clock time has passed.
///
/// Never sleeps or yields to the async scheduler: concurrent tasks sharing the
/// same worker are starved for the whole duration.
pub fn busy_wait(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

/// Millisecond variant; zero and negative values are a no-op.
pub fn busy_wait_ms(ms: i64) {
    if ms > 0 {
        busy_wait(Duration::from_millis(ms as u64));
    }
}
