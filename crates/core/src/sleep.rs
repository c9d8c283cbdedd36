use rand::Rng;
use std::thread;
use std::time::Duration;

/// Sleep for `ms` milliseconds with +/-30% random jitter.
pub fn sleep_jitter(ms: u64) {
    let secs = ms as f64 / 1000.0;
    let jitter = secs * 0.3;
    let actual = if jitter > 0.0 {
        secs + rand::thread_rng().gen_range(-jitter..jitter)
    } else {
        secs
    };
    thread::sleep(Duration::from_secs_f64(actual.max(0.0)));
}

/// Sleep for exact milliseconds (no jitter).
pub fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}
