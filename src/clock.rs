//! Monotonic timestamp source shared by all collectors.
//!
//! CLOCK_MONOTONIC counts from boot and is common to every process on the
//! host, so timestamps taken by independent collector processes can be
//! compared directly at merge time.

/// Current CLOCK_MONOTONIC reading in nanoseconds.
pub fn monotonic_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // clock_gettime cannot fail for CLOCK_MONOTONIC on Linux
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_ns_is_nondecreasing() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
        assert!(a > 0);
    }
}
