//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};
use tracevis_rs::viewer::{Frame, Viewer};

/// Upper bound for waiting on background fetches
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Draw frames until the main view has every block it needs
pub fn settle(viewer: &mut Viewer) -> Frame {
    let deadline = Instant::now() + test_timeout();
    loop {
        let frame = viewer.frame();
        if frame.missing == 0 && frame.pending == 0 {
            return frame;
        }
        assert!(Instant::now() < deadline, "viewer did not settle in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}
