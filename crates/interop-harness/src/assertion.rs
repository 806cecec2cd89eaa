//! Output assertions

use crate::error::{InteropError, InteropResult};

/// Check that `captured` contains `expected` verbatim (case-sensitive, no
/// normalization). The failure carries the full captured text.
pub fn assert_contains(captured: &str, expected: &str) -> InteropResult<()> {
    if captured.contains(expected) {
        Ok(())
    } else {
        Err(InteropError::AssertionFailed {
            expected: expected.to_string(),
            output: captured.to_string(),
        })
    }
}
