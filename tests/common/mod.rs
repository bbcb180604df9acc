//! Shared helpers for integration tests.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use belt::test_utils::*;
pub use belt::{assert_with_log, test_complete, test_phase, test_section};

use belt::ErrorRef;
use std::sync::Arc;

/// An `io::Error` as an [`ErrorRef`].
pub fn io_error(msg: &str) -> ErrorRef {
    Arc::new(std::io::Error::other(msg.to_string()))
}
