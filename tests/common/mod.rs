#![allow(dead_code, unused_imports)]

pub use hotswap_test_utils::builders;
pub use hotswap_test_utils::fakes;
pub use hotswap_test_utils::{init_tracing, ms, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
