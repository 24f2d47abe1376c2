//! Common test utilities
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

pub mod test_fixtures;
pub mod things5_mock;

pub use test_fixtures::*;
pub use things5_mock::MockThings5Server;
