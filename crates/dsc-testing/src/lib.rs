//! # dsc-testing
//!
//! Test infrastructure for the dsc connection layer.
//!
//! Provides an in-memory [`MockDriver`] implementing the native driver
//! contract, with call accounting and fault injection, so connection and
//! pool behavior can be exercised without a database server.
//!
//! Behavior tests for `dsc-pool` live in this crate's `tests/` directory.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_driver;

pub use mock_driver::{MockDatabase, MockDriver, MockDriverBuilder, MockState, MockTransaction};
