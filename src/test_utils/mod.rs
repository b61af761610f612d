//! Test doubles and fixtures shared by unit and integration tests.

pub mod fixtures;
pub mod mocks;

pub use mocks::{MockConfig, MockFeeScheduleProvider, MockNodeClient};
