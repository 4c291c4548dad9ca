//! Integration tests for Sumi-Harvest
//!
//! The publisher is exercised over real HTTP on a loopback port; the worker
//! runs against wiremock or a live publisher with the scripted browser the
//! unit tests use.

#[path = "../../src/browser/fake.rs"]
mod fake;
mod fakes;
mod publisher_tests;
mod worker_tests;
