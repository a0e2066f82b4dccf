//! Integration test harness entry point (see `Cargo.toml`'s `[[test]]`
//! pointing at this file), mirroring the corpus's one-binary-many-modules
//! layout for end-to-end and property tests.

mod book_properties;
mod coordinator_tests;
mod engine_scenarios;
