//! Shared test fixtures (used by unit and proptest suites).

#![allow(dead_code)]

pub mod fixtures;
