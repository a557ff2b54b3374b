//! Integration tests for the commitstore workspace.
//!
//! This crate exists to host scenario tests that exercise the core library
//! together with the in-memory storage adapter; see the `tests/` directory.

#![forbid(unsafe_code)]
