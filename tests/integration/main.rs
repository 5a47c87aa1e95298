//! Integration tests for the mirror engine
//!
//! These tests use wiremock to serve a small site and drive the real
//! HTTP fetcher, filesystem store and engine end-to-end.

mod common;
mod mirror_tests;
mod report_tests;
