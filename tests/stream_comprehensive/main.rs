//! Object Stream Comprehensive Test Suite
//!
//! End-to-end tests that write object graphs with `ObjectWriter` and read
//! them back with `ObjectReader`, usually through separate registries so
//! the two sides can disagree about class versions.
//!
//! ## Test Organization
//!
//! - `graph_tests.rs` - Aliasing, cycles, arrays, class objects, handle scope
//! - `evolution_tests.rs` - Version ids, added/removed fields and classes,
//!   capability and name mismatches, constructor selection
//! - `string_tests.rs` - Short/long string records, modified UTF-8, limits
//! - `enum_tests.rs` - Constant identity, unknown constants, enum arrays
//! - `primitive_tests.rs` - Block data interleaved with object records
//! - `hook_tests.rs` - Custom read/write routines, emulated fields,
//!   substitution, externalizable payloads, validation callbacks
//! - `failure_tests.rs` - Write-failure records, limits, proxies,
//!   truncated and corrupt streams, configuration files
//! - `property_tests.rs` - proptest round trips
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test stream_comprehensive
//!
//! # One area
//! cargo test --test stream_comprehensive evolution
//! cargo test --test stream_comprehensive hook
//!
//! # By test id prefix
//! cargo test --test stream_comprehensive gr_   # Graph identity
//! cargo test --test stream_comprehensive ev_   # Class evolution
//! cargo test --test stream_comprehensive hk_   # Hooks
//! ```
//!
//! ## Test ID Conventions
//!
//! - GR-xxx: Graph identity
//! - EV-xxx: Class evolution
//! - STR-xxx: Strings
//! - EN-xxx: Enums
//! - PRM-xxx: Primitive data
//! - HK-xxx: Hooks
//! - FL-xxx: Failures and limits
//! - PROP-xxx: Property tests

#[path = "../common/mod.rs"]
mod common;

mod enum_tests;
mod evolution_tests;
mod failure_tests;
mod property_tests;
mod string_tests;
