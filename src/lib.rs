// Copyright 2026 Pricelens Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pricelens library — cross-identity price-personalization auditor.
//!
//! This library crate exposes the core modules for integration testing.

pub mod analyze;
pub mod browser;
pub mod cli;
pub mod collect;
pub mod config;
pub mod extract;
pub mod normalize;
pub mod round;
pub mod schedule;
pub mod store;
