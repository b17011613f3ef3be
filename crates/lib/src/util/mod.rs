//! Shared utilities.
//!
//! Variable expansion, filesystem helpers and test helpers.

pub mod expand;
pub mod fs;

#[cfg(test)]
pub mod testutil;
