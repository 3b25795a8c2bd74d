//! Query construction primitives.
//!
//! # Responsibility
//! - Model read filters, options and update documents as typed values.
//! - Stay free of I/O; repositories compile these into SQL.

pub mod builder;
pub mod filter;
