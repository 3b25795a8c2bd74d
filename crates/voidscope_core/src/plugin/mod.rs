//! Collection plugins layered over repository primitives.
//!
//! Plugins hook in explicitly: they augment a `Schema` before the
//! repository is built and wrap the repository afterwards.

pub mod void;
