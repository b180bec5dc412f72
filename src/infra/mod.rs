//! Platform plumbing shared across the crate.

pub mod permissions;
