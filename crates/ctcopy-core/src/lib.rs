//! # ctcopy-core
//!
//! The extra-mount subsystem of ctcopy.
//!
//! - **Path**: lexical normalization of user supplied paths.
//! - **Mount**: parsing of `-m` directives into a [`MountTable`](mount::MountTable),
//!   scratch directory allocation for aufs and overlay mounts, and
//!   rendering of `lxc.mount.entry` values.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod mount;
pub mod path;
