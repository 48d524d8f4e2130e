//! Container cloning for ctcopy.
//!
//! Provides the container configuration model, the [`ContainerBackend`]
//! capability surface with its LXC implementation, the ephemeral clone
//! workflow, and the [`Engine`] that dispatches one invocation.
//!
//! [`ContainerBackend`]: backend::ContainerBackend
//! [`Engine`]: engine::Engine

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod config;
pub mod engine;
pub mod ephemeral;
pub mod exec;
