//! Workspace placeholder crate.
//!
//! This crate exposes the shared feature flags that map to the individual
//! workspace crates. Host plugins can depend on `cloudsave-workspace` and
//! enable `desktop-shims` without wiring `core-service` and `bridge-desktop`
//! themselves.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
