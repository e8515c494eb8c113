//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the cloud-save core:
//! - Logging and tracing infrastructure
//! - Configuration management and typed plugin settings
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync core and the
//! service façade depend on. It establishes the logging conventions and the
//! event broadcasting used to report queue and sync status to the UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
