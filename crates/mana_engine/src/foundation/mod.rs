//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - The worker pool used by asset loading
//! - Logging utilities

pub mod math;
pub mod thread_pool;
pub mod logging;
