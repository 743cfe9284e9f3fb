//! Backend implementations for the render module
//!
//! Currently only the software rasterizer is provided. It implements the
//! full capability interface on the CPU and serves as the reference backend.

/// CPU rasterizer backend
pub mod software;
