//! # Core Engine Module
//!
//! Shared configuration for the engine subsystems.

pub mod config;

pub use config::{
    ApplicationConfig,
    EngineConfig,
    RendererConfig,
    AssetConfig,
    Config,
    ConfigError,
};
