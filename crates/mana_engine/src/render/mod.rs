//! # Rendering System
//!
//! Deferred plus forward hybrid renderer built on a small backend capability
//! interface.
//!
//! ## Architecture
//!
//! - **api**: the traits a backend implements (`RenderDevice`, `Renderer`,
//!   `RenderAllocator`, render targets, textures, meshes, shader programs)
//! - **backends**: implementations of the api; `software` rasterizes on the CPU
//! - **primitives**: backend-agnostic data (meshes, images, colors, cameras,
//!   lights, materials)
//! - **deferred**: the geometry buffer, render passes, compositor and the
//!   `Renderer3D` that drives them each frame

pub mod api;
pub mod backends;
pub mod deferred;
pub mod primitives;

use thiserror::Error;

use crate::assets::AssetError;

pub use api::{
    RenderAllocator, RenderCommand, RenderDevice, RenderOptions, RenderProperties, RenderTarget,
    Renderer, ShaderProgram, TextureBuffer, MeshBuffer,
};
pub use deferred::{GeometryBuffer, RenderPass, RenderScene, Renderer3D};
pub use primitives::{Camera, ColorRGBA, Light, Material, Mesh, Vertex};

/// High-level rendering error types
///
/// Precondition violations of the pipeline and backend failures both surface
/// here. Backends never panic on bad input; they return one of these.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A geometry buffer name was never registered with `add_buffer`
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// A buffer name was registered twice with different formats
    #[error("Buffer {name} already exists with a different format")]
    BufferFormatConflict {
        /// Buffer name
        name: String,
    },

    /// A registered buffer has no backing texture yet
    #[error("Buffer {0} is not allocated")]
    BufferNotAllocated(String),

    /// Mesh buffers only accept triangle meshes
    #[error("Unsupported primitive: {0}")]
    UnsupportedPrimitive(String),

    /// Blit offsets or rects are negative or out of bounds
    #[error("Invalid blit: {0}")]
    InvalidBlit(String),

    /// A texture format or type does not fit the operation
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A render target attachment is missing or mismatched
    #[error("Incomplete render target: {0}")]
    IncompleteTarget(String),

    /// Shader stages could not be linked into a program
    #[error("Shader link failed: {0}")]
    ShaderLink(String),

    /// A resource created by another backend was handed to this one
    #[error("Resource belongs to another backend: {0}")]
    ForeignResource(String),

    /// A pass reads a buffer no earlier pass writes
    #[error("Pass {pass} reads {buffer} which no earlier pass writes")]
    PassDependency {
        /// Reading pass
        pass: String,
        /// Buffer read
        buffer: String,
    },

    /// A compositor layer lists more color textures than a draw can sample
    #[error("Layer {layer} has {count} color textures, at most {max} are supported")]
    TooManyLayerColors {
        /// Layer name
        layer: String,
        /// Number of color textures listed
        count: usize,
        /// Supported maximum
        max: usize,
    },

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// An asset needed for rendering could not be provided
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result type for rendering operations
pub type BackendResult<T> = Result<T, RenderError>;
