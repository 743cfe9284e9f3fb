//! Backend capability interface
//!
//! The traits a graphics backend implements. Passes and the compositor only
//! talk to these traits; `render::backends` holds the implementations.

pub mod device;
pub mod mesh_buffer;
pub mod render_command;
pub mod render_target;
pub mod shader_program;
pub mod texture_buffer;
pub mod uniforms;

pub use device::{RenderAllocator, RenderDevice, Renderer};
pub use mesh_buffer::MeshBuffer;
pub use render_command::{
    BlendMode, ClearFlags, DepthTestMode, FaceCullingMode, RenderCommand, RenderOptions,
    RenderProperties,
};
pub use render_target::{validate_blit, BlitRect, RenderTarget};
pub use shader_program::{
    ShaderProgram, ShaderSource, ShaderStage, UniformLocation, UniformValue, MAX_LIGHTS,
};
pub use texture_buffer::{
    upload_cube_color, ColorFormat, CubeMapFace, MipMapFiltering, TextureAttributes,
    TextureBuffer, TextureFiltering, TextureType, TextureWrapping,
};
