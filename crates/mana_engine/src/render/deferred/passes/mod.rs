//! Built-in render passes
//!
//! | Pass | Reads | Writes |
//! |------|-------|--------|
//! | [`GeometryPass`] | | material slots, `id`, `skybox`, `depth` |
//! | [`PhongShadePass`] | material slots, `depth` | `phong_*` |
//! | [`LightingPass`] | material slots, `depth`, `id` | `lighting` |
//! | [`ForwardPass`] | | `forward`, `forward_depth` |
//! | [`CompositePass`] | `depth`, `phong_*`, `forward*`, `skybox` | `composite`, `composite_depth` |
//! | [`DebugPass`] | `depth` | `debug` |
//! | `ImGuiPass` | | `imgui` |

pub mod composite;
pub mod debug;
pub mod debug_renderer;
pub mod forward;
pub mod geometry;
#[cfg(feature = "imgui")]
pub mod imgui_pass;
pub mod lighting;
pub mod phong_shade;

pub use composite::CompositePass;
pub use debug::DebugPass;
pub use debug_renderer::{DebugRenderer, LineBatch};
pub use forward::ForwardPass;
pub use geometry::GeometryPass;
#[cfg(feature = "imgui")]
pub use imgui_pass::{ImGuiPass, UiContext, UiHandle, Widget};
pub use lighting::LightingPass;
pub use phong_shade::PhongShadePass;
