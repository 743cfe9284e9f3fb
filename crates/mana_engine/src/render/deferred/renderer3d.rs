//! # Renderer3D
//!
//! Frame driver of the deferred pipeline.
//!
//! ## Frame
//!
//! ```text
//! set_size(screen) ──► pass.render() for every pass ──► present_layers ──► blit depth
//! ```
//!
//! Passes run in construction order. At construction every pass registers
//! its slots, and the declared reads are checked against the writes of the
//! passes before it.

use std::collections::HashSet;

use log::{debug, info, trace};

use super::compositor::{Compositor, Layer};
use super::geometry_buffer::{names, GeometryBuffer};
use super::passes::{CompositePass, DebugPass, ForwardPass, GeometryPass, PhongShadePass};
use super::render_pass::RenderPass;
use super::render_scene::RenderScene;
use crate::core::config::RendererConfig;
use crate::foundation::math::Vec2i;
use crate::render::api::{BlitRect, DepthTestMode, RenderDevice, RenderTarget};
use crate::render::{BackendResult, RenderError};

/// Passes, geometry buffer and compositor of one view
pub struct Renderer3D {
    gbuffer: GeometryBuffer,
    passes: Vec<Box<dyn RenderPass>>,
    compositor: Compositor,
}

impl Renderer3D {
    /// Build the pipeline from `passes`, run in the given order
    ///
    /// # Errors
    ///
    /// `PassDependency` when a pass reads a slot no earlier pass writes
    /// (unless disabled in `config`), plus any slot registration or
    /// allocation error.
    pub fn new(
        device: &mut dyn RenderDevice,
        mut passes: Vec<Box<dyn RenderPass>>,
        config: &RendererConfig,
    ) -> BackendResult<Self> {
        let (width, height) = config.initial_size;
        let mut gbuffer = GeometryBuffer::new(device.allocator(), Vec2i::new(width, height))?;
        for pass in &mut passes {
            pass.prepare_buffer(&mut gbuffer)?;
        }
        if config.check_pass_dependencies {
            check_pass_dependencies(&passes)?;
        }
        gbuffer.allocate(device.allocator())?;

        let mut compositor = Compositor::new(device.allocator(), default_layers(&gbuffer))?;
        compositor.set_clear_color(config.clear_color);

        info!(
            "Deferred pipeline ready: {}",
            passes.iter().map(|pass| pass.name()).collect::<Vec<_>>().join(" -> ")
        );
        Ok(Self {
            gbuffer,
            passes,
            compositor,
        })
    }

    /// Pipeline with geometry, Phong shading, forward, composite and debug passes
    pub fn with_default_passes(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let passes = default_passes(device, config)?;
        Self::new(device, passes, config)
    }

    /// Render `scene` into `target`
    ///
    /// `target` needs a depth attachment: the composited depth, or the
    /// geometry depth without a composite pass, is copied into it after
    /// compositing.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        target: &mut dyn RenderTarget,
        scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        self.gbuffer.set_size(device.allocator(), target.size())?;

        for pass in &mut self.passes {
            trace!("Running pass {}", pass.name());
            pass.render(device, &mut self.gbuffer, scene)?;
        }

        self.compositor.present_layers(device, &*target, &self.gbuffer)?;

        let depth = [names::COMPOSITE_DEPTH, names::DEPTH]
            .into_iter()
            .find(|name| self.gbuffer.has_buffer(name));
        if let Some(depth) = depth {
            self.gbuffer.attach_depth_stencil(depth)?;
            let source = BlitRect::full(self.gbuffer.size());
            let destination = BlitRect::full(target.size());
            let result = target.blit_depth(self.gbuffer.render_target(), source, destination);
            self.gbuffer.detach_depth_stencil();
            result?;
        }
        Ok(())
    }

    /// The geometry buffer
    pub const fn geometry_buffer(&self) -> &GeometryBuffer {
        &self.gbuffer
    }

    /// The compositor
    pub const fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// The compositor, for replacing layers or the clear color
    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Passes in execution order
    pub fn passes(&self) -> impl Iterator<Item = &dyn RenderPass> {
        self.passes.iter().map(AsRef::as_ref)
    }

    /// First pass of type `T`
    pub fn pass<T: RenderPass>(&self) -> Option<&T> {
        self.passes.iter().find_map(|pass| pass.as_any().downcast_ref::<T>())
    }

    /// First pass of type `T`
    pub fn pass_mut<T: RenderPass>(&mut self) -> Option<&mut T> {
        self.passes
            .iter_mut()
            .find_map(|pass| pass.as_any_mut().downcast_mut::<T>())
    }
}

/// Geometry, Phong shading, forward, composite and debug passes in that order
pub fn default_passes(
    device: &mut dyn RenderDevice,
    config: &RendererConfig,
) -> BackendResult<Vec<Box<dyn RenderPass>>> {
    Ok(vec![
        Box::new(GeometryPass::new(device, config)?),
        Box::new(PhongShadePass::new(device, config)?),
        Box::new(ForwardPass::new(device, config)?),
        Box::new(CompositePass::new(device)?),
        Box::new(DebugPass::new(device, config)?),
    ])
}

/// Reject pass lists where a pass reads a slot no earlier pass writes
pub fn check_pass_dependencies(passes: &[Box<dyn RenderPass>]) -> BackendResult<()> {
    let mut written: HashSet<&str> = HashSet::new();
    for pass in passes {
        if let Some(missing) = pass.reads().iter().find(|name| !written.contains(*name)) {
            return Err(RenderError::PassDependency {
                pass: pass.name().to_string(),
                buffer: (*missing).to_string(),
            });
        }
        written.extend(pass.writes().iter().copied());
    }
    debug!("Pass dependencies satisfied for {} passes", passes.len());
    Ok(())
}

/// Layers for whichever output slots the passes registered
///
/// The scene layer (`composite`, or `lighting` for pipelines without a
/// composite pass) comes first, then the `debug` and `imgui` overlays, which
/// ignore the scene depth.
pub fn default_layers(gbuffer: &GeometryBuffer) -> Vec<Layer> {
    let mut layers = Vec::new();
    if gbuffer.has_buffer(names::COMPOSITE) {
        layers.push(
            Layer::new("Scene", &[names::COMPOSITE])
                .with_depth(names::COMPOSITE_DEPTH)
                .with_depth_test(DepthTestMode::LessOrEqual),
        );
    } else if gbuffer.has_buffer(names::LIGHTING) {
        layers.push(
            Layer::new("Lighting", &[names::LIGHTING])
                .with_depth(names::DEPTH)
                .with_depth_test(DepthTestMode::LessOrEqual),
        );
    }
    if gbuffer.has_buffer(names::DEBUG) {
        layers.push(Layer::new("Debug", &[names::DEBUG]).with_depth_test(DepthTestMode::Always));
    }
    if gbuffer.has_buffer(names::IMGUI) {
        layers.push(Layer::new("ImGui", &[names::IMGUI]).with_depth_test(DepthTestMode::Always));
    }
    layers
}
