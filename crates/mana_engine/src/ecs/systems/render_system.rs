//! # Render System
//!
//! Turns the enabled entities of a [`World`] into a [`RenderScene`] and
//! renders it with a [`Renderer3D`].
//!
//! ## Frame
//!
//! 1. Import the bundles of every enabled mesh and skybox entity.
//! 2. Resolve materials, textures and images, uploading whatever the GPU
//!    caches miss. Entities whose assets fail to load are skipped with a
//!    warning.
//! 3. Count the entities referencing each bundle. Bundles no entity
//!    references any more are cleared from the importer and evicted from the
//!    caches.
//! 4. Build the scene (first enabled camera, enabled lights, deferred and
//!    forward commands) and render it.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::assets::{AssetImporter, AssetPath};
use crate::core::config::RendererConfig;
use crate::ecs::components::{
    world_transform, CameraComponent, LightComponent, MeshRenderComponent, Outline, SkyboxComponent,
};
use crate::ecs::World;
use crate::foundation::math::{Transform, Vec2i};
use crate::render::api::{
    ColorFormat, MeshBuffer, RenderAllocator, RenderDevice, RenderTarget, ShaderProgram, ShaderSource,
    TextureAttributes, TextureBuffer, TextureType,
};
use crate::render::deferred::render_scene::{DeferredCommand, ForwardCommand, SceneMaterial};
use crate::render::deferred::{RenderScene, Renderer3D};
use crate::render::primitives::Material;
use crate::render::{BackendResult, RenderError};

/// Vertex stage of every forward program; the component names the fragment stage
const FORWARD_VERTEX_STAGE: &str = "mesh";

struct CachedTexture {
    image_bundle: String,
    texture: Box<dyn TextureBuffer>,
}

/// GPU resources keyed by the assets they were created from
#[derive(Default)]
struct GpuCache {
    meshes: HashMap<AssetPath, Box<dyn MeshBuffer>>,
    textures: HashMap<AssetPath, CachedTexture>,
    skyboxes: HashMap<SkyboxComponent, Box<dyn TextureBuffer>>,
    forward_shaders: HashMap<(String, AssetPath), RefCell<Box<dyn ShaderProgram>>>,
}

impl GpuCache {
    fn upload_mesh(
        &mut self,
        importer: &AssetImporter,
        allocator: &mut dyn RenderAllocator,
        path: &AssetPath,
    ) -> BackendResult<()> {
        if !self.meshes.contains_key(path) {
            let bundle = importer.get_bundle(&path.bundle)?;
            let buffer = allocator.create_mesh_buffer(bundle.get_mesh(&path.asset)?)?;
            trace!("Uploaded mesh {}", path);
            self.meshes.insert(path.clone(), buffer);
        }
        Ok(())
    }

    /// Upload the texture asset at `path`, recording the bundles it uses
    fn upload_texture(
        &mut self,
        importer: &AssetImporter,
        allocator: &mut dyn RenderAllocator,
        path: &AssetPath,
        used: &mut HashSet<String>,
    ) -> BackendResult<()> {
        used.insert(path.bundle.clone());
        if let Some(cached) = self.textures.get(path) {
            used.insert(cached.image_bundle.clone());
            return Ok(());
        }

        let texture = importer.get_bundle(&path.bundle)?.get_texture(&path.asset)?.clone();
        used.insert(texture.image.bundle.clone());
        let images = importer.get_bundle(&texture.image.bundle)?;
        let image = images.get_image(&texture.image.asset)?;

        let attributes = TextureAttributes {
            size: Vec2i::new(image.width() as i32, image.height() as i32),
            format: ColorFormat::Rgba,
            texture_type: TextureType::Texture2D,
            ..texture.attributes
        };
        let mut buffer = allocator.create_texture_buffer(attributes)?;
        buffer.upload_rgba(image)?;
        trace!("Uploaded texture {}", path);
        self.textures.insert(
            path.clone(),
            CachedTexture {
                image_bundle: texture.image.bundle,
                texture: buffer,
            },
        );
        Ok(())
    }

    fn upload_skybox(
        &mut self,
        importer: &AssetImporter,
        allocator: &mut dyn RenderAllocator,
        skybox: &SkyboxComponent,
    ) -> BackendResult<()> {
        if self.skyboxes.contains_key(skybox) {
            return Ok(());
        }
        let mut faces = Vec::with_capacity(6);
        for (face, path) in skybox.faces() {
            let bundle = importer.get_bundle(&path.bundle)?;
            faces.push((face, bundle.get_image(&path.asset)?.clone()));
        }
        let size = faces
            .first()
            .map(|(_, image)| Vec2i::new(image.width() as i32, image.height() as i32))
            .unwrap_or_else(|| Vec2i::new(1, 1));
        let mut cube = allocator.create_texture_buffer(TextureAttributes::cube_map(size, ColorFormat::Rgba))?;
        for (face, image) in &faces {
            cube.upload_cube_face(*face, image)?;
        }
        debug!("Uploaded skybox cube map {}x{}", size.x, size.y);
        self.skyboxes.insert(skybox.clone(), cube);
        Ok(())
    }

    fn prepare_forward_shader(
        &mut self,
        allocator: &mut dyn RenderAllocator,
        name: &str,
        material_path: &AssetPath,
        material: &Material,
    ) -> BackendResult<()> {
        let shader = match self.forward_shaders.entry((name.to_string(), material_path.clone())) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let program = allocator.create_shader_program(
                    &ShaderSource::vertex(FORWARD_VERTEX_STAGE),
                    &ShaderSource::fragment(name),
                    None,
                )?;
                debug!("Linked forward shader {} for {}", name, material_path);
                entry.insert(RefCell::new(program))
            }
        };
        let program = shader.get_mut();
        program.set_vec4("diffuseColor", material.diffuse.to_vec4());
        program.set_vec4("specularColor", material.specular.to_vec4());
        program.set_float("shininessValue", material.shininess);
        if material.diffuse_texture.is_some() {
            program.set_texture("diffuse", 0);
        }
        Ok(())
    }

    fn texture(&self, path: Option<&AssetPath>) -> Option<&dyn TextureBuffer> {
        path.and_then(|path| self.textures.get(path))
            .map(|cached| cached.texture.as_ref())
    }

    fn scene_material(&self, material: &Material) -> SceneMaterial<'_> {
        SceneMaterial {
            diffuse: material.diffuse,
            ambient: material.ambient,
            specular: material.specular,
            emissive: material.emissive,
            shininess: material.shininess,
            diffuse_texture: self.texture(material.diffuse_texture.as_ref()),
            ambient_texture: self.texture(material.ambient_texture.as_ref()),
            specular_texture: self.texture(material.specular_texture.as_ref()),
            shininess_texture: self.texture(material.shininess_texture.as_ref()),
            emissive_texture: self.texture(material.emissive_texture.as_ref()),
            normal_texture: self.texture(material.normal_texture.as_ref()),
        }
    }

    fn evict_bundle(&mut self, bundle: &str) {
        self.meshes.retain(|path, _| path.bundle != bundle);
        self.textures
            .retain(|path, cached| path.bundle != bundle && cached.image_bundle != bundle);
        self.skyboxes.retain(|skybox, _| skybox.bundles().all(|used| used != bundle));
        self.forward_shaders.retain(|(_, material), _| material.bundle != bundle);
    }
}

/// Mesh entity whose assets are resolved and uploaded
struct Drawable {
    transform: Transform,
    mesh: AssetPath,
    material_path: AssetPath,
    material: Material,
    forward_shader: Option<String>,
    outline: Option<Outline>,
}

/// Renders a [`World`] through a [`Renderer3D`]
pub struct RenderSystem {
    importer: Arc<AssetImporter>,
    renderer: Renderer3D,
    bundle_refs: HashMap<String, usize>,
    cache: GpuCache,
}

impl RenderSystem {
    /// System with the default pass list
    pub fn new(
        device: &mut dyn RenderDevice,
        importer: Arc<AssetImporter>,
        config: &RendererConfig,
    ) -> BackendResult<Self> {
        Ok(Self::with_renderer(importer, Renderer3D::with_default_passes(device, config)?))
    }

    /// System driving an existing renderer
    pub fn with_renderer(importer: Arc<AssetImporter>, renderer: Renderer3D) -> Self {
        Self {
            importer,
            renderer,
            bundle_refs: HashMap::new(),
            cache: GpuCache::default(),
        }
    }

    /// The importer bundles are loaded through
    pub fn importer(&self) -> &Arc<AssetImporter> {
        &self.importer
    }

    /// The renderer
    pub const fn renderer(&self) -> &Renderer3D {
        &self.renderer
    }

    /// The renderer, for toggling passes
    pub fn renderer_mut(&mut self) -> &mut Renderer3D {
        &mut self.renderer
    }

    /// Number of enabled entities referencing `bundle` as of the last update
    pub fn bundle_ref_count(&self, bundle: &str) -> usize {
        self.bundle_refs.get(bundle).copied().unwrap_or(0)
    }

    /// Render one frame of `world` into `target`
    ///
    /// # Errors
    ///
    /// Backend errors. Asset errors only skip the affected entity.
    pub fn update(
        &mut self,
        world: &World,
        device: &mut dyn RenderDevice,
        target: &mut dyn RenderTarget,
    ) -> BackendResult<()> {
        for (_, component) in world.query::<MeshRenderComponent>() {
            for bundle in component.bundles() {
                self.importer.import(bundle);
            }
        }
        let skybox = world.query::<SkyboxComponent>().next().map(|(_, skybox)| skybox.clone());
        if let Some(skybox) = &skybox {
            for bundle in skybox.bundles() {
                self.importer.import(bundle);
            }
        }

        let mut refs: HashMap<String, usize> = HashMap::new();
        let mut count = |used: HashSet<String>| {
            for bundle in used {
                *refs.entry(bundle).or_insert(0) += 1;
            }
        };

        let allocator = device.allocator();
        let mut drawables = Vec::new();
        for (entity, component) in world.query::<MeshRenderComponent>() {
            let mut used: HashSet<String> = component.bundles().iter().map(|bundle| (*bundle).to_string()).collect();
            match self.prepare(allocator, component, &mut used) {
                Ok(material) => drawables.push(Drawable {
                    transform: world_transform(world, entity),
                    mesh: component.mesh.clone(),
                    material_path: component.material.clone(),
                    material,
                    forward_shader: component.forward_shader.clone(),
                    outline: component.outline,
                }),
                Err(RenderError::Asset(error)) => warn!("Skipping entity {:?}: {}", entity, error),
                Err(error) => return Err(error),
            }
            count(used);
        }

        let mut skybox_ready = false;
        if let Some(skybox) = &skybox {
            match self.cache.upload_skybox(&self.importer, allocator, skybox) {
                Ok(()) => skybox_ready = true,
                Err(RenderError::Asset(error)) => warn!("Skybox unavailable: {}", error),
                Err(error) => return Err(error),
            }
            count(skybox.bundles().map(str::to_string).collect());
        }

        self.release_unused(refs);

        let size = target.size();
        let camera = world
            .query::<CameraComponent>()
            .next()
            .map(|(entity, camera)| camera.camera(&world_transform(world, entity)))
            .unwrap_or_default()
            .with_aspect(size.x as f32 / size.y.max(1) as f32);

        let mut scene = RenderScene::new(camera);
        if skybox_ready {
            scene.skybox = skybox
                .as_ref()
                .and_then(|skybox| self.cache.skyboxes.get(skybox))
                .map(|cube| cube.as_ref());
        }
        scene.lights = world
            .query::<LightComponent>()
            .map(|(entity, light)| light.world_light(&world_transform(world, entity)))
            .collect();
        build_commands(&self.cache, &drawables, &mut scene);

        trace!(
            "Rendering {} deferred, {} forward, {} lights",
            scene.deferred.len(),
            scene.forward.len(),
            scene.lights.len()
        );
        self.renderer.render(device, target, &scene)
    }

    /// Upload everything `component` needs and return its material
    fn prepare(
        &mut self,
        allocator: &mut dyn RenderAllocator,
        component: &MeshRenderComponent,
        used: &mut HashSet<String>,
    ) -> BackendResult<Material> {
        let importer = Arc::clone(&self.importer);
        self.cache.upload_mesh(&importer, allocator, &component.mesh)?;

        let material = importer
            .get_bundle(&component.material.bundle)?
            .get_material(&component.material.asset)?
            .clone();
        for path in material.texture_paths() {
            self.cache.upload_texture(&importer, allocator, path, used)?;
        }
        if let Some(shader) = &component.forward_shader {
            self.cache
                .prepare_forward_shader(allocator, shader, &component.material, &material)?;
        }
        Ok(material)
    }

    /// Replace the reference counts, releasing bundles that dropped to zero
    fn release_unused(&mut self, refs: HashMap<String, usize>) {
        for bundle in self.bundle_refs.keys().filter(|bundle| !refs.contains_key(*bundle)) {
            debug!("Releasing bundle {}", bundle);
            self.importer.clear_bundle(bundle);
            self.cache.evict_bundle(bundle);
        }
        self.bundle_refs = refs;
    }
}

fn build_commands<'a>(cache: &'a GpuCache, drawables: &[Drawable], scene: &mut RenderScene<'a>) {
    for drawable in drawables {
        let Some(mesh) = cache.meshes.get(&drawable.mesh) else {
            continue;
        };
        match &drawable.forward_shader {
            None => {
                let mut command =
                    DeferredCommand::new(drawable.transform, cache.scene_material(&drawable.material), mesh.as_ref());
                if let Some(outline) = drawable.outline {
                    command = command.with_outline(outline.color, outline.scale);
                }
                scene.deferred.push(command);
            }
            Some(name) => {
                let key = (name.clone(), drawable.material_path.clone());
                let Some(shader) = cache.forward_shaders.get(&key) else {
                    continue;
                };
                let textures = cache
                    .texture(drawable.material.diffuse_texture.as_ref())
                    .into_iter()
                    .collect();
                scene
                    .forward
                    .push(ForwardCommand::new(drawable.transform, shader, vec![mesh.as_ref()]).with_textures(textures));
            }
        }
    }
}

impl std::fmt::Debug for RenderSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSystem")
            .field("bundle_refs", &self.bundle_refs)
            .field("meshes", &self.cache.meshes.len())
            .field("textures", &self.cache.textures.len())
            .finish_non_exhaustive()
    }
}
