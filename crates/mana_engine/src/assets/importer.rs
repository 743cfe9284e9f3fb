//! Asynchronous bundle importer
//!
//! Every bundle path maps to at most one load. `import` queues the load on
//! the thread pool and returns immediately; `get_bundle` waits for it. The
//! path map is guarded by one mutex that is never held while waiting; the
//! first waiter to relock collects the result, so a bundle is decoded
//! exactly once however many threads ask for it.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::BufReader;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use super::archive::{Archive, DirectoryArchive};
use super::bundle::AssetBundle;
use super::description::BundleDescription;
use super::{file_stem, image_loader, obj_loader, AssetError, BundleFormat};
use crate::core::config::AssetConfig;
use crate::foundation::thread_pool::{Task, ThreadPool};

type LoadTask = Task<Result<AssetBundle, AssetError>>;

enum Slot {
    Loading(Arc<LoadTask>),
    Ready(Arc<AssetBundle>),
}

/// Loads bundles from an archive on a thread pool
pub struct AssetImporter {
    archive: Arc<dyn Archive>,
    pool: Arc<ThreadPool>,
    bundles: Mutex<HashMap<String, Slot>>,
}

impl AssetImporter {
    /// Importer reading from `archive` on `pool`
    pub fn new(archive: Arc<dyn Archive>, pool: Arc<ThreadPool>) -> Self {
        Self {
            archive,
            pool,
            bundles: Mutex::new(HashMap::new()),
        }
    }

    /// Importer over `config.assets_dir` with the configured worker count
    pub fn from_config(config: &AssetConfig) -> Self {
        let pool = config
            .worker_threads
            .map_or_else(ThreadPool::global, |threads| Arc::new(ThreadPool::new(threads)));
        info!("Importing assets from {}", config.assets_dir);
        Self::new(Arc::new(DirectoryArchive::new(&config.assets_dir)), pool)
    }

    /// The archive bundles are read from
    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// Start loading `path` unless a load is already running or done
    pub fn import(&self, path: &str) {
        let mut bundles = self.bundles.lock();
        if let Entry::Vacant(entry) = bundles.entry(path.to_string()) {
            debug!("Importing bundle {}", path);
            let archive = Arc::clone(&self.archive);
            let owned = path.to_string();
            let task = self.pool.add_task(move || load_bundle(archive.as_ref(), &owned));
            entry.insert(Slot::Loading(task));
        }
    }

    /// Wait for the bundle at `path`, importing it first if needed
    ///
    /// The path map is only locked to look up and to publish the result, so
    /// lookups of other bundles go on while this one loads.
    ///
    /// # Errors
    ///
    /// The load error. A failed load is forgotten so a later import retries.
    pub fn get_bundle(&self, path: &str) -> Result<Arc<AssetBundle>, AssetError> {
        self.import(path);
        let task = match self.bundles.lock().get(path) {
            Some(Slot::Ready(bundle)) => return Ok(Arc::clone(bundle)),
            Some(Slot::Loading(task)) => Arc::clone(task),
            None => return Err(AssetError::LoadFailed(path.to_string())),
        };

        task.wait();

        let mut bundles = self.bundles.lock();
        match bundles.get(path) {
            Some(Slot::Loading(current)) if Arc::ptr_eq(current, &task) => {}
            Some(Slot::Ready(bundle)) => return Ok(Arc::clone(bundle)),
            // Another waiter collected a failed load, or the bundle was cleared
            _ => return Err(AssetError::LoadFailed(path.to_string())),
        }

        match task.take() {
            Some(Ok(bundle)) => {
                let bundle = Arc::new(bundle);
                bundles.insert(path.to_string(), Slot::Ready(Arc::clone(&bundle)));
                Ok(bundle)
            }
            Some(Err(error)) => {
                warn!("Loading bundle {} failed: {}", path, error);
                bundles.remove(path);
                Err(error)
            }
            None => {
                bundles.remove(path);
                Err(AssetError::LoadFailed(format!("{path}: load task panicked")))
            }
        }
    }

    /// Whether the bundle finished loading and has been collected
    pub fn is_loaded(&self, path: &str) -> bool {
        matches!(self.bundles.lock().get(path), Some(Slot::Ready(_)))
    }

    /// Whether the bundle is loading or loaded
    pub fn is_imported(&self, path: &str) -> bool {
        self.bundles.lock().contains_key(path)
    }

    /// Forget a bundle; its assets live on in outstanding `Arc`s
    pub fn clear_bundle(&self, path: &str) {
        if self.bundles.lock().remove(path).is_some() {
            debug!("Cleared bundle {}", path);
        }
    }

    /// Paths currently imported
    pub fn imported_paths(&self) -> Vec<String> {
        self.bundles.lock().keys().cloned().collect()
    }
}

/// Decode the bundle at `path`, following description references
pub fn load_bundle(archive: &dyn Archive, path: &str) -> Result<AssetBundle, AssetError> {
    let mut loader = Loader {
        archive,
        stack: Vec::new(),
        done: HashMap::new(),
    };
    loader.load(path).map(|bundle| (*bundle).clone())
}

struct Loader<'a> {
    archive: &'a dyn Archive,
    stack: Vec<String>,
    done: HashMap<String, Arc<AssetBundle>>,
}

impl Loader<'_> {
    fn load(&mut self, path: &str) -> Result<Arc<AssetBundle>, AssetError> {
        if let Some(bundle) = self.done.get(path) {
            return Ok(Arc::clone(bundle));
        }
        if self.stack.iter().any(|open| open == path) {
            return Err(AssetError::BundleCycle(path.to_string()));
        }

        self.stack.push(path.to_string());
        let result = self.decode(path);
        self.stack.pop();

        let bundle = Arc::new(result?);
        self.done.insert(path.to_string(), Arc::clone(&bundle));
        Ok(bundle)
    }

    fn decode(&mut self, path: &str) -> Result<AssetBundle, AssetError> {
        let format = BundleFormat::from_path(path)?;
        let mut bundle = AssetBundle::new();
        match format {
            BundleFormat::Obj => {
                let reader = BufReader::new(self.archive.open(path)?);
                for (name, mesh) in obj_loader::load_obj(reader, path, &file_stem(path))? {
                    bundle.insert_mesh(name, mesh)?;
                }
            }
            BundleFormat::Png => {
                let image = image_loader::decode_png(&self.archive.read(path)?, path)?;
                bundle.insert_image(file_stem(path), image)?;
            }
            #[cfg(feature = "audio")]
            BundleFormat::Wav => {
                let clip = super::audio_loader::decode_wav(self.archive.read(path)?, path)?;
                bundle.insert_audio(file_stem(path), clip)?;
            }
            #[cfg(not(feature = "audio"))]
            BundleFormat::Wav => return Err(AssetError::UnsupportedFormat(path.to_string())),
            BundleFormat::Description => self.decode_description(path, &mut bundle)?,
        }
        debug!("Decoded bundle {}", path);
        Ok(bundle)
    }

    fn decode_description(&mut self, path: &str, bundle: &mut AssetBundle) -> Result<(), AssetError> {
        let description =
            BundleDescription::from_json(&self.archive.read(path)?).map_err(|e| AssetError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let referenced: HashSet<&str> = description.referenced_bundles().collect();
        for reference in referenced {
            self.load(reference)?;
        }

        for entry in description.meshes {
            let mesh = self.done[&entry.source.bundle].get_mesh(&entry.source.asset)?.clone();
            bundle.insert_mesh(entry.name, mesh)?;
        }
        for entry in description.images {
            let image = self.done[&entry.source.bundle].get_image(&entry.source.asset)?.clone();
            bundle.insert_image(entry.name, image)?;
        }
        for entry in description.materials {
            bundle.insert_material(entry.name, entry.material)?;
        }
        for entry in description.textures {
            bundle.insert_texture(entry.name, entry.texture)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crossbeam::channel::{bounded, Receiver, Sender};

    use crate::assets::archive::MemoryArchive;
    use crate::assets::{image_loader::encode_png, AssetKind, AssetPath};
    use crate::render::primitives::{ColorRGBA, ImageRGBA};

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    /// Memory archive counting every `open`
    struct CountingArchive {
        inner: MemoryArchive,
        opens: AtomicUsize,
    }

    impl Archive for CountingArchive {
        fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, AssetError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(path)
        }

        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
    }

    /// Memory archive whose `slow.obj` blocks until released
    struct GatedArchive {
        inner: MemoryArchive,
        started: Sender<()>,
        release: Receiver<()>,
    }

    impl Archive for GatedArchive {
        fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, AssetError> {
            if path == "slow.obj" {
                let _ = self.started.send(());
                let _ = self.release.recv();
            }
            self.inner.open(path)
        }

        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
    }

    fn importer(archive: MemoryArchive) -> AssetImporter {
        AssetImporter::new(Arc::new(archive), Arc::new(ThreadPool::new(2)))
    }

    #[test]
    fn test_concurrent_duplicate_imports_decode_once() {
        let archive = Arc::new(CountingArchive {
            inner: MemoryArchive::new().with_file("a.json", r#"{"materials": [{"name": "Red"}]}"#),
            opens: AtomicUsize::new(0),
        });
        let importer = Arc::new(AssetImporter::new(archive.clone(), Arc::new(ThreadPool::new(4))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let importer = Arc::clone(&importer);
                thread::spawn(move || {
                    importer.import("a.json");
                    importer.get_bundle("a.json").map(|bundle| bundle.names(AssetKind::Material).len())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }

        assert_eq!(archive.opens.load(Ordering::SeqCst), 1);
        assert!(importer.is_loaded("a.json"));
    }

    #[test]
    fn test_loaded_bundle_is_served_while_another_loads() {
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let archive = GatedArchive {
            inner: MemoryArchive::new()
                .with_file("fast.obj", TRIANGLE)
                .with_file("slow.obj", TRIANGLE),
            started: started_tx,
            release: release_rx,
        };
        let importer = Arc::new(AssetImporter::new(Arc::new(archive), Arc::new(ThreadPool::new(2))));
        importer.get_bundle("fast.obj").unwrap();

        let waiter = {
            let importer = Arc::clone(&importer);
            thread::spawn(move || importer.get_bundle("slow.obj").is_ok())
        };
        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = bounded(1);
        {
            let importer = Arc::clone(&importer);
            thread::spawn(move || {
                let _ = done_tx.send(importer.get_bundle("fast.obj").is_ok());
            });
        }
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(!importer.is_loaded("slow.obj"));

        release_tx.send(()).unwrap();
        assert!(waiter.join().unwrap());
        assert!(importer.is_loaded("slow.obj"));
    }

    #[test]
    fn test_concurrent_waiters_share_a_failed_load() {
        let importer = Arc::new(AssetImporter::new(
            Arc::new(MemoryArchive::new()),
            Arc::new(ThreadPool::new(2)),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let importer = Arc::clone(&importer);
                thread::spawn(move || importer.get_bundle("missing.obj").is_err())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert!(!importer.is_imported("missing.obj"));
    }

    #[test]
    fn test_description_copies_referenced_assets() {
        let png = encode_png(&ImageRGBA::solid(2, 2, ColorRGBA::WHITE)).unwrap();
        let description = r#"{
            "meshes": [{"name": "Tri", "bundle": "tri.obj", "asset": ""}],
            "images": [{"name": "White", "bundle": "white.png", "asset": "white"}],
            "materials": [{"name": "Plain", "diffuseTexture": {"bundle": "scene.json", "asset": "White"}}],
            "textures": [{"name": "White", "image": {"bundle": "scene.json", "asset": "White"}}]
        }"#;
        let importer = importer(
            MemoryArchive::new()
                .with_file("tri.obj", TRIANGLE)
                .with_file("white.png", png)
                .with_file("scene.json", description),
        );

        let bundle = importer.get_bundle("scene.json").unwrap();
        assert_eq!(bundle.get_mesh("Tri").unwrap().vertices.len(), 3);
        assert_eq!(bundle.get_image("White").unwrap().width(), 2);
        assert_eq!(
            bundle.get_texture("").unwrap().image,
            AssetPath::new("scene.json", "White")
        );
        assert!(bundle.get_material("Plain").is_ok());
        // Referenced bundles are decoded inside the load, not imported
        assert!(!importer.is_imported("tri.obj"));
    }

    #[test]
    fn test_reference_cycles_are_rejected() {
        let importer = importer(
            MemoryArchive::new()
                .with_file("a.json", r#"{"meshes": [{"name": "M", "bundle": "b.json", "asset": ""}]}"#)
                .with_file("b.json", r#"{"meshes": [{"name": "M", "bundle": "a.json", "asset": ""}]}"#),
        );
        assert!(matches!(importer.get_bundle("a.json"), Err(AssetError::BundleCycle(_))));
    }

    #[test]
    fn test_failed_load_is_forgotten_and_retried() {
        let archive = Arc::new(MemoryArchive::new());
        let importer = AssetImporter::new(archive.clone(), Arc::new(ThreadPool::new(1)));

        assert!(matches!(importer.get_bundle("tri.obj"), Err(AssetError::NotFound(_))));
        assert!(!importer.is_imported("tri.obj"));

        archive.insert("tri.obj", TRIANGLE);
        let bundle = importer.get_bundle("tri.obj").unwrap();
        assert_eq!(bundle.names(AssetKind::Mesh), ["tri"]);
    }

    #[test]
    fn test_clear_bundle() {
        let importer = importer(MemoryArchive::new().with_file("tri.obj", TRIANGLE));
        let first = importer.get_bundle("tri.obj").unwrap();
        importer.clear_bundle("tri.obj");
        assert!(importer.imported_paths().is_empty());

        let second = importer.get_bundle("tri.obj").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unsupported_extension() {
        let importer = importer(MemoryArchive::new().with_file("model.fbx", "binary"));
        assert!(matches!(
            importer.get_bundle("model.fbx"),
            Err(AssetError::UnsupportedFormat(_))
        ));
    }
}
