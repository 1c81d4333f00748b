//! Extension-triggered mount-point resolution, grounded on the original
//! system's `resolver.go`: walk a cleaned path component by component,
//! find the first component whose suffix matches a registered extension,
//! treat it as the pivot, and cache the nested filesystem it opens to by
//! mount-point prefix.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::vfs::{File, FileInfo, Filesystem, VPath};

/// Builds a nested [`Filesystem`] from an opened mount-point file.
pub type FsFactory = Box<dyn Fn(Box<dyn File>) -> VfsResult<Box<dyn Filesystem>> + Send + Sync>;

struct Registration {
    extension: String,
    factory: FsFactory,
}

/// The result of resolving a virtual path: the mount point within the root
/// filesystem, and, if a factory pivot matched, the nested filesystem and
/// the remaining sub-path within it.
pub struct Resolution {
    pub mount: VPath,
    pub nested: Option<(std::sync::Arc<dyn Filesystem>, VPath)>,
}

/// Resolves virtual paths against a root filesystem and a registry of
/// extension-triggered nested-filesystem factories, caching first-access
/// instantiations by mount-point prefix.
pub struct ResolverFs {
    root: std::sync::Arc<dyn Filesystem>,
    registrations: Vec<Registration>,
    cache: Mutex<HashMap<String, std::sync::Arc<dyn Filesystem>>>,
}

impl ResolverFs {
    pub fn new(root: std::sync::Arc<dyn Filesystem>) -> Self {
        Self {
            root,
            registrations: Vec::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a factory for `extension` (e.g. `.zip`). Registration
    /// order is part of the public contract: the first registered match
    /// wins when several extensions could match the same component.
    pub fn register(&mut self, extension: impl Into<String>, factory: FsFactory) {
        self.registrations.push(Registration {
            extension: extension.into(),
            factory,
        });
    }

    fn matching_extension(&self, component: &str) -> Option<&str> {
        self.registrations
            .iter()
            .find(|r| component.ends_with(r.extension.as_str()))
            .map(|r| r.extension.as_str())
    }

    /// Finds the pivot component (if any) and splits `path` into the mount
    /// point (inclusive of the pivot) and the remaining sub-path.
    fn split_at_pivot(&self, path: &VPath) -> (VPath, Option<VPath>) {
        let comps = path.components();
        for (i, comp) in comps.iter().enumerate() {
            if self.matching_extension(comp).is_some() {
                let mount = VPath::clean(&format!("/{}", comps[..=i].join("/")));
                let sub = if i + 1 < comps.len() {
                    VPath::clean(&format!("/{}", comps[i + 1..].join("/")))
                } else {
                    VPath::root()
                };
                return (mount, Some(sub));
            }
        }
        (path.clone(), None)
    }

    /// Resolves `path`, instantiating and caching the nested filesystem at
    /// its mount point if one has not been opened yet.
    pub fn resolve(&self, path: &VPath) -> VfsResult<Resolution> {
        let (mount, sub) = self.split_at_pivot(path);
        let Some(sub) = sub else {
            return Ok(Resolution { mount, nested: None });
        };

        let key = mount.as_str().to_string();
        let mut guard = self.cache.lock().unwrap();
        if let Some(fs) = guard.get(&key) {
            return Ok(Resolution {
                mount: mount.clone(),
                nested: Some((std::sync::Arc::clone(fs), sub)),
            });
        }

        let registration = self
            .registrations
            .iter()
            .find(|r| mount.name().ends_with(r.extension.as_str()))
            .expect("split_at_pivot only returns Some(sub) when a registration matched");

        let handle = self
            .root
            .open(&mount)
            .map_err(|e| e.with_context(mount.as_str()))?;
        let nested_fs: std::sync::Arc<dyn Filesystem> = (registration.factory)(handle)
            .map_err(|e| {
                VfsError::backend(
                    mount.as_str(),
                    "resolver.open_nested",
                    e.to_string(),
                )
            })?
            .into();
        guard.insert(key, std::sync::Arc::clone(&nested_fs));

        Ok(Resolution {
            mount,
            nested: Some((nested_fs, sub)),
        })
    }

    fn has_any_extension(&self, name: &str) -> bool {
        self.matching_extension(name).is_some()
    }
}

impl Filesystem for ResolverFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        let resolution = self.resolve(path)?;
        match resolution.nested {
            Some((fs, sub)) => fs.open(&sub).map_err(|e| e.with_context(path.as_str())),
            None => self.root.open(&resolution.mount),
        }
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        let resolution = self.resolve(path)?;
        match resolution.nested {
            Some((fs, sub)) => fs.stat(&sub),
            None => self.root.stat(&resolution.mount),
        }
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        let resolution = self.resolve(path)?;
        match resolution.nested {
            Some((fs, sub)) => fs.read_dir(&sub),
            None => {
                let mut entries = self.root.read_dir(&resolution.mount)?;
                for entry in entries.iter_mut() {
                    if !entry.is_dir && self.has_any_extension(&entry.name) {
                        entry.is_dir = true;
                        entry.size = 0;
                    }
                }
                Ok(entries)
            }
        }
    }

    fn unlink(&self, path: &VPath) -> VfsResult<()> {
        let resolution = self.resolve(path)?;
        match resolution.nested {
            Some((fs, sub)) => fs.unlink(&sub),
            None => self.root.unlink(&resolution.mount),
        }
    }
}
