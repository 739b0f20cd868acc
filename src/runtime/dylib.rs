//! Runtime backed by prebuilt shared libraries
//!
//! Libraries are resolved against the configured search paths, loaded once
//! per resolved path, and kept loaded for the life of the runtime.

use super::call::ForeignFunction;
use super::{NativeHandle, Runtime};
use crate::config::RuntimeConfig;
use crate::descriptor::CallDescriptor;
use crate::error::MaterializationError;
use crate::logging;
use dashmap::DashMap;
use libloading::Library;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Candidate paths for `library`, in the order they are tried
///
/// Names containing a path separator are used as given. Bare names are
/// looked up in each search path and finally handed to the system loader.
pub fn library_search_order(library: &str, search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let path = Path::new(library);
    if path.is_absolute() || path.components().count() > 1 {
        return vec![path.to_path_buf()];
    }

    search_paths
        .iter()
        .map(|dir| dir.join(library))
        .filter(|candidate| candidate.is_file())
        .chain(std::iter::once(path.to_path_buf()))
        .collect()
}

pub struct DylibRuntime {
    config: RuntimeConfig,
    hinted: DashMap<(String, Option<String>), Arc<CallDescriptor>>,
    libraries: DashMap<PathBuf, Arc<Library>>,
}

impl DylibRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            hinted: DashMap::new(),
            libraries: DashMap::new(),
        }
    }

    /// Runtime configured from `pych.toml` and `PYCH_LIBRARY_PATH`
    pub fn from_env() -> Self {
        Self::new(RuntimeConfig::from_env())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Descriptors hinted so far
    pub fn hinted(&self) -> Vec<Arc<CallDescriptor>> {
        self.hinted.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of distinct libraries currently loaded
    pub fn loaded_libraries(&self) -> usize {
        self.libraries.len()
    }

    /// Load the libraries of every hinted descriptor in one pass
    ///
    /// Returns the failures; successfully loaded libraries stay cached and
    /// failed ones are tried again on first call.
    pub fn preload_hinted(&self) -> Vec<MaterializationError> {
        let _perf = logging::perf::track("preload_hinted");
        self.hinted()
            .iter()
            .filter_map(|descriptor| self.library_for(descriptor).err())
            .inspect(|err| tracing::warn!(error = %err, "Preload failed"))
            .collect()
    }

    fn library_for(&self, descriptor: &CallDescriptor) -> Result<Arc<Library>, MaterializationError> {
        let failure = |reason: String| {
            MaterializationError::new(
                descriptor.external_symbol_name.clone(),
                descriptor.library_name.clone(),
                reason,
            )
        };

        let name = descriptor
            .library_name
            .as_deref()
            .ok_or_else(|| failure("no library name; declare a source file or library".into()))?;

        let mut errors = Vec::new();
        for candidate in library_search_order(name, &self.config.search_paths) {
            match self.load(&candidate) {
                Ok(library) => return Ok(library),
                Err(err) => errors.push(err.to_string()),
            }
        }

        Err(failure(errors.join("; ")))
    }

    fn load(&self, path: &Path) -> Result<Arc<Library>, libloading::Error> {
        if let Some(library) = self.libraries.get(path) {
            return Ok(library.clone());
        }

        // Loading runs the library's initializers; the entry API keeps two
        // threads from loading the same path at once.
        let entry = self.libraries.entry(path.to_path_buf());
        let library = match entry {
            dashmap::mapref::entry::Entry::Occupied(e) => e.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let library = Arc::new(unsafe { Library::new(path) }?);
                logging::log_library_loaded(path);
                e.insert(library).clone()
            }
        };
        Ok(library)
    }
}

impl Default for DylibRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime for DylibRuntime {
    fn hint(&self, descriptor: &Arc<CallDescriptor>) {
        logging::log_hint(descriptor);
        let key = (descriptor.host_name.clone(), descriptor.library_name.clone());
        // No loading here; library initializers run in preload_hinted or materialize
        self.hinted.insert(key, descriptor.clone());
    }

    fn materialize(
        &self,
        descriptor: &CallDescriptor,
    ) -> Result<Box<dyn NativeHandle>, MaterializationError> {
        let library = self.library_for(descriptor)?;
        let symbol = &descriptor.external_symbol_name;

        let ptr = unsafe { library.get::<*const c_void>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|err| {
                MaterializationError::new(
                    symbol.clone(),
                    descriptor.library_name.clone(),
                    format!("symbol not found: {}", err),
                )
            })?;

        Ok(Box::new(ForeignFunction::from_library(symbol.clone(), ptr, library)))
    }
}
