//! Call descriptor - one host-to-native function mapping
//!
//! The descriptor is frozen once binding has derived its names. The only
//! state that changes afterwards is the write-once native handle slot.

use crate::error::MaterializationError;
use crate::runtime::NativeHandle;
use crate::types::TypeTag;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Language the external implementation is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    C,
    Chapel,
}

impl SourceLanguage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "c" => Some(Self::C),
            "chapel" | "chpl" => Some(Self::Chapel),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Chapel => "Chapel",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping between a declared host function and an external function
pub struct CallDescriptor {
    /// Host function name
    pub host_name: String,
    /// Documentation string, used as inline source code
    pub doc: Option<String>,
    /// Names of the declared arguments
    pub argument_names: Vec<String>,
    /// Types of the declared arguments, aligned with `argument_names`
    pub argument_types: Vec<TypeTag>,
    pub return_type: TypeTag,

    /// Symbol to look up in the library
    pub external_symbol_name: String,
    /// Library filename
    pub library_name: Option<String>,
    /// File with the external source code
    pub source_file: Option<PathBuf>,
    pub source_language: Option<SourceLanguage>,

    native_handle: HandleSlot,
}

impl CallDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        host_name: String,
        doc: Option<String>,
        argument_names: Vec<String>,
        argument_types: Vec<TypeTag>,
        return_type: TypeTag,
        external_symbol_name: String,
        library_name: Option<String>,
        source_file: Option<PathBuf>,
        source_language: Option<SourceLanguage>,
    ) -> Self {
        Self {
            host_name,
            doc,
            argument_names,
            argument_types,
            return_type,
            external_symbol_name,
            library_name,
            source_file,
            source_language,
            native_handle: HandleSlot::default(),
        }
    }

    /// Whether a native handle has been bound
    #[inline]
    pub fn is_materialized(&self) -> bool {
        self.native_handle.get().is_some()
    }

    /// The cached native handle, if bound
    pub fn native_handle(&self) -> Option<&Arc<dyn NativeHandle>> {
        self.native_handle.get()
    }

    /// Return the cached handle or run `materialize` to produce one
    pub(crate) fn handle_or_materialize<F>(
        &self,
        materialize: F,
    ) -> Result<Arc<dyn NativeHandle>, MaterializationError>
    where
        F: FnOnce() -> Result<Arc<dyn NativeHandle>, MaterializationError>,
    {
        self.native_handle.get_or_materialize(materialize)
    }

    /// `name(a: int, b: int) -> int`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .argument_names
            .iter()
            .zip(&self.argument_types)
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        format!("{}({}) -> {}", self.host_name, args.join(", "), self.return_type)
    }
}

impl fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("host_name", &self.host_name)
            .field("doc", &self.doc)
            .field("argument_names", &self.argument_names)
            .field("argument_types", &self.argument_types)
            .field("return_type", &self.return_type)
            .field("external_symbol_name", &self.external_symbol_name)
            .field("library_name", &self.library_name)
            .field("source_file", &self.source_file)
            .field("source_language", &self.source_language)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Write-once native handle slot
///
/// Reads after the first success are lock-free. Callers that arrive while
/// an attempt is running share its outcome, failure included. A call that
/// starts after a failed attempt has finished tries again.
///
/// `failures` counts finished failed attempts. A caller snapshots it before
/// waiting on the gate; a stored failure with a newer generation finished
/// while the caller was waiting and is shared instead of retried.
#[derive(Default)]
struct HandleSlot {
    handle: OnceCell<Arc<dyn NativeHandle>>,
    failures: AtomicU64,
    gate: Mutex<Option<(u64, MaterializationError)>>,
}

impl HandleSlot {
    #[inline]
    fn get(&self) -> Option<&Arc<dyn NativeHandle>> {
        self.handle.get()
    }

    fn get_or_materialize<F>(&self, materialize: F) -> Result<Arc<dyn NativeHandle>, MaterializationError>
    where
        F: FnOnce() -> Result<Arc<dyn NativeHandle>, MaterializationError>,
    {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let seen = self.failures.load(Ordering::Acquire);
        let mut last_failure = self.gate.lock();

        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }
        if let Some((generation, err)) = last_failure.as_ref() {
            if *generation > seen {
                return Err(err.clone());
            }
        }

        match materialize() {
            Ok(handle) => {
                *last_failure = None;
                Ok(self.handle.get_or_init(|| handle).clone())
            }
            Err(err) => {
                // Bumped under the gate so waiters see the stored failure as newer
                let generation = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                *last_failure = Some((generation, err.clone()));
                Err(err)
            }
        }
    }
}
