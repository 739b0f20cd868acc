//! pych - bind declared functions to natively compiled C and Chapel routines
//!
//! A [`Declaration`] states a function's argument names, argument types and
//! return type. Binding it with [`FromExtern`] (or [`FromC`] / [`FromChapel`])
//! derives the external symbol and library names, hints the [`Runtime`], and
//! returns a [`BoundCall`]. The native handle is materialized on first call
//! and cached on the [`CallDescriptor`].
//!
//! ```ignore
//! use pych::{declare, DylibRuntime, FromC, Value};
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(DylibRuntime::from_env());
//! let add = FromC::new(runtime).source_file("add.c").bind(declare!(add(a: Int, b: Int) -> Int))?;
//! assert_eq!(add.call(&[Value::Int(2), Value::Int(3)])?, Value::Int(5));
//! ```

pub mod binder;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod lang;
pub mod logging;
pub mod manifest;
pub mod runtime;
pub mod types;
pub mod value;

#[cfg(feature = "native")]
pub mod cli;

// Re-export commonly used items
pub use binder::{inline_library_name, library_name_for, BoundCall, Declaration, FromExtern};
pub use config::RuntimeConfig;
pub use descriptor::{CallDescriptor, SourceLanguage};
pub use error::{CallError, ConfigError, DeclarationError, DispatchError, ManifestError, MaterializationError};
pub use lang::{FromC, FromChapel};
pub use logging::{init as init_logging, LogConfig};
pub use manifest::{ExternTable, Manifest};
pub use runtime::{NativeHandle, Runtime};
#[cfg(feature = "native")]
pub use runtime::{DylibRuntime, ForeignFunction};
pub use types::{NativeType, TypeMap, TypeTag};
pub use value::Value;
