//! Runtime - resolves descriptors into callable native handles
//!
//! Architecture:
//! - `Runtime` - collaborator that tracks hints and materializes handles
//! - `NativeHandle` - a typed, callable external symbol
//! - `dylib.rs` - runtime backed by prebuilt shared libraries
//! - `call.rs` - libffi-backed native handle
//! - `marshal.rs` - host value to C value conversions

use crate::descriptor::CallDescriptor;
use crate::error::{DispatchError, MaterializationError};
use crate::types::NativeType;
use crate::value::Value;
use std::sync::Arc;

#[cfg(feature = "native")]
mod call;
#[cfg(feature = "native")]
mod dylib;
#[cfg(feature = "native")]
mod marshal;

#[cfg(feature = "native")]
pub use call::ForeignFunction;
#[cfg(feature = "native")]
pub use dylib::{library_search_order, DylibRuntime};

/// Collaborator that owns library resolution and loading
///
/// Injected into binders; implementations must tolerate concurrent use.
pub trait Runtime: Send + Sync {
    /// Record that `descriptor` may be materialized later.
    ///
    /// Advisory: must not block on compilation and never fails visibly.
    fn hint(&self, descriptor: &Arc<CallDescriptor>);

    /// Produce a handle bound to the descriptor's symbol within its library
    fn materialize(
        &self,
        descriptor: &CallDescriptor,
    ) -> Result<Box<dyn NativeHandle>, MaterializationError>;
}

/// A resolved external function
pub trait NativeHandle: Send + Sync {
    /// Set argument and return marshaling types before first use
    fn configure(&mut self, args: &[NativeType], ret: NativeType);

    /// Invoke with already type-checked arguments
    fn invoke(&self, args: &[Value]) -> Result<Value, DispatchError>;
}
