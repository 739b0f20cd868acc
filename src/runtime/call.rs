//! Dynamic function calling through libffi
//!
//! A `ForeignFunction` is a raw symbol address plus the call interface built
//! from its configured native types.

use super::marshal::{self, ffi_type, Marshaled};
use super::NativeHandle;
use crate::error::DispatchError;
use crate::types::NativeType;
use crate::value::Value;
use libc::wchar_t;
use libffi::middle::{Cif, CodePtr};
use libloading::Library;
use std::fmt;
use std::os::raw::{c_char, c_long, c_void};
use std::sync::Arc;

/// Configured call interface
struct Signature {
    cif: Cif,
    args: Vec<NativeType>,
    ret: NativeType,
}

/// Native handle for a symbol in a loaded library
pub struct ForeignFunction {
    symbol: String,
    code: CodePtr,
    signature: Option<Signature>,
    // Keeps the code mapped for as long as the handle exists
    _library: Option<Arc<Library>>,
}

impl ForeignFunction {
    /// Wrap a symbol resolved from `library`
    pub(crate) fn from_library(symbol: impl Into<String>, ptr: *const c_void, library: Arc<Library>) -> Self {
        Self {
            symbol: symbol.into(),
            code: CodePtr::from_ptr(ptr),
            signature: None,
            _library: Some(library),
        }
    }

    /// Wrap a raw function pointer
    ///
    /// # Safety
    /// `ptr` must point to a C-ABI function that stays valid for the
    /// lifetime of the handle.
    pub unsafe fn from_raw(symbol: impl Into<String>, ptr: *const c_void) -> Self {
        Self {
            symbol: symbol.into(),
            code: CodePtr::from_ptr(ptr),
            signature: None,
            _library: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_configured(&self) -> bool {
        self.signature.is_some()
    }

    /// Configured argument and return types
    pub fn native_signature(&self) -> Option<(&[NativeType], NativeType)> {
        self.signature.as_ref().map(|sig| (sig.args.as_slice(), sig.ret))
    }
}

impl NativeHandle for ForeignFunction {
    fn configure(&mut self, args: &[NativeType], ret: NativeType) {
        let cif = Cif::new(args.iter().copied().map(ffi_type), ffi_type(ret));
        self.signature = Some(Signature {
            cif,
            args: args.to_vec(),
            ret,
        });
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, DispatchError> {
        let sig = self.signature.as_ref().ok_or(DispatchError::Unconfigured)?;
        let marshaled = Marshaled::new(args, &sig.args)?;
        let ffi_args = marshaled.args();

        // libffi widens integral returns to a full register-sized `ffi_arg`,
        // so small integers are read back through a u64 and truncated.
        let value = unsafe {
            match sig.ret {
                NativeType::Void => {
                    sig.cif.call::<()>(self.code, &ffi_args);
                    Value::None
                }
                NativeType::Bool => Value::Bool(sig.cif.call::<u64>(self.code, &ffi_args) as u8 != 0),
                NativeType::CInt => Value::Int(sig.cif.call::<u64>(self.code, &ffi_args) as i32),
                NativeType::CLong => {
                    let raw = sig.cif.call::<u64>(self.code, &ffi_args);
                    Value::Long(raw as c_long as i64)
                }
                NativeType::Double => Value::Float(sig.cif.call::<f64>(self.code, &ffi_args)),
                NativeType::CharPtr => {
                    marshal::from_char_ptr(sig.cif.call::<*const c_char>(self.code, &ffi_args))
                }
                NativeType::WCharPtr => {
                    marshal::from_wchar_ptr(sig.cif.call::<*const wchar_t>(self.code, &ffi_args))
                }
            }
        };

        drop(marshaled);
        Ok(value)
    }
}

// The code pointer and CIF are immutable after `configure`, which requires
// `&mut self`; concurrent `invoke` calls only read them.
unsafe impl Send for ForeignFunction {}
unsafe impl Sync for ForeignFunction {}

impl fmt::Debug for ForeignFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignFunction")
            .field("symbol", &self.symbol)
            .field("signature", &self.native_signature())
            .finish()
    }
}
