//! Type marshaling - host values to C values and back
//!
//! Design: scalars are copied into a fixed slot array, strings into owned
//! NUL-terminated buffers that live until the call returns.

use crate::error::DispatchError;
use crate::types::{NativeType, TypeMap};
use crate::value::Value;
use libc::wchar_t;
use libffi::middle::{Arg, Type};
use smallvec::SmallVec;
use std::ffi::{CStr, CString};
use std::mem::size_of;
use std::os::raw::{c_char, c_int, c_long, c_void};

/// libffi type descriptor for a native type
pub fn ffi_type(ty: NativeType) -> Type {
    match ty {
        NativeType::Void => Type::void(),
        NativeType::Bool => Type::u8(),
        NativeType::CInt => Type::c_int(),
        NativeType::CLong => Type::c_long(),
        NativeType::Double => Type::f64(),
        NativeType::CharPtr | NativeType::WCharPtr => Type::pointer(),
    }
}

/// Storage for one marshaled argument
#[derive(Debug, Clone, Copy)]
enum Slot {
    Bool(u8),
    Int(c_int),
    Long(c_long),
    Double(f64),
    Ptr(*const c_void),
}

/// Arguments converted for a single native call
///
/// Pointer slots refer into `strings` and `wide`; both outlive the call.
#[derive(Debug)]
pub struct Marshaled {
    slots: SmallVec<[Slot; 8]>,
    strings: Vec<CString>,
    wide: Vec<Vec<wchar_t>>,
}

impl Marshaled {
    /// Convert `args` to the C representation given by `types`
    pub fn new(args: &[Value], types: &[NativeType]) -> Result<Self, DispatchError> {
        if args.len() != types.len() {
            return Err(DispatchError::ArgumentCount {
                expected: types.len(),
                got: args.len(),
            });
        }

        let mut marshaled = Self {
            slots: SmallVec::with_capacity(args.len()),
            strings: Vec::new(),
            wide: Vec::new(),
        };

        for (index, (arg, &ty)) in args.iter().zip(types).enumerate() {
            let slot = match (ty, arg) {
                (NativeType::Bool, Value::Bool(b)) => Slot::Bool(u8::from(*b)),
                (NativeType::CInt, Value::Int(i)) => Slot::Int(*i as c_int),
                (NativeType::CLong, Value::Long(l)) => {
                    let long = c_long::try_from(*l)
                        .map_err(|_| DispatchError::LongOverflow { index, value: *l })?;
                    Slot::Long(long)
                }
                (NativeType::Double, Value::Float(x)) => Slot::Double(*x),
                (NativeType::CharPtr, Value::Str(s)) => {
                    let c_string = CString::new(s.as_bytes())
                        .map_err(|_| DispatchError::InteriorNul { index })?;
                    let ptr = c_string.as_ptr() as *const c_void;
                    marshaled.strings.push(c_string);
                    Slot::Ptr(ptr)
                }
                (NativeType::WCharPtr, Value::Unicode(s)) => {
                    if s.contains('\0') {
                        return Err(DispatchError::InteriorNul { index });
                    }
                    let buffer = to_wide(s);
                    let ptr = buffer.as_ptr() as *const c_void;
                    marshaled.wide.push(buffer);
                    Slot::Ptr(ptr)
                }
                _ => {
                    return Err(DispatchError::Unsupported {
                        index,
                        expected: TypeMap::host(ty),
                    })
                }
            };
            marshaled.slots.push(slot);
        }

        Ok(marshaled)
    }

    /// libffi argument references into the slots
    pub fn args(&self) -> SmallVec<[Arg; 8]> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Bool(v) => Arg::new(v),
                Slot::Int(v) => Arg::new(v),
                Slot::Long(v) => Arg::new(v),
                Slot::Double(v) => Arg::new(v),
                Slot::Ptr(v) => Arg::new(v),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// NUL-terminated wide string in the platform `wchar_t` encoding
pub fn to_wide(s: &str) -> Vec<wchar_t> {
    let mut buffer: Vec<wchar_t> = if size_of::<wchar_t>() == 2 {
        s.encode_utf16().map(|unit| unit as wchar_t).collect()
    } else {
        s.chars().map(|c| c as u32 as wchar_t).collect()
    };
    buffer.push(0);
    buffer
}

/// Copy a returned narrow string; NULL becomes `None`
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated string.
pub unsafe fn from_char_ptr(ptr: *const c_char) -> Value {
    if ptr.is_null() {
        return Value::None;
    }
    Value::Str(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy a returned wide string; NULL becomes `None`
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated `wchar_t` string.
pub unsafe fn from_wchar_ptr(ptr: *const wchar_t) -> Value {
    if ptr.is_null() {
        return Value::None;
    }

    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);

    let text = if size_of::<wchar_t>() == 2 {
        let utf16: Vec<u16> = units.iter().map(|&u| u as u16).collect();
        String::from_utf16_lossy(&utf16)
    } else {
        units
            .iter()
            .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    };
    Value::Unicode(text)
}
