//! Type map - host type tags and their native calling-convention types
//!
//! Design: closed enums on both sides, total mapping, no state.

use std::fmt;

/// Host-side primitive type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// No value; only valid as a return type
    None,
    Bool,
    /// Platform `int`
    Int,
    /// Platform `long`
    Long,
    /// Double-precision float
    Float,
    /// Narrow string (`const char*`)
    Str,
    /// Wide string (`const wchar_t*`)
    Unicode,
}

impl TypeTag {
    /// All tags known to the type map
    pub const ALL: [TypeTag; 7] = [
        Self::None,
        Self::Bool,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Str,
        Self::Unicode,
    ];

    /// Parse a host type name as written in manifests and on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "None" | "none" | "void" => Some(Self::None),
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" | "double" => Some(Self::Float),
            "str" => Some(Self::Str),
            "unicode" => Some(Self::Unicode),
            _ => None,
        }
    }

    /// Host spelling of the tag
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Str => "str",
            Self::Unicode => "unicode",
        }
    }

    /// Whether the tag may be used for a function argument
    #[inline]
    pub const fn is_argument_type(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native calling-convention type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeType {
    Void,
    Bool,
    CInt,
    CLong,
    Double,
    CharPtr,
    WCharPtr,
}

impl NativeType {
    /// C spelling, for diagnostics
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "_Bool",
            Self::CInt => "int",
            Self::CLong => "long",
            Self::Double => "double",
            Self::CharPtr => "const char*",
            Self::WCharPtr => "const wchar_t*",
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Total mapping from host type tags to native types
pub struct TypeMap;

impl TypeMap {
    /// Native type used to marshal `tag`
    #[inline]
    pub const fn native(tag: TypeTag) -> NativeType {
        match tag {
            TypeTag::None => NativeType::Void,
            TypeTag::Bool => NativeType::Bool,
            TypeTag::Int => NativeType::CInt,
            TypeTag::Long => NativeType::CLong,
            TypeTag::Float => NativeType::Double,
            TypeTag::Str => NativeType::CharPtr,
            TypeTag::Unicode => NativeType::WCharPtr,
        }
    }

    /// Host tag marshaled by `native`
    #[inline]
    pub const fn host(native: NativeType) -> TypeTag {
        match native {
            NativeType::Void => TypeTag::None,
            NativeType::Bool => TypeTag::Bool,
            NativeType::CInt => TypeTag::Int,
            NativeType::CLong => TypeTag::Long,
            NativeType::Double => TypeTag::Float,
            NativeType::CharPtr => TypeTag::Str,
            NativeType::WCharPtr => TypeTag::Unicode,
        }
    }

    /// Map a list of argument tags
    pub fn native_args(tags: &[TypeTag]) -> Vec<NativeType> {
        tags.iter().copied().map(Self::native).collect()
    }
}
