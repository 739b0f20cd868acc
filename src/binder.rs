//! Declaration binder - turns a host declaration into a lazily bound call
//!
//! Binding happens once per declared function: the signature is validated,
//! symbol and library names are derived, and the runtime is hinted. Each
//! call then type-checks its arguments, materializes the native handle on
//! first use, and dispatches.

use crate::descriptor::{CallDescriptor, SourceLanguage};
use crate::error::{CallError, DeclarationError};
use crate::logging;
use crate::runtime::{NativeHandle, Runtime};
use crate::types::{TypeMap, TypeTag};
use crate::value::{type_tags, Value};
use std::env::consts::DLL_EXTENSION;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Library name used for functions whose doc string carries inline source
pub fn inline_library_name() -> String {
    format!("inline.{}", DLL_EXTENSION)
}

/// `lib<stem>.<ext>` for a source file such as `src/foo.chpl`
pub fn library_name_for(source_file: &Path) -> String {
    let stem = source_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("lib{}.{}", stem, DLL_EXTENSION)
}

/// Explicit signature of a host function
///
/// Names and types are kept as separate lists so that sources which supply
/// them independently (manifests) go through the same validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub doc: Option<String>,
    pub arg_names: Vec<String>,
    pub arg_types: Vec<TypeTag>,
    pub return_type: TypeTag,
}

impl Declaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            arg_names: Vec::new(),
            arg_types: Vec::new(),
            return_type: TypeTag::None,
        }
    }

    /// Append a named, typed argument
    pub fn arg(mut self, name: impl Into<String>, ty: TypeTag) -> Self {
        self.arg_names.push(name.into());
        self.arg_types.push(ty);
        self
    }

    pub fn returns(mut self, ty: TypeTag) -> Self {
        self.return_type = ty;
        self
    }

    /// Attach inline external source code
    pub fn doc(mut self, source: impl Into<String>) -> Self {
        self.doc = Some(source.into());
        self
    }

    pub fn with_arg_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_arg_types(mut self, types: impl IntoIterator<Item = TypeTag>) -> Self {
        self.arg_types = types.into_iter().collect();
        self
    }

    /// Check arity and that every argument type is marshalable
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if self.arg_names.len() != self.arg_types.len() {
            return Err(DeclarationError::ArityMismatch {
                function: self.name.clone(),
                names: self.arg_names.len(),
                types: self.arg_types.len(),
            });
        }

        for (name, ty) in self.arg_names.iter().zip(&self.arg_types) {
            if !ty.is_argument_type() {
                return Err(DeclarationError::UnsupportedType {
                    function: self.name.clone(),
                    argument: name.clone(),
                    ty: *ty,
                });
            }
        }

        Ok(())
    }
}

/// Build a [`Declaration`] from a signature-like form
///
/// ```ignore
/// let decl = declare!(add(a: Int, b: Int) -> Int);
/// let hello = declare!(hello() -> None, doc = "void hello(void) { puts(\"hi\"); }");
/// ```
#[macro_export]
macro_rules! declare {
    ($name:ident ( $($arg:ident : $ty:ident),* $(,)? ) -> $ret:ident $(, doc = $doc:expr)?) => {{
        let decl = $crate::Declaration::new(stringify!($name))
            $(.arg(stringify!($arg), $crate::TypeTag::$ty))*
            .returns($crate::TypeTag::$ret);
        $(let decl = decl.doc($doc);)?
        decl
    }};
}

/// Binds host declarations to external functions
///
/// Binding parameters are stored verbatim; nothing is validated until
/// [`FromExtern::bind`].
#[derive(Clone)]
pub struct FromExtern {
    runtime: Arc<dyn Runtime>,
    symbol: Option<String>,
    library: Option<String>,
    source_file: Option<PathBuf>,
    language: Option<SourceLanguage>,
}

impl FromExtern {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            symbol: None,
            library: None,
            source_file: None,
            language: None,
        }
    }

    /// External symbol name; defaults to the host function name
    pub fn symbol(mut self, name: impl Into<String>) -> Self {
        self.symbol = Some(name.into());
        self
    }

    /// Library to load when neither inline source nor a source file is given
    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.library = Some(name.into());
        self
    }

    pub fn source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn language(mut self, language: SourceLanguage) -> Self {
        self.language = Some(language);
        self
    }

    /// Bind `declaration`, producing a callable that materializes lazily
    pub fn bind(&self, declaration: Declaration) -> Result<BoundCall, DeclarationError> {
        declaration.validate()?;

        let Declaration {
            name,
            doc,
            arg_names,
            arg_types,
            return_type,
        } = declaration;

        let symbol = self.symbol.clone().unwrap_or_else(|| name.clone());
        // Inline source and source files always name their own library
        let library = match (&doc, &self.source_file) {
            (Some(_), _) => Some(inline_library_name()),
            (None, Some(source)) => Some(library_name_for(source)),
            (None, None) => self.library.clone(),
        };

        let descriptor = Arc::new(CallDescriptor::new(
            name,
            doc,
            arg_names,
            arg_types,
            return_type,
            symbol,
            library,
            self.source_file.clone(),
            self.language,
        ));

        logging::log_bind(&descriptor);

        // Lets the runtime compile or load ahead of the first call
        self.runtime.hint(&descriptor);

        Ok(BoundCall {
            descriptor,
            runtime: self.runtime.clone(),
        })
    }
}

impl fmt::Debug for FromExtern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromExtern")
            .field("symbol", &self.symbol)
            .field("library", &self.library)
            .field("source_file", &self.source_file)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Replacement callable produced by binding
///
/// Cheap to clone; clones share the descriptor and its native handle.
#[derive(Clone)]
pub struct BoundCall {
    descriptor: Arc<CallDescriptor>,
    runtime: Arc<dyn Runtime>,
}

impl BoundCall {
    pub fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.host_name
    }

    #[inline]
    pub fn is_materialized(&self) -> bool {
        self.descriptor.is_materialized()
    }

    /// Type-check, materialize on first use, and invoke the native function
    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        self.type_check(args)?;

        let handle = self.materialize()?;

        logging::log_ffi_call(&self.descriptor.external_symbol_name, args.len());
        match handle.invoke(args) {
            Ok(value) => {
                logging::log_ffi_return(&self.descriptor.external_symbol_name);
                Ok(value)
            }
            Err(source) => {
                logging::log_ffi_error(&self.descriptor.external_symbol_name, &source.to_string());
                Err(CallError::Dispatch {
                    function: self.descriptor.host_name.clone(),
                    source,
                })
            }
        }
    }

    /// Resolve the native handle without calling it
    pub fn materialize(&self) -> Result<Arc<dyn NativeHandle>, CallError> {
        let descriptor = &self.descriptor;
        let handle = descriptor.handle_or_materialize(|| {
            let _perf = logging::perf::track("materialize");
            logging::log_materialize(descriptor);

            let mut handle = self.runtime.materialize(descriptor).map_err(|err| {
                logging::log_materialize_error(&err);
                err
            })?;
            handle.configure(
                &TypeMap::native_args(&descriptor.argument_types),
                TypeMap::native(descriptor.return_type),
            );
            Ok(Arc::from(handle))
        })?;
        Ok(handle)
    }

    fn type_check(&self, args: &[Value]) -> Result<(), CallError> {
        let actual = type_tags(args);
        if actual != self.descriptor.argument_types {
            return Err(CallError::TypeMismatch {
                function: self.descriptor.host_name.clone(),
                actual,
                expected: self.descriptor.argument_types.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for BoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundCall").field(&self.descriptor).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchError, MaterializationError};
    use crate::types::NativeType;

    struct NoRuntime;

    impl Runtime for NoRuntime {
        fn hint(&self, _descriptor: &Arc<CallDescriptor>) {}

        fn materialize(
            &self,
            descriptor: &CallDescriptor,
        ) -> Result<Box<dyn NativeHandle>, MaterializationError> {
            Err(MaterializationError::new(
                descriptor.external_symbol_name.clone(),
                descriptor.library_name.clone(),
                "library not found",
            ))
        }
    }

    struct Echo;

    impl NativeHandle for Echo {
        fn configure(&mut self, _args: &[NativeType], _ret: NativeType) {}

        fn invoke(&self, args: &[Value]) -> Result<Value, DispatchError> {
            Ok(args.first().cloned().unwrap_or(Value::None))
        }
    }

    struct EchoRuntime;

    impl Runtime for EchoRuntime {
        fn hint(&self, _descriptor: &Arc<CallDescriptor>) {}

        fn materialize(
            &self,
            _descriptor: &CallDescriptor,
        ) -> Result<Box<dyn NativeHandle>, MaterializationError> {
            Ok(Box::new(Echo))
        }
    }

    fn binder() -> FromExtern {
        FromExtern::new(Arc::new(NoRuntime))
    }

    #[test]
    fn test_library_naming() {
        let ext = DLL_EXTENSION;
        assert_eq!(library_name_for(Path::new("foo.chpl")), format!("libfoo.{}", ext));
        assert_eq!(library_name_for(Path::new("/src/k/add.c")), format!("libadd.{}", ext));
        assert_eq!(inline_library_name(), format!("inline.{}", ext));
    }

    #[test]
    fn test_declare_macro() {
        let decl = declare!(add(a: Int, b: Int) -> Int);
        assert_eq!(decl, Declaration::new("add").arg("a", TypeTag::Int).arg("b", TypeTag::Int).returns(TypeTag::Int));

        let decl = declare!(hello() -> None, doc = "void hello(void) {}");
        assert!(decl.arg_names.is_empty());
        assert_eq!(decl.doc.as_deref(), Some("void hello(void) {}"));
    }

    #[test]
    fn test_arity_mismatch() {
        let decl = Declaration::new("f")
            .with_arg_names(["a", "b"])
            .with_arg_types([TypeTag::Int]);
        let err = binder().bind(decl).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::ArityMismatch { function: "f".into(), names: 2, types: 1 }
        );
    }

    #[test]
    fn test_none_argument_rejected() {
        let decl = Declaration::new("f").arg("x", TypeTag::None);
        assert!(matches!(
            binder().bind(decl),
            Err(DeclarationError::UnsupportedType { ty: TypeTag::None, .. })
        ));
    }

    #[test]
    fn test_inline_doc_names() {
        let call = binder()
            .bind(declare!(hello() -> None, doc = "void hello(void) {}"))
            .unwrap();
        let desc = call.descriptor();
        assert_eq!(desc.external_symbol_name, "hello");
        assert_eq!(desc.library_name, Some(inline_library_name()));
    }

    #[test]
    fn test_doc_takes_precedence_over_source() {
        let call = binder()
            .source_file("mod.c")
            .bind(declare!(f() -> Int, doc = "int f(void) { return 1; }"))
            .unwrap();
        assert_eq!(call.descriptor().library_name, Some(inline_library_name()));
    }

    #[test]
    fn test_source_file_derives_library_over_explicit() {
        let call = binder()
            .symbol("c_add")
            .library("libmath.so")
            .source_file("add.c")
            .bind(declare!(add(a: Int, b: Int) -> Int))
            .unwrap();
        let desc = call.descriptor();
        assert_eq!(desc.external_symbol_name, "c_add");
        assert_eq!(desc.library_name, Some(library_name_for(Path::new("add.c"))));
    }

    #[test]
    fn test_doc_derives_library_over_explicit() {
        let call = binder()
            .library("libmath.so")
            .bind(declare!(f() -> Int, doc = "int f(void) { return 1; }"))
            .unwrap();
        assert_eq!(call.descriptor().library_name, Some(inline_library_name()));
    }

    #[test]
    fn test_explicit_library_without_source() {
        let call = binder()
            .symbol("c_add")
            .library("libmath.so")
            .bind(declare!(add(a: Int, b: Int) -> Int))
            .unwrap();
        let desc = call.descriptor();
        assert_eq!(desc.external_symbol_name, "c_add");
        assert_eq!(desc.library_name.as_deref(), Some("libmath.so"));
    }

    #[test]
    fn test_no_source_leaves_library_unset() {
        let call = binder().bind(declare!(f() -> None)).unwrap();
        assert_eq!(call.descriptor().external_symbol_name, "f");
        assert_eq!(call.descriptor().library_name, None);
    }

    #[test]
    fn test_materialization_error_is_surfaced_each_call() {
        let call = binder().source_file("add.c").bind(declare!(add(a: Int) -> Int)).unwrap();
        for _ in 0..2 {
            let err = call.call(&[Value::Int(1)]).unwrap_err();
            assert!(matches!(err, CallError::Materialization(_)));
        }
        assert!(!call.is_materialized());
    }

    #[test]
    fn test_type_mismatch_before_materialize() {
        let call = binder().bind(declare!(f(x: Long) -> Long)).unwrap();
        let err = call.call(&[Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            CallError::TypeMismatch {
                function: "f".into(),
                actual: vec![TypeTag::Int],
                expected: vec![TypeTag::Long],
            }
        );
    }

    #[test]
    fn test_clones_share_handle() {
        let call = FromExtern::new(Arc::new(EchoRuntime))
            .bind(declare!(id(x: Float) -> Float))
            .unwrap();
        let other = call.clone();

        assert_eq!(call.call(&[Value::Float(1.5)]), Ok(Value::Float(1.5)));
        assert!(other.is_materialized());
    }
}
