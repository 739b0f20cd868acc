//! Language-specific binders

use crate::binder::{BoundCall, Declaration, FromExtern};
use crate::descriptor::SourceLanguage;
use crate::error::DeclarationError;
use crate::runtime::Runtime;
use std::path::PathBuf;
use std::sync::Arc;

macro_rules! language_binder {
    ($(#[$meta:meta])* $name:ident => $language:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(FromExtern);

        impl $name {
            pub fn new(runtime: Arc<dyn Runtime>) -> Self {
                Self(FromExtern::new(runtime).language($language))
            }

            pub fn symbol(self, name: impl Into<String>) -> Self {
                Self(self.0.symbol(name))
            }

            pub fn library(self, name: impl Into<String>) -> Self {
                Self(self.0.library(name))
            }

            pub fn source_file(self, path: impl Into<PathBuf>) -> Self {
                Self(self.0.source_file(path))
            }

            pub fn bind(&self, declaration: Declaration) -> Result<BoundCall, DeclarationError> {
                self.0.bind(declaration)
            }
        }

        impl From<$name> for FromExtern {
            fn from(binder: $name) -> Self {
                binder.0
            }
        }
    };
}

language_binder! {
    /// Binder for functions implemented in C
    FromC => SourceLanguage::C
}

language_binder! {
    /// Binder for functions implemented in Chapel
    FromChapel => SourceLanguage::Chapel
}
