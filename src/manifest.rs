//! Declaration manifests - extern declarations listed in TOML
//!
//! ```toml
//! [[extern]]
//! name = "add"
//! args = ["a", "b"]
//! types = ["int", "int"]
//! returns = "int"
//! source = "add.c"
//! lang = "C"
//! ```

use crate::binder::{BoundCall, Declaration, FromExtern};
use crate::descriptor::SourceLanguage;
use crate::error::{CallError, DeclarationError, ManifestError};
use crate::runtime::Runtime;
use crate::types::TypeTag;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `[[extern]]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternEntry {
    pub name: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub types: Vec<String>,

    #[serde(default = "default_return")]
    pub returns: String,

    #[serde(default)]
    pub symbol: Option<String>,

    #[serde(default)]
    pub library: Option<String>,

    #[serde(default)]
    pub source: Option<PathBuf>,

    #[serde(default)]
    pub lang: Option<String>,

    /// Inline source code
    #[serde(default)]
    pub doc: Option<String>,
}

fn default_return() -> String {
    "None".to_string()
}

impl ExternEntry {
    /// Translate type names into a declaration
    pub fn declaration(&self) -> Result<Declaration, DeclarationError> {
        let parse = |name: &str| {
            TypeTag::from_name(name).ok_or_else(|| DeclarationError::UnknownTypeName {
                function: self.name.clone(),
                name: name.to_string(),
            })
        };

        let types = self
            .types
            .iter()
            .map(|t| parse(t))
            .collect::<Result<Vec<_>, _>>()?;

        let mut decl = Declaration::new(&self.name)
            .with_arg_names(self.args.iter().cloned())
            .with_arg_types(types)
            .returns(parse(&self.returns)?);
        if let Some(doc) = &self.doc {
            decl = decl.doc(doc.clone());
        }
        Ok(decl)
    }

    pub fn language(&self) -> Result<Option<SourceLanguage>, ManifestError> {
        self.lang
            .as_deref()
            .map(|lang| SourceLanguage::from_name(lang).ok_or_else(|| ManifestError::UnknownLanguage(lang.to_string())))
            .transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "extern")]
    pub externs: Vec<ExternEntry>,

    /// Directory relative source paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut manifest = Self::parse(&content)?;
        manifest.base_dir = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    /// Bind every entry; stops at the first invalid declaration
    pub fn bind(&self, runtime: Arc<dyn Runtime>) -> Result<ExternTable, ManifestError> {
        let mut calls = BTreeMap::new();

        for entry in &self.externs {
            if calls.contains_key(&entry.name) {
                return Err(ManifestError::Duplicate(entry.name.clone()));
            }

            let mut binder = FromExtern::new(runtime.clone());
            if let Some(language) = entry.language()? {
                binder = binder.language(language);
            }
            if let Some(symbol) = &entry.symbol {
                binder = binder.symbol(symbol.clone());
            }
            if let Some(library) = &entry.library {
                binder = binder.library(library.clone());
            }
            if let Some(source) = &entry.source {
                binder = binder.source_file(self.resolve(source));
            }

            let call = binder.bind(entry.declaration()?)?;
            calls.insert(entry.name.clone(), call);
        }

        Ok(ExternTable { calls })
    }

    fn resolve(&self, source: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if source.is_relative() => base.join(source),
            _ => source.to_path_buf(),
        }
    }
}

/// Bound calls by host name
#[derive(Debug, Default)]
pub struct ExternTable {
    calls: BTreeMap<String, BoundCall>,
}

impl ExternTable {
    pub fn get(&self, name: &str) -> Option<&BoundCall> {
        self.calls.get(name)
    }

    /// Call `name`; `None` when no such extern is declared
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, CallError>> {
        self.get(name).map(|call| call.call(args))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundCall> {
        self.calls.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
