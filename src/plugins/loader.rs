//! Cog loader - opens plugin units and extracts their exported descriptor.
//!
//! The loader is a trait so the registry state machine can be exercised with
//! stub modules in tests; the production implementation loads shared
//! libraries with `libloading`.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::application::errors::PluginError;
use crate::plugins::cog::CogModule;

/// Function signature every cog library must export as `cog_export`
pub type CogExportFn = extern "C" fn() -> *mut dyn CogModule;

/// An opened unit. `export` may be re-attempted later without re-opening
/// the module, which is how `FailedNoExport` units are retried.
pub trait ModuleHandle: Send + Sync {
    fn export(&self) -> Option<Box<dyn CogModule>>;
}

/// Opens plugin units from disk
pub trait CogLoader: Send + Sync {
    /// File extension identifying a unit
    fn unit_extension(&self) -> &str;

    /// File stem of the entry unit inside a directory cog
    fn entry_stem(&self) -> &str {
        "init"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>, PluginError>;
}

struct LibModule {
    library: Library,
    path: String,
}

impl ModuleHandle for LibModule {
    fn export(&self) -> Option<Box<dyn CogModule>> {
        let export: Symbol<CogExportFn> = unsafe {
            match self.library.get(b"cog_export") {
                Ok(symbol) => symbol,
                Err(err) => {
                    tracing::warn!("no cog_export in {}: {}", self.path, err);
                    return None;
                }
            }
        };
        let raw = export();
        if raw.is_null() {
            tracing::warn!("cog_export returned null in {}", self.path);
            return None;
        }
        Some(unsafe { Box::from_raw(raw) })
    }
}

/// Shared-library loader; units are `.so`/`.dylib`/`.dll` files exporting
/// `cog_export`.
pub struct LibCogLoader;

impl CogLoader for LibCogLoader {
    fn unit_extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>, PluginError> {
        let library = unsafe {
            Library::new(path).map_err(|err| PluginError::Open(err.to_string()))?
        };
        Ok(Box::new(LibModule {
            library,
            path: path.display().to_string(),
        }))
    }
}
