use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::internal::{
    actions::{
        builtin::BUILTIN_ACTIONS,
        manifest::{parse_manifest, ContractViolation},
        spec::{is_valid_identifier, ActionDescriptor, ActionOrigin},
    },
    config::Config,
    kernel::sandbox::{self, SandboxViolation},
};

const MANIFEST_EXTENSION: &str = "json";

/// Ordered, immutable name -> descriptor catalog.
///
/// Built-ins come first in their fixed order, then file-sourced actions sorted
/// by file name.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    entries: Vec<ActionDescriptor>,
}

impl ActionCatalog {
    /// Catalog holding only the built-in actions.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut builder = CatalogBuilder::default();
        register_builtins(&mut builder)?;
        Ok(builder.finish())
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Catalog position of `name`, used as the deterministic tie-break.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(ActionDescriptor::name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates descriptors; only [`CatalogBuilder::finish`] publishes them.
#[derive(Default)]
struct CatalogBuilder {
    entries: Vec<ActionDescriptor>,
}

impl CatalogBuilder {
    fn register(&mut self, descriptor: ActionDescriptor) -> Result<(), RegistryError> {
        if let Some(existing) = self
            .entries
            .iter()
            .find(|entry| entry.name() == descriptor.name())
        {
            return Err(RegistryError::DuplicateActionName {
                name: descriptor.name().to_string(),
                first: existing.origin().clone(),
                second: descriptor.origin().clone(),
            });
        }
        debug!(action = descriptor.name(), origin = %descriptor.origin(), "Registered action");
        self.entries.push(descriptor);
        Ok(())
    }

    fn finish(self) -> ActionCatalog {
        ActionCatalog {
            entries: self.entries,
        }
    }
}

/// Builds the action catalog for `config`.
///
/// Registration is all-or-nothing: any sandbox, contract or naming failure
/// aborts the whole call and no partial catalog is returned.
pub fn discover(config: &Config) -> Result<ActionCatalog, RegistryError> {
    let mut builder = CatalogBuilder::default();
    register_builtins(&mut builder)?;

    let actions_dir = sandbox::resolve(&config.home, &config.actions_dir)?;
    let files = list_action_files(&actions_dir)?;
    for path in &files {
        sandbox::ensure_not_symlink(path)?;
        let contents = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        builder.register(parse_manifest(path, &contents)?)?;
    }

    let catalog = builder.finish();
    info!(
        actions = catalog.len(),
        from_files = files.len(),
        actions_dir = %actions_dir.display(),
        "Action discovery complete"
    );
    Ok(catalog)
}

fn register_builtins(builder: &mut CatalogBuilder) -> Result<(), RegistryError> {
    for spec in BUILTIN_ACTIONS {
        if !is_valid_identifier(spec.name) {
            return Err(RegistryError::InvalidBuiltin {
                name: spec.name,
                message: "name is not a valid identifier".to_string(),
            });
        }
        if let Some(cost) = spec.cost_hint {
            if !cost.is_finite() || cost < 0.0 {
                return Err(RegistryError::InvalidBuiltin {
                    name: spec.name,
                    message: format!("cost_hint must be finite and >= 0, got {cost}"),
                });
            }
        }
        builder.register(spec.descriptor())?;
    }
    Ok(())
}

/// Candidate action files in `dir`, sorted by file name. A missing directory
/// yields no candidates.
fn list_action_files(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let io_error = |source: io::Error| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let metadata = match fs::symlink_metadata(dir) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(actions_dir = %dir.display(), "Actions directory absent; built-ins only");
            return Ok(Vec::new());
        }
        Err(err) => return Err(io_error(err)),
    };
    if !metadata.is_dir() {
        return Err(RegistryError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.starts_with("__") {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(MANIFEST_EXTENSION) {
            continue;
        }
        // file_type does not follow links, so symlinks stay candidates and are
        // refused later. Pipes, sockets and devices would block on read.
        let file_type = entry.file_type().map_err(io_error)?;
        if !(file_type.is_file() || file_type.is_symlink()) {
            debug!(path = %path.display(), "Skipping non-regular action entry");
            continue;
        }
        candidates.push((name, path));
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error("Duplicate action name: {name} ({first} and {second})")]
    DuplicateActionName {
        name: String,
        first: ActionOrigin,
        second: ActionOrigin,
    },
    #[error("Built-in action {name} is invalid: {message}")]
    InvalidBuiltin { name: &'static str, message: String },
    #[error("Actions path {path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
