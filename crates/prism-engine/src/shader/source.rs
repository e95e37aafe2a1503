use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EffectError, Result};

use super::builtin;

/// Resolves shader names to WGSL source.
///
/// Lookup order: registered sources (the built-ins are pre-registered by
/// [`ShaderLibrary::new`]), then each search directory in insertion order,
/// trying `<dir>/<name>` and `<dir>/<name>.wgsl`.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    sources: HashMap<String, Cow<'static, str>>,
    search_dirs: Vec<PathBuf>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    pub fn new() -> Self {
        let sources = builtin::ALL
            .iter()
            .map(|(name, src)| ((*name).to_owned(), Cow::Borrowed(*src)))
            .collect();
        Self {
            sources,
            search_dirs: Vec::new(),
        }
    }

    /// Library without the built-ins.
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
            search_dirs: Vec::new(),
        }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.add_search_dir(dir);
        self
    }

    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.push(dir.into());
    }

    /// Registers (or replaces) an in-memory source.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<Cow<'static, str>>) {
        self.sources.insert(name.into(), source.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name) || self.find_file(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> Result<Cow<'static, str>> {
        if let Some(src) = self.sources.get(name) {
            return Ok(src.clone());
        }

        let Some(path) = self.find_file(name) else {
            return Err(EffectError::SourceNotFound(name.to_owned()));
        };

        log::debug!("loading shader `{name}` from {}", path.display());
        fs::read_to_string(&path)
            .map(Cow::Owned)
            .map_err(|e| EffectError::Other(anyhow::Error::new(e).context(format!("reading {}", path.display()))))
    }

    fn find_file(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs.iter().find_map(|dir| candidate(dir, name))
    }
}

fn candidate(dir: &Path, name: &str) -> Option<PathBuf> {
    [dir.join(name), dir.join(format!("{name}.wgsl"))]
        .into_iter()
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preregistered() {
        let lib = ShaderLibrary::new();
        assert!(lib.resolve("passthrough.frag").unwrap().contains("fs_main"));
        assert!(lib.contains("blur.frag"));
    }

    #[test]
    fn unknown_name_is_source_not_found() {
        let err = ShaderLibrary::empty().resolve("missing.frag").unwrap_err();
        assert!(matches!(err, EffectError::SourceNotFound(name) if name == "missing.frag"));
    }

    #[test]
    fn registered_source_overrides_builtin() {
        let mut lib = ShaderLibrary::new();
        lib.register("passthrough.frag", "// custom");
        assert_eq!(lib.resolve("passthrough.frag").unwrap(), "// custom");
    }

    #[test]
    fn search_dir_resolves_with_and_without_extension() {
        let dir = std::env::temp_dir().join(format!("prism-shader-lib-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tint.frag.wgsl"), "// tint").unwrap();

        let lib = ShaderLibrary::empty().with_search_dir(&dir);
        assert_eq!(lib.resolve("tint.frag").unwrap(), "// tint");
        assert_eq!(lib.resolve("tint.frag.wgsl").unwrap(), "// tint");

        fs::remove_dir_all(&dir).unwrap();
    }
}
