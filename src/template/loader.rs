//! Loads group files from disk, following `import` statements.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{CompileReport, ErrorListener, IoMessage, LogListener};
use super::group::TemplateGroup;
use super::group_parser::parse_group;
use crate::error::TempletError;

/// Reads `.stg` files into [`TemplateGroup`]s. Imports are resolved
/// relative to the importing file; a file imported more than once is
/// loaded once and shared.
pub struct GroupLoader {
    listener: Arc<dyn ErrorListener>,
    loaded: HashMap<PathBuf, TemplateGroup>,
    /// Files whose imports are still being loaded.
    in_progress: Vec<PathBuf>,
}

impl Default for GroupLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupLoader {
    pub fn new() -> Self {
        Self::with_listener(Arc::new(LogListener))
    }

    /// Every group this loader creates reports to `listener`.
    pub fn with_listener(listener: Arc<dyn ErrorListener>) -> Self {
        Self {
            listener,
            loaded: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    pub fn load_file(&mut self, path: &Path) -> Result<TemplateGroup, TempletError> {
        let canonical = path.canonicalize().map_err(|e| self.io_error(path, e))?;
        if let Some(group) = self.loaded.get(&canonical) {
            return Ok(group.clone());
        }
        let text = std::fs::read_to_string(&canonical).map_err(|e| self.io_error(path, e))?;
        let name = path
            .file_stem()
            .map_or_else(|| "group".to_string(), |s| s.to_string_lossy().into_owned());
        let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

        self.in_progress.push(canonical.clone());
        let result = self.load_text(&name, &path.display().to_string(), &text, &base);
        self.in_progress.pop();

        let group = result?;
        self.loaded.insert(canonical, group.clone());
        Ok(group)
    }

    /// Load group text that didn't come from a file. Imports resolve
    /// against the current directory.
    pub fn load_str(&mut self, name: &str, text: &str) -> Result<TemplateGroup, TempletError> {
        self.load_text(name, name, text, Path::new("."))
    }

    fn load_text(&mut self, name: &str, source_name: &str, text: &str, base: &Path) -> Result<TemplateGroup, TempletError> {
        let (file, errors) = parse_group(text);
        for e in errors {
            self.listener.compile_time_error(&CompileReport {
                source_name: source_name.to_string(),
                line: e.line,
                col: e.col,
                error: e.error,
            });
        }

        let group = TemplateGroup::new(name);
        group.set_listener(Arc::clone(&self.listener));
        for import in &file.imports {
            let path = base.join(&import.path);
            if let Ok(canonical) = path.canonicalize() {
                if self.in_progress.contains(&canonical) {
                    log::warn!("{source_name}:{}: skipping cyclic import of {}", import.line, import.path);
                    continue;
                }
            }
            let imported = self.load_file(&path)?;
            group.import_templates(&imported);
        }

        let failures = group.define_file(&file, source_name);
        log::debug!(
            "loaded group {name} from {source_name}: {} templates, {failures} errors",
            group.template_names().len()
        );
        Ok(group)
    }

    fn io_error(&self, path: &Path, error: std::io::Error) -> TempletError {
        self.listener.io_error(&IoMessage {
            path: path.display().to_string(),
            message: error.to_string(),
        });
        TempletError::Io(error)
    }
}

/// Load a group file with the default listener.
pub fn load_group_file(path: impl AsRef<Path>) -> Result<TemplateGroup, TempletError> {
    GroupLoader::new().load_file(path.as_ref())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::template::error::{ErrorBuffer, TemplateMessage};

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn imports_resolve_relative_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        write(&dir.path().join("lib"), "base.stg", "a() ::= \"<b()>\"\nb() ::= \"base\"\n");
        let top = write(dir.path(), "top.stg", "import \"lib/base.stg\"\nb() ::= \"top\"\n");

        let group = load_group_file(&top).unwrap();
        assert_eq!(group.name(), "top");
        assert_eq!(group.imports().len(), 1);
        assert_eq!(group.instance_of("a").unwrap().render().unwrap(), "top");
    }

    #[test]
    fn shared_import_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "common.stg", "c() ::= \"c\"\n");
        write(dir.path(), "left.stg", "import \"common.stg\"\n");
        write(dir.path(), "right.stg", "import \"common.stg\"\n");
        let top = write(dir.path(), "top.stg", "import \"left.stg\"\nimport \"right.stg\"\n");

        let group = load_group_file(&top).unwrap();
        let imports = group.imports();
        let left = imports[0].imports();
        let right = imports[1].imports();
        assert!(left[0].ptr_eq(&right[0]));
    }

    #[test]
    fn cyclic_imports_terminate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.stg", "import \"b.stg\"\na() ::= \"A<b()>\"\n");
        let b = write(dir.path(), "b.stg", "import \"a.stg\"\nb() ::= \"B\"\n");

        let group = load_group_file(&b).unwrap();
        assert_eq!(group.instance_of("a").unwrap().render().unwrap(), "AB");
    }

    #[test]
    fn missing_file_is_reported_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(ErrorBuffer::new());
        let mut loader = GroupLoader::with_listener(errors.clone());
        let result = loader.load_file(&dir.path().join("nope.stg"));
        assert!(matches!(result, Err(TempletError::Io(_))));
        assert!(matches!(&errors.messages()[0], TemplateMessage::Io(m) if m.path.ends_with("nope.stg")));
    }

    #[test]
    fn missing_import_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let top = write(dir.path(), "top.stg", "import \"gone.stg\"\n");
        let mut loader = GroupLoader::with_listener(Arc::new(ErrorBuffer::new()));
        assert!(matches!(loader.load_file(&top), Err(TempletError::Io(_))));
    }

    #[test]
    fn syntax_errors_are_positioned_in_the_file() {
        let errors = Arc::new(ErrorBuffer::new());
        let mut loader = GroupLoader::with_listener(errors.clone());
        let group = loader.load_str("g", "ok() ::= \"fine\"\nbad() ::= \"<if(x)>\"\n").unwrap();
        assert_eq!(group.instance_of("ok").unwrap().render().unwrap(), "fine");
        let report = errors.to_string();
        assert!(report.starts_with("g 2:"), "{report}");
        assert!(group.is_defined("bad"));
    }
}
