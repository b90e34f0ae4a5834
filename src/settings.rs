use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TempletError;

/// Per-render configuration. Also the on-disk `settings.json` format read by
/// the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RenderSettings {
    /// Column at which `wrap` options break lines. None disables wrapping.
    pub line_width: Option<usize>,
    /// Passed through to attribute renderers.
    pub locale: String,
    /// Text written for every newline in template output.
    pub newline: String,
    /// Log every executed instruction at `trace` level.
    pub trace: bool,
    /// Deepest template nesting allowed before the render aborts.
    pub max_depth: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 256;

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            line_width: None,
            locale: "en".to_string(),
            newline: "\n".to_string(),
            trace: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RenderSettings {
    pub fn with_line_width(mut self, width: usize) -> Self {
        self.line_width = Some(width);
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        locale.clone_into(&mut self.locale);
        self
    }
}

// ── Persistence ─────────────────────────────────────────────────────

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TempletError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TempletError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

/// Load settings from a JSON file. Missing fields take their defaults.
pub fn load_settings(path: &Path) -> Result<RenderSettings, TempletError> {
    let settings = read_json(path)?;
    log::debug!("loaded render settings from {}", path.display());
    Ok(settings)
}

/// Save settings to a JSON file (write to a sibling temp file, then rename).
pub fn save_settings(path: &Path, settings: &RenderSettings) -> Result<(), TempletError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_json(path, settings)
}

/// JSON schema of the settings file, for editors and the CLI `schema`
/// command.
pub fn settings_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(RenderSettings);
    serde_json::to_value(schema).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RenderSettings::default();
        assert_eq!(s.line_width, None);
        assert_eq!(s.locale, "en");
        assert_eq!(s.newline, "\n");
        assert_eq!(s.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = RenderSettings::default().with_line_width(40).with_locale("fr");
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"line_width": 72}"#).unwrap();
        let s = load_settings(&path).unwrap();
        assert_eq!(s.line_width, Some(72));
        assert_eq!(s.locale, "en");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, TempletError::Io(_)));
    }

    #[test]
    fn schema_lists_fields() {
        let schema = settings_schema();
        let props = schema.get("properties").unwrap();
        assert!(props.get("line_width").is_some());
        assert!(props.get("max_depth").is_some());
    }
}
