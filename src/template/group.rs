//! Template registry: named compiled templates, imports, dictionaries and
//! the renderer/adaptor registrations used while rendering.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::adaptor::{AttributeRenderer, ModelAdaptor, TypeKey, TypeRegistry};
use super::ast::{mangled_region_name, qualify, unmangled_region_name, ArgDecl, RegionKind, Span, TemplateDef};
use super::compiled::{CompiledTemplate, FormalArg};
use super::compiler::compile;
use super::error::{offset_to_line_col, CompileError, CompileReport, ErrorListener, LogListener};
use super::group_parser::{DictValue, GroupFile};
use super::instance::Template;
use super::lexer::Delimiters;
use super::parser::parse_template;
use super::value::{Model, Value};
use crate::error::TempletError;
use crate::settings::RenderSettings;

/// A shared, cheaply clonable handle to a template group.
///
/// Lookups consult the group's own definitions first and then its imports
/// in import order. Instances remember the group they were created from so
/// that unqualified calls made inside imported templates resolve against
/// the importing group first.
#[derive(Clone)]
pub struct TemplateGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    name: String,
    templates: RwLock<IndexMap<String, Arc<CompiledTemplate>>>,
    imports: RwLock<Vec<TemplateGroup>>,
    dictionaries: RwLock<IndexMap<String, Arc<Dictionary>>>,
    renderers: RwLock<TypeRegistry<dyn AttributeRenderer>>,
    adaptors: RwLock<TypeRegistry<dyn ModelAdaptor>>,
    listener: RwLock<Arc<dyn ErrorListener>>,
    delimiters: RwLock<Delimiters>,
}

impl fmt::Debug for TemplateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateGroup")
            .field("name", &self.inner.name)
            .field("templates", &self.inner.templates.read().len())
            .field("imports", &self.inner.imports.read().len())
            .finish()
    }
}

// ── Dictionaries ───────────────────────────────────────────────────

/// One value in a group dictionary.
#[derive(Debug, Clone)]
pub enum DictEntry {
    Value(Value),
    /// Evaluates to the key that was looked up.
    Key,
    /// Instantiated each time it is read.
    Template(Arc<CompiledTemplate>),
}

/// A named map defined at group level, e.g.
/// `typeInit ::= ["int":"0", default:"null"]`.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub entries: IndexMap<String, DictEntry>,
    pub default: Option<DictEntry>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.to_string(), DictEntry::Value(value.into()));
        self
    }

    pub fn with_default(mut self, entry: DictEntry) -> Self {
        self.default = Some(entry);
        self
    }
}

/// How a dictionary appears to templates: property reads go to its entries,
/// falling back to the default; iteration yields its keys.
struct DictionaryView {
    name: String,
    dict: Arc<Dictionary>,
    group: TemplateGroup,
}

impl DictionaryView {
    fn materialize(&self, key: &str, entry: &DictEntry) -> Value {
        match entry {
            DictEntry::Value(v) => v.clone(),
            DictEntry::Key => Value::str(key),
            DictEntry::Template(compiled) => Value::from(Template::new(
                Arc::clone(compiled),
                self.group.clone(),
                self.group.clone(),
            )),
        }
    }
}

impl fmt::Debug for DictionaryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dictionary {}", self.name)
    }
}

impl fmt::Display for DictionaryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dict.entries.keys().try_for_each(|k| f.write_str(k))
    }
}

impl Model for DictionaryView {
    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "keys" => Some(Value::list(self.dict.entries.keys().map(|k| Value::str(k)).collect())),
            "values" => Some(Value::list(
                self.dict.entries.iter().map(|(k, e)| self.materialize(k, e)).collect(),
            )),
            _ => match self.dict.entries.get(name) {
                Some(entry) => Some(self.materialize(name, entry)),
                None => Some(
                    self.dict
                        .default
                        .as_ref()
                        .map_or(Value::Null, |entry| self.materialize(name, entry)),
                ),
            },
        }
    }

    fn elements(&self) -> Option<Vec<Value>> {
        Some(self.dict.entries.keys().map(|k| Value::str(k)).collect())
    }

    fn type_name(&self) -> &'static str {
        "dictionary"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ── Group ──────────────────────────────────────────────────────────

impl TemplateGroup {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.to_string(),
                templates: RwLock::new(IndexMap::new()),
                imports: RwLock::new(Vec::new()),
                dictionaries: RwLock::new(IndexMap::new()),
                renderers: RwLock::new(TypeRegistry::default()),
                adaptors: RwLock::new(TypeRegistry::default()),
                listener: RwLock::new(Arc::new(LogListener)),
                delimiters: RwLock::new(Delimiters::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &TemplateGroup) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn delimiters(&self) -> Delimiters {
        *self.inner.delimiters.read()
    }

    pub fn set_delimiters(&self, delimiters: Delimiters) {
        *self.inner.delimiters.write() = delimiters;
    }

    pub fn listener(&self) -> Arc<dyn ErrorListener> {
        Arc::clone(&self.inner.listener.read())
    }

    pub fn set_listener(&self, listener: Arc<dyn ErrorListener>) {
        *self.inner.listener.write() = listener;
    }

    pub fn template_names(&self) -> Vec<String> {
        self.inner.templates.read().keys().cloned().collect()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(&qualify(name)).is_some()
    }

    // ── Definition ─────────────────────────────────────────────────

    /// Compile `source` and register it as `name`. `args` of `None` means
    /// the template takes attributes by dynamic `add`.
    ///
    /// Compile errors go to the listener; the template is then registered
    /// with an empty body and the errors are returned as well.
    pub fn define_template(
        &self,
        name: &str,
        args: Option<&[&str]>,
        source: &str,
    ) -> Result<Arc<CompiledTemplate>, TempletError> {
        let name = qualify(name);
        let decls = args.map(|names| {
            names
                .iter()
                .map(|n| ArgDecl {
                    name: (*n).to_string(),
                    default: None,
                    span: Span::default(),
                })
                .collect::<Vec<_>>()
        });
        let result = parse_template(source, self.delimiters()).and_then(|body| {
            let def = TemplateDef {
                name: name.clone(),
                args: decls.clone(),
                body,
                region: RegionKind::None,
            };
            compile(&def, Arc::from(source))
        });
        match result {
            Ok(compiled) => self.define(compiled).map_err(|e| self.compile_failure(&name, source, vec![e])),
            Err(mut errors) => {
                if let Err(e) = self.define(empty_template(&name, args)) {
                    errors.push(e);
                }
                Err(self.compile_failure(&name, source, errors))
            }
        }
    }

    /// Override region `region` of `template` with `source`.
    pub fn define_region(&self, template: &str, region: &str, source: &str) -> Result<Arc<CompiledTemplate>, TempletError> {
        let name = mangled_region_name(&qualify(template), region);
        let body = parse_template(source, self.delimiters()).map_err(|errors| self.compile_failure(&name, source, errors))?;
        let def = TemplateDef {
            name: name.clone(),
            args: None,
            body,
            region: RegionKind::Explicit,
        };
        let compiled = compile(&def, Arc::from(source)).map_err(|errors| self.compile_failure(&name, source, errors))?;
        self.define(compiled).map_err(|e| self.compile_failure(&name, source, vec![e]))
    }

    /// Register a compiled template and the hidden templates it introduced.
    pub fn define(&self, compiled: CompiledTemplate) -> Result<Arc<CompiledTemplate>, CompileError> {
        if compiled.region == RegionKind::Explicit && self.lookup(&compiled.name).is_none() {
            let (template, region) = unmangled_region_name(&compiled.name).unwrap_or((compiled.name.as_str(), ""));
            return Err(CompileError::group(
                format!("template {template} doesn't have a region called {region}"),
                Span::default(),
            ));
        }
        let compiled = Arc::new(compiled);
        self.raw_define(Arc::clone(&compiled))?;
        for implicit in &compiled.implicit_templates {
            self.raw_define(Arc::clone(implicit))?;
        }
        log::debug!(
            "group {}: defined {} ({} implicit)",
            self.inner.name,
            compiled.name,
            compiled.implicit_templates.len()
        );
        Ok(compiled)
    }

    fn raw_define(&self, compiled: Arc<CompiledTemplate>) -> Result<(), CompileError> {
        let mut templates = self.inner.templates.write();
        if let Some(prev) = templates.get(&compiled.name) {
            let region = unmangled_region_name(&compiled.name).map_or("", |(_, r)| r);
            match (prev.region, compiled.region) {
                (RegionKind::None, _) => {
                    return Err(CompileError::group(
                        format!("redefinition of template {}", compiled.name),
                        Span::default(),
                    ));
                }
                // A stub never displaces a real definition.
                (_, RegionKind::Implicit) => return Ok(()),
                (RegionKind::Embedded, _) => {
                    return Err(CompileError::group(
                        format!("the embedded region {region} can't be redefined"),
                        Span::default(),
                    ));
                }
                (RegionKind::Explicit, _) => {
                    return Err(CompileError::group(
                        format!("redefinition of region {region}"),
                        Span::default(),
                    ));
                }
                (RegionKind::Implicit, _) => {}
            }
        }
        templates.insert(compiled.name.clone(), compiled);
        Ok(())
    }

    fn compile_failure(&self, name: &str, source: &str, errors: Vec<CompileError>) -> TempletError {
        let listener = self.listener();
        let mut messages = Vec::with_capacity(errors.len());
        for error in errors {
            let (line, col) = offset_to_line_col(source, error.span.start);
            let report = CompileReport {
                source_name: name.to_string(),
                line,
                col,
                error,
            };
            messages.push(report.to_string());
            listener.compile_time_error(&report);
        }
        TempletError::Compile(messages.join("; "))
    }

    /// Install the templates and dictionaries of a parsed group file.
    /// Every problem is reported to the listener; the count is returned.
    pub fn define_file(&self, file: &GroupFile, source_name: &str) -> usize {
        let listener = self.listener();
        let mut failures = 0;
        let mut report = |error: CompileError, line: usize, col: usize| {
            failures += 1;
            listener.compile_time_error(&CompileReport {
                source_name: source_name.to_string(),
                line,
                col,
                error,
            });
        };

        self.set_delimiters(file.delimiters);
        for decl in &file.dictionaries {
            let mut dict = Dictionary::new();
            for (key, value) in &decl.entries {
                match self.dict_entry(&decl.name, key, value) {
                    Ok(entry) => {
                        dict.entries.insert(key.clone(), entry);
                    }
                    Err(e) => report(e, decl.line, 1),
                }
            }
            if let Some(value) = &decl.default {
                match self.dict_entry(&decl.name, "default", value) {
                    Ok(entry) => dict.default = Some(entry),
                    Err(e) => report(e, decl.line, 1),
                }
            }
            self.define_dictionary(&decl.name, dict);
        }

        for source in &file.templates {
            let def = &source.def;
            let compiled = match compile(def, Arc::from(source.source.as_str())) {
                Ok(compiled) => compiled,
                Err(errors) => {
                    for e in errors {
                        let (line, col) = source.position(e.span);
                        report(e, line, col);
                    }
                    let names: Option<Vec<&str>> = def
                        .args
                        .as_ref()
                        .map(|args| args.iter().map(|a| a.name.as_str()).collect());
                    let mut empty = empty_template(&def.name, names.as_deref());
                    empty.region = def.region;
                    empty
                }
            };
            if let Err(e) = self.define(compiled) {
                report(e, source.line, source.col);
            }
        }
        failures
    }

    fn dict_entry(&self, dict: &str, key: &str, value: &DictValue) -> Result<DictEntry, CompileError> {
        Ok(match value {
            DictValue::Str(s) => DictEntry::Value(Value::str(s)),
            DictValue::Bool(b) => DictEntry::Value(Value::Bool(*b)),
            DictValue::EmptyList => DictEntry::Value(Value::list(Vec::new())),
            DictValue::Key => DictEntry::Key,
            DictValue::Template(text) => {
                let body = parse_template(text, self.delimiters()).map_err(first_error)?;
                let def = TemplateDef {
                    name: format!("/{dict}_{key}"),
                    args: None,
                    body,
                    region: RegionKind::None,
                };
                DictEntry::Template(Arc::new(compile(&def, Arc::from(text.as_str())).map_err(first_error)?))
            }
        })
    }

    pub fn define_dictionary(&self, name: &str, dict: Dictionary) {
        self.inner.dictionaries.write().insert(name.to_string(), Arc::new(dict));
    }

    /// The dictionary `name` from this group or its imports, as a value
    /// templates can read properties from.
    pub fn dictionary(&self, name: &str) -> Option<Value> {
        self.find_dictionary(name, &mut Vec::new()).map(|(dict, group)| {
            Value::object(DictionaryView {
                name: name.to_string(),
                dict,
                group,
            })
        })
    }

    fn find_dictionary(&self, name: &str, visited: &mut Vec<*const GroupInner>) -> Option<(Arc<Dictionary>, TemplateGroup)> {
        if !self.visit(visited) {
            return None;
        }
        if let Some(dict) = self.inner.dictionaries.read().get(name) {
            return Some((Arc::clone(dict), self.clone()));
        }
        self.imports().iter().find_map(|g| g.find_dictionary(name, visited))
    }

    // ── Imports & lookup ───────────────────────────────────────────

    /// Make `other`'s templates visible through this group. Imports are
    /// searched in the order they were added.
    pub fn import_templates(&self, other: &TemplateGroup) {
        if self.ptr_eq(other) || other.imports_transitively(self) {
            log::warn!("group {}: ignoring cyclic import of {}", self.inner.name, other.inner.name);
            return;
        }
        log::debug!("group {}: importing {}", self.inner.name, other.inner.name);
        self.inner.imports.write().push(other.clone());
    }

    pub fn imports(&self) -> Vec<TemplateGroup> {
        self.inner.imports.read().clone()
    }

    fn imports_transitively(&self, target: &TemplateGroup) -> bool {
        self.imports()
            .iter()
            .any(|g| g.ptr_eq(target) || g.imports_transitively(target))
    }

    fn visit(&self, visited: &mut Vec<*const GroupInner>) -> bool {
        let ptr = Arc::as_ptr(&self.inner);
        if visited.contains(&ptr) {
            return false;
        }
        visited.push(ptr);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.lookup_with_group(name).map(|(t, _)| t)
    }

    /// Find `name` here or in the imports, returning the group that
    /// defines it.
    pub fn lookup_with_group(&self, name: &str) -> Option<(Arc<CompiledTemplate>, TemplateGroup)> {
        self.find(name, &mut Vec::new())
    }

    /// Find `name` in the imports only, skipping this group's own
    /// definition. Used by `super.` calls.
    pub fn lookup_imported(&self, name: &str) -> Option<(Arc<CompiledTemplate>, TemplateGroup)> {
        let mut visited = Vec::new();
        self.visit(&mut visited);
        self.imports().iter().find_map(|g| g.find(name, &mut visited))
    }

    fn find(&self, name: &str, visited: &mut Vec<*const GroupInner>) -> Option<(Arc<CompiledTemplate>, TemplateGroup)> {
        if !self.visit(visited) {
            return None;
        }
        if let Some(t) = self.inner.templates.read().get(name) {
            return Some((Arc::clone(t), self.clone()));
        }
        self.imports().iter().find_map(|g| g.find(name, visited))
    }

    /// A fresh instance of `name`, created from this group.
    pub fn instance_of(&self, name: &str) -> Option<Template> {
        let (compiled, native) = self.lookup_with_group(&qualify(name))?;
        Some(Template::new(compiled, native, self.clone()))
    }

    /// Instantiate `name`, bind `attributes` and render. Attributes the
    /// template doesn't declare are skipped.
    pub fn render(
        &self,
        name: &str,
        attributes: &IndexMap<String, Value>,
        settings: &RenderSettings,
    ) -> Result<String, TempletError> {
        let mut template = self
            .instance_of(name)
            .ok_or_else(|| TempletError::NoSuchTemplate(qualify(name)))?;
        for (key, value) in attributes {
            match template.add(key, value.clone()) {
                Ok(_) => {}
                Err(TempletError::NoSuchAttribute(attr)) => {
                    log::debug!("{}: skipping undeclared attribute {attr}", template.name());
                }
                Err(e) => return Err(e),
            }
        }
        template.render_with(settings)
    }

    // ── Renderers & adaptors ───────────────────────────────────────

    pub fn register_renderer(&self, key: TypeKey, renderer: Arc<dyn AttributeRenderer>) {
        self.inner.renderers.write().register(key, renderer);
    }

    /// Most specific renderer for `value`, checking imports when this
    /// group has none.
    pub fn renderer_for(&self, value: &Value) -> Option<Arc<dyn AttributeRenderer>> {
        if let Some(r) = self.inner.renderers.read().lookup(value) {
            return Some(r);
        }
        self.imports().iter().find_map(|g| g.renderer_for(value))
    }

    pub fn register_adaptor(&self, key: TypeKey, adaptor: Arc<dyn ModelAdaptor>) {
        self.inner.adaptors.write().register(key, adaptor);
    }

    pub fn adaptor_for(&self, value: &Value) -> Option<Arc<dyn ModelAdaptor>> {
        if let Some(a) = self.inner.adaptors.read().lookup(value) {
            return Some(a);
        }
        self.imports().iter().find_map(|g| g.adaptor_for(value))
    }
}

fn empty_template<S: AsRef<str>>(name: &str, args: Option<&[S]>) -> CompiledTemplate {
    let formal_args = args.map(|names| {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| FormalArg::new(n.as_ref(), i))
            .collect()
    });
    CompiledTemplate::empty(name, formal_args)
}

fn first_error(errors: Vec<CompileError>) -> CompileError {
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| CompileError::compiler("compilation failed", Span::default()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::template::error::{ErrorBuffer, TemplateMessage};
    use crate::template::group_parser::parse_group;

    fn buffered(name: &str) -> (TemplateGroup, Arc<ErrorBuffer>) {
        let group = TemplateGroup::new(name);
        let errors = Arc::new(ErrorBuffer::new());
        group.set_listener(errors.clone());
        (group, errors)
    }

    #[test]
    fn define_and_lookup() {
        let group = TemplateGroup::new("g");
        group.define_template("t", Some(&["x"]), "<x>!").unwrap();
        let t = group.lookup("/t").unwrap();
        assert!(t.has_formal_args);
        assert!(group.is_defined("t"));
        assert_eq!(group.template_names(), vec!["/t".to_string()]);
    }

    #[test]
    fn anonymous_subtemplates_are_registered() {
        let group = TemplateGroup::new("g");
        let t = group.define_template("t", Some(&["xs"]), "<xs:{x | <x>}>").unwrap();
        assert_eq!(t.implicit_templates.len(), 1);
        assert!(group.lookup(&t.implicit_templates[0].name).is_some());
    }

    #[test]
    fn redefinition_is_an_error() {
        let (group, errors) = buffered("g");
        group.define_template("t", None, "a").unwrap();
        let err = group.define_template("t", None, "b").unwrap_err();
        assert!(err.to_string().contains("redefinition of template /t"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn syntax_error_defines_empty_template() {
        let (group, errors) = buffered("g");
        assert!(group.define_template("t", Some(&["x"]), "<x").is_err());
        let t = group.lookup("/t").unwrap();
        assert!(t.ops.is_empty());
        assert_eq!(t.formal_args.len(), 1);
        assert!(matches!(errors.messages()[0], TemplateMessage::Compile(_)));
    }

    #[test]
    fn broken_redefinition_reports_both_problems() {
        let (group, errors) = buffered("g");
        group.define_template("t", None, "fine").unwrap();
        let err = group.define_template("t", None, "<x").unwrap_err().to_string();
        assert!(err.contains("redefinition of template /t"), "{err}");
        assert_eq!(errors.len(), 2);
        assert_eq!(group.instance_of("t").unwrap().render().unwrap(), "fine");
    }

    #[test]
    fn lookup_walks_imports_in_order() {
        let base = TemplateGroup::new("base");
        base.define_template("a", None, "base-a").unwrap();
        base.define_template("b", None, "base-b").unwrap();
        let other = TemplateGroup::new("other");
        other.define_template("b", None, "other-b").unwrap();
        let top = TemplateGroup::new("top");
        top.define_template("b", None, "top-b").unwrap();
        top.import_templates(&base);
        top.import_templates(&other);

        let (_, g) = top.lookup_with_group("/a").unwrap();
        assert!(g.ptr_eq(&base));
        let (_, g) = top.lookup_with_group("/b").unwrap();
        assert!(g.ptr_eq(&top));
        let (_, g) = top.lookup_imported("/b").unwrap();
        assert!(g.ptr_eq(&base));
        assert!(top.lookup_imported("/missing").is_none());
    }

    #[test]
    fn cyclic_imports_are_ignored() {
        let a = TemplateGroup::new("a");
        let b = TemplateGroup::new("b");
        a.import_templates(&b);
        b.import_templates(&a);
        a.import_templates(&a);
        assert_eq!(a.imports().len(), 1);
        assert!(b.imports().is_empty());
        assert!(a.lookup("/nothing").is_none());
    }

    #[test]
    fn region_override_rules() {
        let (group, errors) = buffered("g");
        group.define_template("page", None, "[<@body()>]").unwrap();
        assert_eq!(group.lookup("/region__/page__body").unwrap().region, RegionKind::Implicit);

        group.define_region("page", "body", "content").unwrap();
        assert_eq!(group.lookup("/region__/page__body").unwrap().region, RegionKind::Explicit);

        let err = group.define_region("page", "body", "again").unwrap_err();
        assert!(err.to_string().contains("redefinition of region body"));

        let err = group.define_region("page", "footer", "x").unwrap_err();
        assert!(err.to_string().contains("doesn't have a region called footer"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn embedded_region_cannot_be_overridden() {
        let (group, _errors) = buffered("g");
        group.define_template("page", None, "<@body>default<@end>").unwrap();
        let err = group.define_region("page", "body", "x").unwrap_err();
        assert!(err.to_string().contains("embedded region body"));
    }

    #[test]
    fn group_file_dictionaries() {
        let (file, errors) = parse_group(
            r##"
colors ::= ["red":"#f00", "same":key, default:"none"]
"##,
        );
        assert!(errors.is_empty());
        let group = TemplateGroup::new("g");
        assert_eq!(group.define_file(&file, "g.stg"), 0);
        let Some(Value::Object(dict)) = group.dictionary("colors") else {
            unreachable!("dictionary is an object value")
        };
        assert_eq!(dict.property("red"), Some(Value::str("#f00")));
        assert_eq!(dict.property("same"), Some(Value::str("same")));
        assert_eq!(dict.property("blue"), Some(Value::str("none")));
        assert_eq!(dict.elements().unwrap().len(), 2);
    }

    #[test]
    fn group_file_errors_are_positioned() {
        let (file, parse_errors) = parse_group("a() ::= \"x\"\na() ::= \"y\"\n");
        assert!(parse_errors.is_empty());
        let (group, errors) = buffered("g");
        assert_eq!(group.define_file(&file, "g.stg"), 1);
        let TemplateMessage::Compile(report) = &errors.messages()[0] else {
            unreachable!("compile report expected")
        };
        assert_eq!(report.source_name, "g.stg");
        assert_eq!(report.line, 2);
    }
}
