use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::compiled::{CompiledTemplate, FormalArg};
use super::group::TemplateGroup;
use super::value::Value;
use super::vm;
use super::writer::{AutoIndentWriter, TemplateWriter};
use crate::error::TempletError;
use crate::settings::RenderSettings;

/// An instance of a compiled template with its own attribute values.
///
/// Cloning is cheap: the compiled code and argument table are shared. The
/// argument table is copied the first time `add` introduces a name the
/// template didn't declare, so the compiled template itself is never
/// modified.
#[derive(Clone)]
pub struct Template {
    pub(crate) compiled: Arc<CompiledTemplate>,
    pub(crate) formal_args: Arc<Vec<FormalArg>>,
    /// Indexed by `FormalArg::index`. `None` is "never set", which renders
    /// as nothing without an error.
    pub(crate) slots: Vec<Option<Value>>,
    /// Group that defines the template.
    pub(crate) native: TemplateGroup,
    /// Group the outermost instance was created from; unqualified calls
    /// resolve here first.
    pub(crate) creator: TemplateGroup,
    /// One-based position when created by a map over a collection.
    pub(crate) iteration: Option<usize>,
}

impl Template {
    pub fn new(compiled: Arc<CompiledTemplate>, native: TemplateGroup, creator: TemplateGroup) -> Self {
        let formal_args = Arc::clone(&compiled.formal_args);
        Self {
            slots: vec![None; formal_args.len()],
            compiled,
            formal_args,
            native,
            creator,
            iteration: None,
        }
    }

    /// Compile `source` as a stand-alone template in a private group. Its
    /// attributes are all added dynamically.
    pub fn from_source(source: &str) -> Result<Self, TempletError> {
        let group = TemplateGroup::new("anonymous");
        let compiled = group.define_template("anonymous", None, source)?;
        Ok(Self::new(compiled, group.clone(), group))
    }

    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }

    pub fn group(&self) -> &TemplateGroup {
        &self.native
    }

    /// Bind `value` to `name`. Adding to a name that already has a value
    /// turns it into a list; list values are appended element-wise.
    ///
    /// Templates with declared arguments reject unknown names; others grow
    /// a new argument.
    pub fn add(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, TempletError> {
        if name.contains('.') || name.is_empty() {
            return Err(TempletError::InvalidAttributeName(name.to_string()));
        }
        let value = value.into();
        let Some(index) = self.formal_index(name) else {
            if self.compiled.has_formal_args {
                return Err(TempletError::NoSuchAttribute(format!("{name} in {}", self.name())));
            }
            self.push_dynamic(name, value);
            return Ok(self);
        };
        let merged = match self.slots.get_mut(index).and_then(Option::take) {
            None => value,
            Some(current) => {
                let mut items = match current {
                    Value::List(items) => Arc::unwrap_or_clone(items),
                    other => vec![other],
                };
                match value {
                    Value::List(more) => items.extend(more.iter().cloned()),
                    other => items.push(other),
                }
                Value::list(items)
            }
        };
        self.set_slot(index, merged);
        Ok(self)
    }

    /// Clear the value of `name`. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) {
        if let Some(index) = self.formal_index(name) {
            if let Some(slot) = self.slots.get_mut(index) {
                *slot = None;
            }
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.formal_index(name).and_then(|i| self.slot(i))
    }

    /// Every argument that currently has a value, in declaration order.
    pub fn attributes(&self) -> IndexMap<String, Value> {
        self.formal_args
            .iter()
            .filter_map(|arg| self.slot(arg.index).map(|v| (arg.name.clone(), v.clone())))
            .collect()
    }

    pub fn render(&self) -> Result<String, TempletError> {
        self.render_with(&RenderSettings::default())
    }

    pub fn render_with(&self, settings: &RenderSettings) -> Result<String, TempletError> {
        let mut out = AutoIndentWriter::new(String::new())
            .with_newline(&settings.newline)
            .with_line_width(settings.line_width);
        self.render_to(&mut out, settings)?;
        Ok(out.into_inner())
    }

    /// Render into `out`, returning the number of characters written.
    pub fn render_to(&self, out: &mut dyn TemplateWriter, settings: &RenderSettings) -> Result<usize, TempletError> {
        vm::render(self, out, settings)
    }

    // ── Slots ──────────────────────────────────────────────────────

    pub(crate) fn formal_index(&self, name: &str) -> Option<usize> {
        self.formal_args.iter().find(|a| a.name == name).map(|a| a.index)
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Declare `name` on this instance only.
    pub(crate) fn push_dynamic(&mut self, name: &str, value: Value) {
        let args = Arc::make_mut(&mut self.formal_args);
        let index = args.len();
        args.push(FormalArg::new(name, index));
        self.set_slot(index, value);
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.compiled.name)
            .field("attributes", &self.attributes())
            .field("group", &self.native.name())
            .finish()
    }
}
