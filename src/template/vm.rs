//! Bytecode interpreter. One [`Interpreter`] per render call; it owns no
//! state shared with other renders.

use std::sync::Arc;

use indexmap::IndexMap;

use super::builtins;
use super::compiled::{ArgDefault, CompiledTemplate, Op, OptionKind};
use super::debug::{DebugListener, InterpEvent};
use super::error::{ErrorListener, RuntimeError, RuntimeMessage};
use super::group::TemplateGroup;
use super::instance::Template;
use super::scope::{Frame, Lookup};
use super::value::Value;
use super::writer::{AutoIndentWriter, TemplateWriter};
use crate::error::TempletError;
use crate::settings::RenderSettings;

/// Operand stack limit for a single template activation.
const MAX_STACK: usize = 1024;

/// Option slots in `OptionKind::index` order.
const OPTION_KINDS: [OptionKind; OptionKind::COUNT] = [
    OptionKind::Anchor,
    OptionKind::Format,
    OptionKind::Null,
    OptionKind::Separator,
    OptionKind::Wrap,
];

type RawOptions = [Option<Value>; OptionKind::COUNT];

enum Operand {
    Value(Value),
    /// Named arguments being collected for a `new_box_args`.
    Args(IndexMap<String, Value>),
    /// Options being collected for the next `write_opt`.
    Options(Box<RawOptions>),
}

/// Write options after evaluation; every value is already text.
#[derive(Debug, Default)]
struct WriteOptions {
    anchor: bool,
    format: Option<String>,
    null: Option<String>,
    separator: Option<String>,
    wrap: Option<String>,
}

/// Render `template` into `out`. Recoverable errors go to the listener of
/// the group the template was created from.
pub fn render(template: &Template, out: &mut dyn TemplateWriter, settings: &RenderSettings) -> Result<usize, TempletError> {
    Interpreter::new(settings, template.creator.listener(), None).exec(out, template, None)
}

/// Like [`render`], reporting interpreter events to `debug`.
pub fn render_debug(
    template: &Template,
    out: &mut dyn TemplateWriter,
    settings: &RenderSettings,
    debug: &mut dyn DebugListener,
) -> Result<usize, TempletError> {
    Interpreter::new(settings, template.creator.listener(), Some(debug)).exec(out, template, None)
}

pub(crate) struct Interpreter<'a> {
    settings: &'a RenderSettings,
    listener: Arc<dyn ErrorListener>,
    debug: Option<&'a mut dyn DebugListener>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        settings: &'a RenderSettings,
        listener: Arc<dyn ErrorListener>,
        debug: Option<&'a mut dyn DebugListener>,
    ) -> Self {
        Self {
            settings,
            listener,
            debug,
            depth: 0,
        }
    }

    /// Execute `template` in a new frame whose caller is `parent`.
    fn exec(&mut self, out: &mut dyn TemplateWriter, template: &Template, parent: Option<&Frame<'_>>) -> Result<usize, TempletError> {
        if self.depth >= self.settings.max_depth {
            let msg = format!(
                "template nesting deeper than {} levels at {}",
                self.settings.max_depth,
                template.name()
            );
            self.listener.internal_error(&msg);
            return Err(TempletError::Internal(msg));
        }
        self.depth += 1;
        let result = self.exec_frame(out, template, parent);
        self.depth -= 1;
        result
    }

    fn exec_frame(&mut self, out: &mut dyn TemplateWriter, template: &Template, parent: Option<&Frame<'_>>) -> Result<usize, TempletError> {
        let filled = self.apply_defaults(template, parent)?;
        let template = filled.as_ref().unwrap_or(template);
        let frame = Frame::new(template, parent);
        let start = out.index();
        self.event(|| InterpEvent::EnterTemplate {
            name: template.name().to_string(),
            depth: frame.depth(),
        });
        let n = self.run(out, &frame)?;
        self.event(|| InterpEvent::ExitTemplate {
            name: template.name().to_string(),
            output: start..out.index(),
        });
        Ok(n)
    }

    #[allow(clippy::too_many_lines)]
    fn run(&mut self, out: &mut dyn TemplateWriter, frame: &Frame<'_>) -> Result<usize, TempletError> {
        let code: &CompiledTemplate = &frame.template.compiled;
        let mut stack: Vec<Operand> = Vec::with_capacity(16);
        let mut n = 0;
        // Characters written since the last newline instruction.
        let mut n_line = 0;
        let mut ip = 0;

        while let Some(&op) = code.ops.get(ip) {
            let at = ip;
            ip += 1;
            if self.settings.trace {
                self.trace(code, at, op, stack.len());
            }
            if stack.len() > MAX_STACK {
                return Err(self.internal(frame, at, "operand stack overflow"));
            }

            match op {
                Op::LoadStr(i) => {
                    let s = self.string(code, i, frame, at)?;
                    stack.push(Operand::Value(Value::Str(s)));
                }
                Op::LoadAttr(i) => {
                    let name = self.string(code, i, frame, at)?;
                    let value = self.load_attr(frame, at, &name);
                    stack.push(Operand::Value(value));
                }
                Op::LoadLocal(slot) => {
                    let value = frame.template.slot(usize::from(slot)).cloned().unwrap_or_default();
                    stack.push(Operand::Value(value));
                }
                Op::LoadProp(i) => {
                    let name = self.string(code, i, frame, at)?;
                    let object = self.pop_value(&mut stack, frame, at)?;
                    let value = self.property(frame, at, &object, &Value::Str(Arc::clone(&name)), &name);
                    stack.push(Operand::Value(value));
                }
                Op::LoadPropInd => {
                    let key = self.pop_value(&mut stack, frame, at)?;
                    let object = self.pop_value(&mut stack, frame, at)?;
                    let value = self.property(frame, at, &object, &key, &key.to_text());
                    stack.push(Operand::Value(value));
                }

                // ── Instantiation ──────────────────────────────────
                Op::New { name, nargs } | Op::SuperNew { name, nargs } => {
                    let args = self.pop_values(&mut stack, usize::from(nargs), frame, at)?;
                    let name = self.string(code, name, frame, at)?;
                    let is_super = matches!(op, Op::SuperNew { .. });
                    let value = match self.instantiate(frame, at, &name, is_super) {
                        Some(mut st) => {
                            self.store_positional(frame, at, &mut st, args);
                            Value::from(st)
                        }
                        None => Value::Null,
                    };
                    stack.push(Operand::Value(value));
                }
                Op::NewInd { nargs } => {
                    let args = self.pop_values(&mut stack, usize::from(nargs), frame, at)?;
                    let name = self.pop_value(&mut stack, frame, at)?.to_text();
                    let value = match self.instantiate(frame, at, &name, false) {
                        Some(mut st) => {
                            self.store_positional(frame, at, &mut st, args);
                            Value::from(st)
                        }
                        None => Value::Null,
                    };
                    stack.push(Operand::Value(value));
                }
                Op::NewBoxArgs(name) | Op::SuperNewBoxArgs(name) => {
                    let args = match stack.pop() {
                        Some(Operand::Args(args)) => args,
                        _ => return Err(self.internal(frame, at, "expected an argument map")),
                    };
                    let name = self.string(code, name, frame, at)?;
                    let is_super = matches!(op, Op::SuperNewBoxArgs(_));
                    let value = match self.instantiate(frame, at, &name, is_super) {
                        Some(mut st) => {
                            self.store_named(frame, at, &mut st, args);
                            Value::from(st)
                        }
                        None => Value::Null,
                    };
                    stack.push(Operand::Value(value));
                }
                Op::Args => stack.push(Operand::Args(IndexMap::new())),
                Op::StoreArg(i) => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let name = self.string(code, i, frame, at)?;
                    match stack.last_mut() {
                        Some(Operand::Args(args)) => {
                            args.insert(name.to_string(), value);
                        }
                        _ => return Err(self.internal(frame, at, "store_arg without an argument map")),
                    }
                }
                Op::PassThrough { name, is_super } => {
                    let name = self.string(code, name, frame, at)?;
                    match stack.last_mut() {
                        Some(Operand::Args(args)) => self.pass_through(frame, at, &name, is_super, args),
                        _ => return Err(self.internal(frame, at, "passthru without an argument map")),
                    }
                }

                // ── Output ─────────────────────────────────────────
                Op::Options => stack.push(Operand::Options(Box::default())),
                Op::StoreOption(kind) => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    match stack.last_mut() {
                        Some(Operand::Options(options)) => {
                            if let Some(slot) = options.get_mut(kind.index()) {
                                *slot = Some(value);
                            }
                        }
                        _ => return Err(self.internal(frame, at, "store_option without options")),
                    }
                }
                Op::Write => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let start = out.index();
                    let w = self.write_object(out, frame, at, &value, None)?;
                    n += w;
                    n_line += w;
                    self.expr_event(frame, at, start, out.index());
                }
                Op::WriteOpt => {
                    let options = match stack.pop() {
                        Some(Operand::Options(options)) => options,
                        _ => return Err(self.internal(frame, at, "expected write options")),
                    };
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let start = out.index();
                    let w = self.write_with_options(out, frame, at, &value, &options)?;
                    n += w;
                    n_line += w;
                    self.expr_event(frame, at, start, out.index());
                }
                Op::WriteStr(i) => {
                    let s = self.string(code, i, frame, at)?;
                    let w = out.write(&s)?;
                    n += w;
                    n_line += w;
                }
                Op::Newline => {
                    n += out.write("\n")?;
                    n_line = 0;
                }
                Op::NewlineIfWrote => {
                    if n_line > 0 {
                        n += out.write("\n")?;
                    }
                    n_line = 0;
                }
                Op::Indent(i) => {
                    let indent = self.string(code, i, frame, at)?;
                    out.push_indentation(&indent);
                    self.event(|| InterpEvent::Indent {
                        template: code.name.clone(),
                        indent: indent.to_string(),
                    });
                }
                Op::Dedent => {
                    out.pop_indentation();
                }

                // ── Mapping ────────────────────────────────────────
                Op::Map => {
                    let prototype = self.pop_value(&mut stack, frame, at)?;
                    let attr = self.pop_value(&mut stack, frame, at)?;
                    let mapped = self.rot_map(frame, at, &attr, vec![prototype]);
                    stack.push(Operand::Value(mapped));
                }
                Op::RotMap(count) => {
                    let prototypes = self.pop_values(&mut stack, usize::from(count), frame, at)?;
                    let attr = self.pop_value(&mut stack, frame, at)?;
                    let mapped = self.rot_map(frame, at, &attr, prototypes);
                    stack.push(Operand::Value(mapped));
                }
                Op::ZipMap(count) => {
                    let prototype = self.pop_value(&mut stack, frame, at)?;
                    let exprs = self.pop_values(&mut stack, usize::from(count), frame, at)?;
                    let mapped = self.zip_map(frame, at, &exprs, &prototype);
                    stack.push(Operand::Value(mapped));
                }

                // ── Control flow ───────────────────────────────────
                Op::Br(addr) => ip = self.branch_target(code, addr, frame, at)?,
                Op::BrFalse(addr) => {
                    if !self.pop_value(&mut stack, frame, at)?.is_truthy() {
                        ip = self.branch_target(code, addr, frame, at)?;
                    }
                }
                Op::BrTrue(addr) => {
                    if self.pop_value(&mut stack, frame, at)?.is_truthy() {
                        ip = self.branch_target(code, addr, frame, at)?;
                    }
                }

                // ── Values ─────────────────────────────────────────
                Op::List => stack.push(Operand::Value(Value::list(Vec::new()))),
                Op::Add => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    match stack.last_mut() {
                        Some(Operand::Value(Value::List(items))) => {
                            let items = Arc::make_mut(items);
                            match value.iterate() {
                                Some(more) => items.extend(more),
                                None => items.push(value),
                            }
                        }
                        _ => return Err(self.internal(frame, at, "add without a list")),
                    }
                }
                Op::ToStr => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let text = if value.is_null() {
                        Value::Null
                    } else {
                        Value::from(self.render_text(&value, frame, at)?)
                    };
                    stack.push(Operand::Value(text));
                }
                Op::Null => stack.push(Operand::Value(Value::Null)),
                Op::True => stack.push(Operand::Value(Value::Bool(true))),
                Op::False => stack.push(Operand::Value(Value::Bool(false))),
                Op::Pop => {
                    self.pop_value(&mut stack, frame, at)?;
                }
                Op::Noop => {}

                // ── Built-ins ──────────────────────────────────────
                Op::First | Op::Last | Op::Rest | Op::Trunc | Op::Strip | Op::Length | Op::Reverse => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let result = match op {
                        Op::First => builtins::first(&value),
                        Op::Last => builtins::last(&value),
                        Op::Rest => builtins::rest(&value),
                        Op::Trunc => builtins::trunc(&value),
                        Op::Strip => builtins::strip(&value),
                        Op::Length => builtins::length(&value),
                        _ => builtins::reverse(&value),
                    };
                    stack.push(Operand::Value(result));
                }
                Op::Trim | Op::Strlen => {
                    let value = self.pop_value(&mut stack, frame, at)?;
                    let result = if op == Op::Trim {
                        builtins::trim(&value)
                    } else {
                        builtins::strlen(&value)
                    };
                    let result = result.unwrap_or_else(|(fallback, error)| {
                        self.report(frame, at, error);
                        fallback
                    });
                    stack.push(Operand::Value(result));
                }
            }
        }
        Ok(n)
    }

    // ── Attributes & properties ────────────────────────────────────

    /// Scope chain first, then the dictionaries of the defining group.
    fn resolve_attr(frame: &Frame<'_>, name: &str) -> Lookup {
        match frame.lookup(name) {
            Lookup::NotFound => frame
                .template
                .native
                .dictionary(name)
                .map_or(Lookup::NotFound, Lookup::Found),
            found => found,
        }
    }

    fn load_attr(&self, frame: &Frame<'_>, ip: usize, name: &str) -> Value {
        match Self::resolve_attr(frame, name) {
            Lookup::Found(value) => value,
            Lookup::Unset => Value::Null,
            Lookup::NotFound => {
                self.report(frame, ip, RuntimeError::NoSuchAttribute(name.to_string()));
                Value::Null
            }
        }
    }

    fn property(&self, frame: &Frame<'_>, ip: usize, object: &Value, key: &Value, name: &str) -> Value {
        let missing = || {
            self.report(
                frame,
                ip,
                RuntimeError::NoSuchProperty(format!("{}.{name}", object.type_name())),
            );
            Value::Null
        };
        if object.is_null() {
            return missing();
        }
        if let Some(adaptor) = frame.template.native.adaptor_for(object) {
            return adaptor.get_property(object, key, name).unwrap_or_else(missing);
        }
        match object {
            Value::Map(map) => match name {
                "keys" => Value::list(map.keys().map(|k| Value::str(k)).collect()),
                "values" => Value::list(map.values().cloned().collect()),
                _ => map.get(name).or_else(|| map.get("default")).cloned().unwrap_or_default(),
            },
            Value::Template(t) => t.attribute(name).cloned().unwrap_or_default(),
            Value::Object(model) => model.property(name).unwrap_or_else(missing),
            _ => missing(),
        }
    }

    // ── Instantiation ──────────────────────────────────────────────

    /// Qualified names to try for `name`, relative to `prefix`.
    fn candidates(name: &str, prefix: &str) -> Vec<String> {
        if name.starts_with('/') {
            return vec![name.to_string()];
        }
        let local = format!("{prefix}{name}");
        let root = format!("/{name}");
        if local == root {
            vec![local]
        } else {
            vec![local, root]
        }
    }

    /// Creator group first so importing groups can override what imported
    /// templates call; then the defining group.
    fn resolve(template: &Template, name: &str, is_super: bool) -> Option<(Arc<CompiledTemplate>, TemplateGroup)> {
        let candidates = Self::candidates(name, &template.compiled.prefix);
        if is_super {
            return candidates.iter().find_map(|c| template.native.lookup_imported(c));
        }
        candidates.iter().find_map(|c| {
            template
                .creator
                .lookup_with_group(c)
                .or_else(|| template.native.lookup_with_group(c))
        })
    }

    fn instantiate(&self, frame: &Frame<'_>, ip: usize, name: &str, is_super: bool) -> Option<Template> {
        let t = frame.template;
        if let Some((compiled, native)) = Self::resolve(t, name, is_super) {
            return Some(Template::new(compiled, native, t.creator.clone()));
        }
        let error = if is_super {
            RuntimeError::NoImportedTemplate(name.to_string())
        } else {
            let qualified = Self::candidates(name, &t.compiled.prefix).into_iter().next();
            RuntimeError::NoSuchTemplate(qualified.unwrap_or_else(|| name.to_string()))
        };
        self.report(frame, ip, error);
        None
    }

    fn store_positional(&self, frame: &Frame<'_>, ip: usize, st: &mut Template, args: Vec<Value>) {
        let nargs = args.len();
        if nargs > 0 && !st.compiled.has_formal_args && st.formal_args.is_empty() {
            st.push_dynamic("it", Value::Null);
        }
        let declared = st.formal_args.len();
        let required = declared.saturating_sub(st.compiled.num_args_with_defaults);
        if nargs < required || nargs > declared {
            self.report(
                frame,
                ip,
                RuntimeError::ArgumentCountMismatch {
                    passed: nargs,
                    template: st.name().to_string(),
                    declared,
                },
            );
        }
        for (index, value) in args.into_iter().take(declared).enumerate() {
            st.set_slot(index, value);
        }
    }

    fn store_named(&self, frame: &Frame<'_>, ip: usize, st: &mut Template, args: IndexMap<String, Value>) {
        let nargs = args.len();
        let mut unknown = false;
        for (name, value) in args {
            if let Some(index) = st.formal_index(&name) {
                st.set_slot(index, value);
            } else if !st.compiled.has_formal_args {
                st.push_dynamic(&name, value);
            } else {
                unknown = true;
                self.report(
                    frame,
                    ip,
                    RuntimeError::NoSuchNamedArgument {
                        name,
                        template: st.name().to_string(),
                    },
                );
            }
        }
        if !st.compiled.has_formal_args {
            return;
        }
        let declared = st.formal_args.len();
        let missing = !unknown
            && st
                .formal_args
                .iter()
                .any(|a| a.default.is_none() && st.slot(a.index).is_none());
        if missing || nargs > declared {
            self.report(
                frame,
                ip,
                RuntimeError::ArgumentCountMismatch {
                    passed: nargs,
                    template: st.name().to_string(),
                    declared,
                },
            );
        }
    }

    /// `...`: fill every argument of the callee the caller didn't bind
    /// from the caller's scope. Arguments with defaults are left alone when
    /// the caller has no value for them.
    fn pass_through(&self, frame: &Frame<'_>, ip: usize, name: &str, is_super: bool, args: &mut IndexMap<String, Value>) {
        // An unknown callee is reported when it is instantiated.
        let Some((callee, _)) = Self::resolve(frame.template, name, is_super) else {
            return;
        };
        for arg in callee.formal_args.iter() {
            if args.contains_key(&arg.name) {
                continue;
            }
            match Self::resolve_attr(frame, &arg.name) {
                Lookup::Found(value) => {
                    args.insert(arg.name.clone(), value);
                }
                Lookup::Unset if arg.default.is_none() => {
                    args.insert(arg.name.clone(), Value::Null);
                }
                Lookup::NotFound if arg.default.is_none() => {
                    self.report(frame, ip, RuntimeError::NoSuchAttributePassThrough(arg.name.clone()));
                    args.insert(arg.name.clone(), Value::Null);
                }
                Lookup::Unset | Lookup::NotFound => {}
            }
        }
    }

    /// Fill in declared defaults for arguments that were never set.
    /// Early-evaluated defaults render in the callee's own frame.
    fn apply_defaults(&mut self, template: &Template, parent: Option<&Frame<'_>>) -> Result<Option<Template>, TempletError> {
        if template.compiled.num_args_with_defaults == 0 {
            return Ok(None);
        }
        let missing: Vec<(usize, ArgDefault)> = template
            .formal_args
            .iter()
            .filter(|a| template.slot(a.index).is_none())
            .filter_map(|a| a.default.clone().map(|d| (a.index, d)))
            .collect();
        if missing.is_empty() {
            return Ok(None);
        }
        let mut filled = template.clone();
        for (index, default) in missing {
            let value = match default {
                ArgDefault::Literal(value) => value,
                ArgDefault::Template { compiled, eval_early } => {
                    let instance = Template::new(compiled, template.native.clone(), template.creator.clone());
                    if eval_early {
                        let frame = Frame::new(&filled, parent);
                        Value::from(self.render_text(&Value::from(instance), &frame, 0)?)
                    } else {
                        Value::from(instance)
                    }
                }
            };
            filled.set_slot(index, value);
        }
        Ok(Some(filled))
    }

    // ── Mapping ────────────────────────────────────────────────────

    /// Bind the mapped element to the template's first argument.
    fn set_first_argument(&self, frame: &Frame<'_>, ip: usize, st: &mut Template, value: Value) {
        if st.formal_args.is_empty() {
            if st.compiled.has_formal_args {
                self.report(
                    frame,
                    ip,
                    RuntimeError::ArgumentCountMismatch {
                        passed: 1,
                        template: st.name().to_string(),
                        declared: 0,
                    },
                );
            } else {
                st.push_dynamic("it", value);
            }
            return;
        }
        st.set_slot(0, value);
    }

    /// Apply the prototypes round-robin to each element of `attr`. Null
    /// elements stay null and don't advance the rotation or `i`.
    fn rot_map(&self, frame: &Frame<'_>, ip: usize, attr: &Value, prototypes: Vec<Value>) -> Value {
        if attr.is_null() {
            return Value::Null;
        }
        let prototypes: Vec<Arc<Template>> = prototypes
            .into_iter()
            .filter_map(|p| match p {
                Value::Template(t) => Some(t),
                _ => None,
            })
            .collect();
        if prototypes.is_empty() {
            return Value::Null;
        }
        let instance = |index: usize, value: Value| {
            let proto = prototypes.get(index % prototypes.len())?;
            let mut st = Template::clone(proto);
            self.set_first_argument(frame, ip, &mut st, value);
            st.iteration = Some(index + 1);
            Some(Value::from(st))
        };
        let Some(items) = attr.iterate() else {
            return instance(0, attr.clone()).unwrap_or_default();
        };
        let mut mapped = Vec::with_capacity(items.len());
        let mut index = 0;
        for item in items {
            if item.is_null() {
                mapped.push(Value::Null);
                continue;
            }
            mapped.push(instance(index, item).unwrap_or_default());
            index += 1;
        }
        Value::list(mapped)
    }

    /// Apply the template position-wise across several collections, up to
    /// the longest one. Shorter inputs contribute null.
    fn zip_map(&self, frame: &Frame<'_>, ip: usize, exprs: &[Value], prototype: &Value) -> Value {
        let Value::Template(proto) = prototype else {
            return Value::Null;
        };
        if exprs.is_empty() {
            return Value::Null;
        }
        if !proto.compiled.has_formal_args {
            self.report(frame, ip, RuntimeError::MissingFormalArguments);
            return Value::Null;
        }
        let sequences: Vec<Vec<Value>> = exprs.iter().map(Value::as_sequence).collect();
        let declared = proto.formal_args.len();
        let unbound_required = proto
            .formal_args
            .iter()
            .skip(sequences.len())
            .any(|a| a.default.is_none() && proto.slot(a.index).is_none());
        if sequences.len() > declared || unbound_required {
            self.report(
                frame,
                ip,
                RuntimeError::MapArgumentCountMismatch {
                    values: sequences.len(),
                    declared,
                },
            );
        }
        let bound = sequences.len().min(declared);
        let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let mut results = Vec::with_capacity(longest);
        for i in 0..longest {
            let mut st = Template::clone(proto);
            st.iteration = Some(i + 1);
            for (a, seq) in sequences.iter().take(bound).enumerate() {
                st.set_slot(a, seq.get(i).cloned().unwrap_or_default());
            }
            results.push(Value::from(st));
        }
        Value::list(results)
    }

    // ── Writing ────────────────────────────────────────────────────

    fn write_with_options(
        &mut self,
        out: &mut dyn TemplateWriter,
        frame: &Frame<'_>,
        ip: usize,
        value: &Value,
        raw: &RawOptions,
    ) -> Result<usize, TempletError> {
        let mut options = WriteOptions {
            anchor: raw
                .get(OptionKind::Anchor.index())
                .and_then(Option::as_ref)
                .is_some_and(Value::is_truthy),
            ..WriteOptions::default()
        };
        for kind in OPTION_KINDS {
            let Some(Some(v)) = raw.get(kind.index()) else {
                continue;
            };
            if v.is_null() {
                continue;
            }
            let text = self.render_text(v, frame, ip)?;
            match kind {
                OptionKind::Anchor => {}
                OptionKind::Format => options.format = Some(text),
                OptionKind::Null => options.null = Some(text),
                OptionKind::Separator => options.separator = Some(text),
                OptionKind::Wrap => options.wrap = Some(text),
            }
        }
        if options.anchor {
            out.push_anchor_point();
        }
        let n = self.write_object(out, frame, ip, value, Some(&options));
        if options.anchor {
            out.pop_anchor_point();
        }
        n
    }

    fn write_object(
        &mut self,
        out: &mut dyn TemplateWriter,
        frame: &Frame<'_>,
        ip: usize,
        value: &Value,
        options: Option<&WriteOptions>,
    ) -> Result<usize, TempletError> {
        match value {
            Value::Null => match options.and_then(|o| o.null.as_deref()) {
                Some(text) => self.write_scalar(out, frame, &Value::str(text), options),
                None => Ok(0),
            },
            Value::Template(st) => self.write_template(out, frame, st, options),
            other => match other.iterate() {
                Some(items) => self.write_iterator(out, frame, ip, items, options),
                None => self.write_scalar(out, frame, other, options),
            },
        }
    }

    fn write_template(
        &mut self,
        out: &mut dyn TemplateWriter,
        frame: &Frame<'_>,
        st: &Template,
        options: Option<&WriteOptions>,
    ) -> Result<usize, TempletError> {
        let mut n = 0;
        // Templates write straight through so their own wraps and anchors
        // see the real column; the outer wrap fires only on a full line.
        if let Some(wrap) = options.and_then(|o| o.wrap.as_deref()) {
            n += out.write_wrap(wrap, 1)?;
        }
        Ok(n + self.exec(out, st, Some(frame))?)
    }

    /// Separator goes between non-null elements. Nulls are skipped unless a
    /// `null` option replaces them.
    fn write_iterator(
        &mut self,
        out: &mut dyn TemplateWriter,
        frame: &Frame<'_>,
        ip: usize,
        items: Vec<Value>,
        options: Option<&WriteOptions>,
    ) -> Result<usize, TempletError> {
        let null_text = options.and_then(|o| o.null.as_deref());
        let separator = options.and_then(|o| o.separator.as_deref());
        let mut n = 0;
        let mut seen_a_value = false;
        for item in items {
            let item = match (item, null_text) {
                (Value::Null, None) => continue,
                (Value::Null, Some(text)) => Value::str(text),
                (item, _) => item,
            };
            if seen_a_value {
                if let Some(sep) = separator {
                    n += out.write_separator(sep)?;
                }
            }
            n += self.write_object(out, frame, ip, &item, options)?;
            seen_a_value = true;
        }
        Ok(n)
    }

    fn write_scalar(
        &mut self,
        out: &mut dyn TemplateWriter,
        frame: &Frame<'_>,
        value: &Value,
        options: Option<&WriteOptions>,
    ) -> Result<usize, TempletError> {
        let format = options.and_then(|o| o.format.as_deref());
        let text = match frame.template.native.renderer_for(value) {
            Some(renderer) => renderer.render(value, format, &self.settings.locale),
            None => value.to_text(),
        };
        let mut n = 0;
        if let Some(wrap) = options.and_then(|o| o.wrap.as_deref()) {
            n += out.write_wrap(wrap, first_line_len(&text))?;
        }
        Ok(n + out.write(&text)?)
    }

    /// Text of `value` as it would be written with no options.
    fn render_text(&mut self, value: &Value, frame: &Frame<'_>, ip: usize) -> Result<String, TempletError> {
        let mut buffer = self.sub_writer();
        self.write_object(&mut buffer, frame, ip, value, None)?;
        Ok(buffer.into_inner())
    }

    fn sub_writer(&self) -> AutoIndentWriter<String> {
        AutoIndentWriter::new(String::new())
            .with_newline(&self.settings.newline)
            .with_line_width(self.settings.line_width)
    }

    // ── Stack helpers ──────────────────────────────────────────────

    fn pop_value(&self, stack: &mut Vec<Operand>, frame: &Frame<'_>, ip: usize) -> Result<Value, TempletError> {
        match stack.pop() {
            Some(Operand::Value(value)) => Ok(value),
            Some(_) => Err(self.internal(frame, ip, "expected a value operand")),
            None => Err(self.internal(frame, ip, "operand stack underflow")),
        }
    }

    fn pop_values(&self, stack: &mut Vec<Operand>, count: usize, frame: &Frame<'_>, ip: usize) -> Result<Vec<Value>, TempletError> {
        let start = stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| self.internal(frame, ip, "operand stack underflow"))?;
        stack
            .split_off(start)
            .into_iter()
            .map(|operand| match operand {
                Operand::Value(value) => Ok(value),
                _ => Err(self.internal(frame, ip, "expected a value operand")),
            })
            .collect()
    }

    fn string(&self, code: &CompiledTemplate, idx: u16, frame: &Frame<'_>, ip: usize) -> Result<Arc<str>, TempletError> {
        code.string(idx)
            .cloned()
            .ok_or_else(|| self.internal(frame, ip, "string operand out of range"))
    }

    fn branch_target(&self, code: &CompiledTemplate, addr: u16, frame: &Frame<'_>, ip: usize) -> Result<usize, TempletError> {
        let target = usize::from(addr);
        if target > code.ops.len() {
            return Err(self.internal(frame, ip, "branch target out of range"));
        }
        Ok(target)
    }

    // ── Diagnostics ────────────────────────────────────────────────

    fn report(&self, frame: &Frame<'_>, ip: usize, error: RuntimeError) {
        let msg = RuntimeMessage {
            error,
            call_stack: frame.call_stack(),
            ip,
            location: frame.template.compiled.location(ip),
        };
        self.listener.run_time_error(&msg);
    }

    fn internal(&self, frame: &Frame<'_>, ip: usize, what: &str) -> TempletError {
        let msg = format!("{what} in {} at {ip}", frame.template.name());
        self.listener.internal_error(&msg);
        TempletError::Internal(msg)
    }

    fn event(&mut self, make: impl FnOnce() -> InterpEvent) {
        if let Some(debug) = self.debug.as_deref_mut() {
            debug.event(make());
        }
    }

    fn expr_event(&mut self, frame: &Frame<'_>, ip: usize, start: usize, end: usize) {
        let code = &frame.template.compiled;
        self.event(|| InterpEvent::EvalExpr {
            template: code.name.clone(),
            ip,
            expr: code.source_text(ip).unwrap_or_default().to_string(),
            output: start..end,
        });
    }

    fn trace(&mut self, code: &CompiledTemplate, ip: usize, op: Op, stack: usize) {
        let text = code.format_op(op);
        log::trace!("{:<24} {ip:04} {text:<32} stack={stack}", code.name);
        self.event(|| InterpEvent::Instruction {
            template: code.name.clone(),
            ip,
            op: text,
            stack,
        });
    }
}

fn first_line_len(text: &str) -> usize {
    text.split('\n').next().map_or(0, |line| line.chars().count())
}
