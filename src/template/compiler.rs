use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;

use super::ast::*;
use super::builtins::lookup_builtin;
use super::compiled::{prefix_of, ArgDefault, CompiledTemplate, FormalArg, Op, OptionKind};
use super::error::CompileError;
use super::value::Value;

type CResult<T = ()> = Result<T, CompileError>;

/// Compile a parsed template definition. `source` is the text its spans
/// point into. Region stubs, anonymous sub-templates and default-value
/// templates it introduces are returned in `implicit_templates`.
pub fn compile(def: &TemplateDef, source: Arc<str>) -> Result<CompiledTemplate, Vec<CompileError>> {
    let enclosing = match def.region {
        RegionKind::None => def.name.clone(),
        _ => unmangled_region_name(&def.name).map_or_else(|| def.name.clone(), |(t, _)| t.to_string()),
    };
    let mut compiler = Compiler::new(def.name.clone(), template_prefix(def), enclosing, source);
    compiler.region = def.region;
    compiler.declare_args(def.args.as_deref());
    compiler.compile_elements(&def.body);
    let (mut compiled, region_refs, errors) = compiler.finish();
    if !errors.is_empty() {
        return Err(errors);
    }

    let embedded: HashSet<String> = compiled
        .implicit_templates
        .iter()
        .filter(|t| t.region == RegionKind::Embedded)
        .map(|t| t.name.clone())
        .collect();
    let mut stubbed = HashSet::new();
    for name in region_refs {
        if embedded.contains(&name) || !stubbed.insert(name.clone()) {
            continue;
        }
        let mut stub = CompiledTemplate::empty(&name, None);
        stub.prefix.clone_from(&compiled.prefix);
        stub.region = RegionKind::Implicit;
        compiled.implicit_templates.push(Arc::new(stub));
    }
    Ok(compiled)
}

/// Regions resolve relative names in their enclosing template's namespace.
fn template_prefix(def: &TemplateDef) -> String {
    match unmangled_region_name(&def.name) {
        Some((enclosing, _)) if def.region != RegionKind::None => prefix_of(enclosing),
        _ => prefix_of(&def.name),
    }
}

struct Compiler {
    name: String,
    prefix: String,
    /// Named template that owns regions referenced from this body.
    enclosing: String,
    source: Arc<str>,
    /// Top-level definition that anonymous sub-templates are numbered under.
    root: String,
    /// Sub-templates numbered so far under `root`, shared with nested compilers.
    sub_count: usize,
    formal_args: Vec<FormalArg>,
    has_formal_args: bool,
    is_anonymous: bool,
    region: RegionKind,
    ops: Vec<Op>,
    source_map: Vec<Option<Span>>,
    strings: IndexSet<Arc<str>>,
    implicit: Vec<Arc<CompiledTemplate>>,
    region_refs: Vec<String>,
    errors: Vec<CompileError>,
}

impl Compiler {
    fn new(name: String, prefix: String, enclosing: String, source: Arc<str>) -> Self {
        Self {
            root: name.clone(),
            sub_count: 0,
            name,
            prefix,
            enclosing,
            source,
            formal_args: Vec::new(),
            has_formal_args: false,
            is_anonymous: false,
            region: RegionKind::None,
            ops: Vec::new(),
            source_map: Vec::new(),
            strings: IndexSet::new(),
            implicit: Vec::new(),
            region_refs: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn finish(self) -> (CompiledTemplate, Vec<String>, Vec<CompileError>) {
        let num_args_with_defaults = self.formal_args.iter().filter(|a| a.default.is_some()).count();
        let compiled = CompiledTemplate {
            name: self.name,
            prefix: self.prefix,
            formal_args: Arc::new(self.formal_args),
            has_formal_args: self.has_formal_args,
            num_args_with_defaults,
            ops: self.ops,
            strings: self.strings.into_iter().collect(),
            source_map: self.source_map,
            source: self.source,
            is_anonymous: self.is_anonymous,
            region: self.region,
            implicit_templates: self.implicit,
        };
        (compiled, self.region_refs, self.errors)
    }

    /// Compiler for a template nested in this one. Shares the prefix,
    /// region owner and sub-template numbering.
    fn nested(&self, name: String, source: Arc<str>) -> Compiler {
        let mut nested = Compiler::new(name, self.prefix.clone(), self.enclosing.clone(), source);
        nested.root.clone_from(&self.root);
        nested.sub_count = self.sub_count;
        nested
    }

    /// Fold a nested compiler's results into this one.
    fn adopt(&mut self, nested: Compiler) -> Arc<CompiledTemplate> {
        self.sub_count = nested.sub_count;
        let (mut compiled, region_refs, errors) = nested.finish();
        self.implicit.append(&mut compiled.implicit_templates);
        self.region_refs.extend(region_refs);
        self.errors.extend(errors);
        let compiled = Arc::new(compiled);
        self.implicit.push(Arc::clone(&compiled));
        compiled
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn emit(&mut self, op: Op, span: Span) {
        self.ops.push(op);
        self.source_map.push(Some(span));
    }

    fn emit_bare(&mut self, op: Op) {
        self.ops.push(op);
        self.source_map.push(None);
    }

    fn add_string(&mut self, s: &str, span: Span) -> CResult<u16> {
        let (idx, _) = self.strings.insert_full(Arc::from(s));
        u16::try_from(idx).map_err(|_| CompileError::compiler("too many string constants (max 65535)", span))
    }

    fn current_offset(&self, span: Span) -> CResult<u16> {
        u16::try_from(self.ops.len()).map_err(|_| CompileError::compiler("template too large (max 65535 ops)", span))
    }

    fn patch_jumps(&mut self, sites: &[usize], span: Span) -> CResult {
        let target = self.current_offset(span)?;
        for &site in sites {
            if let Some(Op::Br(dest) | Op::BrFalse(dest) | Op::BrTrue(dest)) = self.ops.get_mut(site) {
                *dest = target;
            }
        }
        Ok(())
    }

    /// True when `span` begins a source line. Control tags alone on their
    /// line leave no `Newline` element behind, so the text is consulted.
    fn starts_line(&self, span: Span) -> bool {
        span.start == 0 || self.source.get(..span.start).is_some_and(|before| before.ends_with('\n'))
    }

    fn count(n: usize, span: Span) -> CResult<u16> {
        u16::try_from(n).map_err(|_| CompileError::compiler("too many arguments", span))
    }

    // ── Arguments ──────────────────────────────────────────────────

    fn declare_args(&mut self, args: Option<&[ArgDecl]>) {
        let Some(args) = args else {
            return;
        };
        self.has_formal_args = true;
        let mut seen = HashSet::new();
        for decl in args {
            if !seen.insert(decl.name.as_str()) {
                self.errors.push(CompileError::group(
                    format!("redefinition of parameter {}", decl.name),
                    decl.span,
                ));
                continue;
            }
            let mut arg = FormalArg::new(decl.name.clone(), self.formal_args.len());
            arg.default = decl.default.as_ref().map(|d| self.compile_default(&decl.name, d));
            self.formal_args.push(arg);
        }
    }

    fn compile_default(&mut self, arg: &str, decl: &DefaultDecl) -> ArgDefault {
        match decl {
            DefaultDecl::Str(s) => ArgDefault::Literal(Value::str(s)),
            DefaultDecl::Bool(b) => ArgDefault::Literal(Value::Bool(*b)),
            DefaultDecl::EmptyList => ArgDefault::Literal(Value::list(Vec::new())),
            DefaultDecl::Template { body, source, eval_early } => {
                let mut nested = self.nested(format!("{}_{arg}_default", self.name), Arc::from(source.as_str()));
                nested.is_anonymous = true;
                nested.compile_elements(body);
                let compiled = self.adopt(nested);
                ArgDefault::Template { compiled, eval_early: *eval_early }
            }
        }
    }

    fn formal_slot(&self, name: &str) -> Option<u16> {
        if !self.has_formal_args {
            return None;
        }
        self.formal_args
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| u16::try_from(a.index).ok())
    }

    // ── Elements ───────────────────────────────────────────────────

    fn compile_elements(&mut self, elements: &[Element]) {
        for (i, element) in elements.iter().enumerate() {
            let result = match &element.kind {
                ElementKind::Newline => {
                    let prev = i.checked_sub(1).and_then(|p| elements.get(p));
                    let lone_expr = prev.is_some_and(is_expr)
                        && (i == 1
                            || elements.get(i.wrapping_sub(2)).is_some_and(|e| e.kind == ElementKind::Newline)
                            || prev.is_some_and(|e| self.starts_line(e.span)));
                    self.emit(if lone_expr { Op::NewlineIfWrote } else { Op::Newline }, element.span);
                    Ok(())
                }
                _ => self.compile_element(element),
            };
            if let Err(e) = result {
                self.errors.push(e);
            }
        }
    }

    fn compile_element(&mut self, element: &Element) -> CResult {
        let span = element.span;
        match &element.kind {
            ElementKind::Text(text) => {
                if !text.is_empty() {
                    let idx = self.add_string(text, span)?;
                    self.emit(Op::WriteStr(idx), span);
                }
                Ok(())
            }
            ElementKind::Newline => {
                self.emit(Op::Newline, span);
                Ok(())
            }
            ElementKind::Indented { indent, element } => {
                let idx = self.add_string(indent, span)?;
                self.emit(Op::Indent(idx), span);
                self.compile_element(element)?;
                self.emit_bare(Op::Dedent);
                Ok(())
            }
            ElementKind::Expr(tag) => self.compile_expr_tag(tag, span),
            ElementKind::If(chain) => self.compile_if(chain, span),
            ElementKind::Region { name, body } => self.compile_embedded_region(name, body, span),
        }
    }

    fn compile_expr_tag(&mut self, tag: &ExprTag, span: Span) -> CResult {
        self.compile_expr(&tag.expr)?;
        if tag.options.is_empty() {
            self.emit(Op::Write, span);
            return Ok(());
        }
        self.emit(Op::Options, span);
        for opt in &tag.options {
            let kind = OptionKind::from_name(&opt.name)
                .ok_or_else(|| CompileError::compiler(format!("no such option: {}", opt.name), opt.span))?;
            match (&opt.value, kind.default_value()) {
                (Some(value), _) => self.compile_expr(value)?,
                (None, Some(default)) => {
                    let idx = self.add_string(default, opt.span)?;
                    self.emit(Op::LoadStr(idx), opt.span);
                }
                (None, None) => {
                    return Err(CompileError::compiler(
                        format!("value required for option {}", opt.name),
                        opt.span,
                    ));
                }
            }
            self.emit(Op::StoreOption(kind), opt.span);
        }
        self.emit(Op::WriteOpt, span);
        Ok(())
    }

    fn compile_if(&mut self, chain: &IfChain, span: Span) -> CResult {
        let mut end_sites = Vec::new();
        let last = chain.branches.len().saturating_sub(1);
        for (i, (cond, body)) in chain.branches.iter().enumerate() {
            let mut next_sites = Vec::new();
            self.compile_condition(cond, false, &mut next_sites, span)?;
            self.compile_elements(body);
            if i < last || chain.else_body.is_some() {
                end_sites.push(self.ops.len());
                self.emit_bare(Op::Br(0));
            }
            self.patch_jumps(&next_sites, span)?;
        }
        if let Some(body) = &chain.else_body {
            self.compile_elements(body);
        }
        self.patch_jumps(&end_sites, span)
    }

    /// Emit code that branches to the patched sites when `cond` evaluates
    /// to `jump_if`, and falls through otherwise.
    fn compile_condition(&mut self, cond: &Condition, jump_if: bool, sites: &mut Vec<usize>, span: Span) -> CResult {
        match cond {
            Condition::Value(expr) => {
                self.compile_expr(expr)?;
                sites.push(self.ops.len());
                self.emit(if jump_if { Op::BrTrue(0) } else { Op::BrFalse(0) }, expr.span);
                Ok(())
            }
            Condition::Not(inner) => self.compile_condition(inner, !jump_if, sites, span),
            Condition::And(a, b) if !jump_if => {
                self.compile_condition(a, false, sites, span)?;
                self.compile_condition(b, false, sites, span)
            }
            Condition::And(a, b) => {
                let mut skip = Vec::new();
                self.compile_condition(a, false, &mut skip, span)?;
                self.compile_condition(b, true, sites, span)?;
                self.patch_jumps(&skip, span)
            }
            Condition::Or(a, b) if jump_if => {
                self.compile_condition(a, true, sites, span)?;
                self.compile_condition(b, true, sites, span)
            }
            Condition::Or(a, b) => {
                let mut skip = Vec::new();
                self.compile_condition(a, true, &mut skip, span)?;
                self.compile_condition(b, false, sites, span)?;
                self.patch_jumps(&skip, span)
            }
        }
    }

    fn compile_embedded_region(&mut self, name: &str, body: &[Element], span: Span) -> CResult {
        let mangled = mangled_region_name(&self.enclosing, name);
        let mut nested = self.nested(mangled.clone(), Arc::clone(&self.source));
        nested.region = RegionKind::Embedded;
        nested.compile_elements(body);
        self.adopt(nested);
        let idx = self.add_string(&mangled, span)?;
        self.emit(Op::New { name: idx, nargs: 0 }, span);
        self.emit(Op::Write, span);
        Ok(())
    }

    // ── Expressions ────────────────────────────────────────────────

    fn compile_expr(&mut self, expr: &Expr) -> CResult {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Attr(name) => {
                if let Some(slot) = self.formal_slot(name) {
                    self.emit(Op::LoadLocal(slot), span);
                } else {
                    let idx = self.add_string(name, span)?;
                    self.emit(Op::LoadAttr(idx), span);
                }
            }
            ExprKind::Str(s) => {
                let idx = self.add_string(s, span)?;
                self.emit(Op::LoadStr(idx), span);
            }
            ExprKind::Bool(b) => self.emit(if *b { Op::True } else { Op::False }, span),
            ExprKind::Prop { object, name } => {
                self.compile_expr(object)?;
                let idx = self.add_string(name, span)?;
                self.emit(Op::LoadProp(idx), span);
            }
            ExprKind::PropInd { object, name } => {
                self.compile_expr(object)?;
                self.compile_expr(name)?;
                self.emit(Op::LoadPropInd, span);
            }
            ExprKind::Func { name, arg } => {
                let builtin = lookup_builtin(name)
                    .ok_or_else(|| CompileError::compiler(format!("no such function: {name}"), span))?;
                self.compile_expr(arg)?;
                self.emit(builtin.op, span);
            }
            ExprKind::Include { name, args } => self.compile_include(name, args, false, span)?,
            ExprKind::SuperInclude { name, args } => self.compile_include(name, args, true, span)?,
            ExprKind::IncludeInd { name, args } => {
                self.compile_expr(name)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let nargs = Self::count(args.len(), span)?;
                self.emit(Op::NewInd { nargs }, span);
            }
            ExprKind::Region { name, is_super } => {
                let mangled = mangled_region_name(&self.enclosing, name);
                let idx = self.add_string(&mangled, span)?;
                if *is_super {
                    self.emit(Op::SuperNew { name: idx, nargs: 0 }, span);
                } else {
                    self.region_refs.push(mangled);
                    self.emit(Op::New { name: idx, nargs: 0 }, span);
                }
            }
            ExprKind::Subtemplate(sub) => {
                let compiled = self.compile_subtemplate(sub);
                let idx = self.add_string(&compiled.name, span)?;
                self.emit(Op::New { name: idx, nargs: 0 }, span);
            }
            ExprKind::List(items) => {
                self.emit(Op::List, span);
                for item in items {
                    match item {
                        Some(e) => self.compile_expr(e)?,
                        None => self.emit(Op::Null, span),
                    }
                    self.emit(Op::Add, span);
                }
            }
            ExprKind::ToStr(inner) => {
                self.compile_expr(inner)?;
                self.emit(Op::ToStr, span);
            }
            ExprKind::Map { expr, templates } => {
                self.compile_expr(expr)?;
                for template in templates {
                    self.compile_template_ref(template, 1)?;
                }
                if templates.len() == 1 {
                    self.emit(Op::Map, span);
                } else {
                    let n = Self::count(templates.len(), span)?;
                    self.emit(Op::RotMap(n), span);
                }
            }
            ExprKind::Zip { exprs, template } => {
                for e in exprs {
                    self.compile_expr(e)?;
                }
                self.compile_template_ref(template, exprs.len())?;
                let n = Self::count(exprs.len(), span)?;
                self.emit(Op::ZipMap(n), span);
            }
        }
        Ok(())
    }

    fn compile_include(&mut self, name: &str, args: &Args, is_super: bool, span: Span) -> CResult {
        let idx = self.add_string(name, span)?;
        match args {
            Args::None | Args::Positional(_) => {
                let positional: &[Expr] = match args {
                    Args::Positional(v) => v,
                    _ => &[],
                };
                for arg in positional {
                    self.compile_expr(arg)?;
                }
                let nargs = Self::count(positional.len(), span)?;
                let op = if is_super {
                    Op::SuperNew { name: idx, nargs }
                } else {
                    Op::New { name: idx, nargs }
                };
                self.emit(op, span);
            }
            Args::Named { args, pass_through } => {
                self.emit(Op::Args, span);
                for (arg_name, value) in args {
                    self.compile_expr(value)?;
                    let arg_idx = self.add_string(arg_name, value.span)?;
                    self.emit(Op::StoreArg(arg_idx), value.span);
                }
                if *pass_through {
                    self.emit(Op::PassThrough { name: idx, is_super }, span);
                }
                self.emit(if is_super { Op::SuperNewBoxArgs(idx) } else { Op::NewBoxArgs(idx) }, span);
            }
        }
        Ok(())
    }

    /// Push a template instance for a map or zip target. The first
    /// `num_exprs` arguments are left null for the VM to fill per element.
    fn compile_template_ref(&mut self, template: &TemplateRef, num_exprs: usize) -> CResult {
        let span = template.span();
        match template {
            TemplateRef::Named { name, args, .. } => {
                let idx = self.add_string(name, span)?;
                for _ in 0..num_exprs {
                    self.emit(Op::Null, span);
                }
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let nargs = Self::count(num_exprs + args.len(), span)?;
                self.emit(Op::New { name: idx, nargs }, span);
            }
            TemplateRef::Anonymous(sub) => {
                let declared = sub.args.as_ref().map_or(0, Vec::len);
                let implicit_it = sub.args.is_none() && num_exprs == 1;
                if declared != num_exprs && !implicit_it {
                    return Err(CompileError::compiler(
                        format!("anonymous template has {declared} arg(s) but mapped across {num_exprs} value(s)"),
                        span,
                    ));
                }
                let compiled = self.compile_subtemplate(sub);
                let idx = self.add_string(&compiled.name, span)?;
                for _ in 0..num_exprs {
                    self.emit(Op::Null, span);
                }
                let nargs = Self::count(num_exprs, span)?;
                self.emit(Op::New { name: idx, nargs }, span);
            }
            TemplateRef::Indirect { name, args, .. } => {
                self.compile_expr(name)?;
                for _ in 0..num_exprs {
                    self.emit(Op::Null, span);
                }
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let nargs = Self::count(num_exprs + args.len(), span)?;
                self.emit(Op::NewInd { nargs }, span);
            }
        }
        Ok(())
    }

    fn compile_subtemplate(&mut self, sub: &Subtemplate) -> Arc<CompiledTemplate> {
        self.sub_count += 1;
        let mut nested = self.nested(format!("{}_sub{}", self.root, self.sub_count), Arc::clone(&self.source));
        nested.is_anonymous = true;
        if let Some(args) = &sub.args {
            let decls: Vec<ArgDecl> = args
                .iter()
                .map(|name| ArgDecl { name: name.clone(), default: None, span: sub.span })
                .collect();
            nested.declare_args(Some(&decls));
        }
        nested.compile_elements(&sub.body);
        self.adopt(nested)
    }
}

fn is_expr(element: &Element) -> bool {
    match &element.kind {
        ElementKind::Expr(_) => true,
        ElementKind::Indented { element, .. } => matches!(element.kind, ElementKind::Expr(_)),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::template::lexer::Delimiters;
    use crate::template::parser::parse_template;

    fn compile_src(name: &str, args: Option<&[&str]>, src: &str) -> CompiledTemplate {
        let def = TemplateDef {
            name: name.to_string(),
            args: args.map(|a| {
                a.iter()
                    .map(|n| ArgDecl { name: (*n).to_string(), default: None, span: Span::default() })
                    .collect()
            }),
            body: parse_template(src, Delimiters::default()).unwrap(),
            region: RegionKind::None,
        };
        compile(&def, Arc::from(src)).unwrap()
    }

    fn compile_err(src: &str) -> Vec<CompileError> {
        let def = TemplateDef {
            name: "/t".into(),
            args: None,
            body: parse_template(src, Delimiters::default()).unwrap(),
            region: RegionKind::None,
        };
        compile(&def, Arc::from(src)).unwrap_err()
    }

    #[test]
    fn text_and_attribute() {
        let t = compile_src("/t", None, "hi <name>!");
        assert_eq!(t.ops, vec![Op::WriteStr(0), Op::LoadAttr(1), Op::Write, Op::WriteStr(2)]);
        assert_eq!(t.string(1).map(AsRef::as_ref), Some("name"));
        assert_eq!(t.source_text(1), Some("name"));
    }

    #[test]
    fn string_constants_are_shared() {
        let t = compile_src("/t", None, "<a><a>");
        assert_eq!(t.strings.len(), 1);
    }

    #[test]
    fn declared_args_load_by_slot() {
        let t = compile_src("/t", Some(&["x", "y"]), "<y><z>");
        assert_eq!(t.ops[0], Op::LoadLocal(1));
        assert!(matches!(t.ops[2], Op::LoadAttr(_)));
        assert!(t.has_formal_args);
    }

    #[test]
    fn lone_expression_newline_is_conditional() {
        let t = compile_src("/t", None, "a\n<x>\nb<y>\n");
        let newlines: Vec<Op> = t.ops.iter().copied().filter(|op| matches!(op, Op::Newline | Op::NewlineIfWrote)).collect();
        assert_eq!(newlines, vec![Op::Newline, Op::NewlineIfWrote, Op::Newline]);
    }

    #[test]
    fn expression_after_a_lone_control_tag_is_still_alone() {
        let t = compile_src("/t", None, "<if(x)>\nfoo\n<endif>\n<y>\nend");
        let newlines: Vec<Op> = t.ops.iter().copied().filter(|op| matches!(op, Op::Newline | Op::NewlineIfWrote)).collect();
        assert_eq!(newlines, vec![Op::Newline, Op::NewlineIfWrote]);
    }

    #[test]
    fn indented_expression_is_bracketed() {
        let t = compile_src("/t", None, "  <x>");
        assert!(matches!(t.ops[0], Op::Indent(_)));
        assert_eq!(t.ops.last(), Some(&Op::Dedent));
    }

    #[test]
    fn if_else_branches_are_patched() {
        let t = compile_src("/t", None, "<if(a)>x<elseif(b)>y<else>z<endif>");
        let targets: Vec<u16> = t
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Br(d) | Op::BrFalse(d) | Op::BrTrue(d) => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(targets.len(), 4);
        assert!(targets.iter().all(|&d| usize::from(d) <= t.ops.len()));
        assert!(targets.iter().all(|&d| d != 0));
    }

    #[test]
    fn short_circuit_conditions() {
        let t = compile_src("/t", None, "<if(a||!b&&c)>x<endif>");
        assert!(t.ops.iter().any(|op| matches!(op, Op::BrTrue(_))));
        assert!(t.ops.iter().any(|op| matches!(op, Op::BrFalse(_))));
    }

    #[test]
    fn options_with_defaults() {
        let t = compile_src("/t", None, "<xs; separator=\", \", wrap, anchor>");
        assert!(t.ops.contains(&Op::StoreOption(OptionKind::Separator)));
        assert!(t.ops.contains(&Op::StoreOption(OptionKind::Wrap)));
        assert!(t.strings.iter().any(|s| s.as_ref() == "\n"));
        assert!(t.strings.iter().any(|s| s.as_ref() == "true"));
        assert_eq!(t.ops.last(), Some(&Op::WriteOpt));
    }

    #[test]
    fn bad_options_are_errors() {
        assert!(compile_err("<x; bogus>")[0].message.contains("no such option: bogus"));
        assert!(compile_err("<x; separator>")[0].message.contains("value required"));
    }

    #[test]
    fn sub_template_names_are_numbered_per_definition() {
        let src = "<xs:{x | <x:{y | <y>}>}><@r><ys:{z | <z>}><@end>";
        let first = compile_src("/t", None, src);
        let again = compile_src("/t", None, src);
        let names: Vec<&str> = first.implicit_templates.iter().map(|t| t.name.as_str()).collect();
        let again: Vec<&str> = again.implicit_templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, again);
        for n in ["/t_sub1", "/t_sub2", "/t_sub3", "/region__/t__r"] {
            assert!(names.contains(&n), "{names:?}");
        }
    }

    #[test]
    fn map_over_named_and_anonymous_templates() {
        let t = compile_src("/t", None, "<xs:row(y)><xs:{x | <x>}>");
        assert!(t.ops.contains(&Op::Map));
        assert_eq!(t.implicit_templates.len(), 1);
        let anon = &t.implicit_templates[0];
        assert!(anon.is_anonymous && anon.has_formal_args);
        assert_eq!(anon.name, "/t_sub1");
        let news: Vec<u16> = t
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::New { nargs, .. } => Some(*nargs),
                _ => None,
            })
            .collect();
        assert_eq!(news, vec![2, 1]);
    }

    #[test]
    fn rotation_and_zip() {
        let t = compile_src("/t", None, "<xs:a(),b()><xs,ys:{x,y|<x><y>}>");
        assert!(t.ops.contains(&Op::RotMap(2)));
        assert!(t.ops.contains(&Op::ZipMap(2)));
    }

    #[test]
    fn anonymous_arity_mismatch() {
        assert!(compile_err("<xs,ys:{x|<x>}>")[0].message.contains("mapped across 2"));
    }

    #[test]
    fn named_args_with_pass_through() {
        let t = compile_src("/t", None, "<u(a=x, ...)>");
        assert_eq!(t.ops[0], Op::Args);
        assert!(matches!(t.ops[2], Op::StoreArg(_)));
        assert!(matches!(t.ops[3], Op::PassThrough { is_super: false, .. }));
        assert!(matches!(t.ops[4], Op::NewBoxArgs(_)));
    }

    #[test]
    fn regions_define_stubs_once() {
        let t = compile_src("/page", None, "<@head()><@head()><@body>B<@end>");
        let names: Vec<(&str, RegionKind)> =
            t.implicit_templates.iter().map(|c| (c.name.as_str(), c.region)).collect();
        assert_eq!(
            names,
            vec![("/region__/page__body", RegionKind::Embedded), ("/region__/page__head", RegionKind::Implicit)]
        );
    }

    #[test]
    fn default_templates_compile_separately() {
        let src = "<x>";
        let def = TemplateDef {
            name: "/t".into(),
            args: Some(vec![ArgDecl {
                name: "x".into(),
                default: Some(DefaultDecl::Template {
                    body: parse_template("<y>!", Delimiters::default()).unwrap(),
                    source: "<y>!".into(),
                    eval_early: false,
                }),
                span: Span::default(),
            }]),
            body: parse_template(src, Delimiters::default()).unwrap(),
            region: RegionKind::None,
        };
        let t = compile(&def, Arc::from(src)).unwrap();
        assert_eq!(t.num_args_with_defaults, 1);
        let Some(ArgDefault::Template { compiled, .. }) = &t.formal_args[0].default else {
            panic!("expected template default")
        };
        assert_eq!(compiled.name, "/t_x_default");
        assert!(compiled.is_transparent());
        assert_eq!(compiled.source_text(0), Some("y"));
    }

    #[test]
    fn list_literal_keeps_omitted_elements() {
        let t = compile_src("/t", None, "<[a,,b]>");
        assert_eq!(t.ops.iter().filter(|op| **op == Op::Add).count(), 3);
        assert!(t.ops.contains(&Op::Null));
    }
}
