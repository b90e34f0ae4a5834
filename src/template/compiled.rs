use std::fmt::Write as _;
use std::sync::Arc;

use super::ast::{RegionKind, Span};
use super::error::offset_to_line_col;
use super::value::Value;

/// Write options attached to an expression tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Anchor,
    Format,
    Null,
    Separator,
    Wrap,
}

impl OptionKind {
    pub const COUNT: usize = 5;

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "anchor" => Some(Self::Anchor),
            "format" => Some(Self::Format),
            "null" => Some(Self::Null),
            "separator" => Some(Self::Separator),
            "wrap" => Some(Self::Wrap),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Anchor => "anchor",
            Self::Format => "format",
            Self::Null => "null",
            Self::Separator => "separator",
            Self::Wrap => "wrap",
        }
    }

    /// Value used when the option is named without `= value`.
    pub fn default_value(self) -> Option<&'static str> {
        match self {
            Self::Anchor => Some("true"),
            Self::Wrap => Some("\n"),
            Self::Format | Self::Null | Self::Separator => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Bytecode operations for the template VM. `u16` operands index the
/// template's string table unless noted otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Push a string constant.
    LoadStr(u16),
    /// Push an attribute resolved through the scope chain.
    LoadAttr(u16),
    /// Push a declared formal argument of the current template by slot.
    LoadLocal(u16),
    /// Pop object → push `object.name`.
    LoadProp(u16),
    /// Pop name, pop object → push `object.(name)`.
    LoadPropInd,

    // Template instantiation
    /// Pop `nargs` positional values → push a new instance of `name`.
    New { name: u16, nargs: u16 },
    /// Pop `nargs` values, pop a name value → push a new instance.
    NewInd { nargs: u16 },
    /// Pop a named-argument map → push a new instance of `name`.
    NewBoxArgs(u16),
    /// Like `New`, but resolved in the imports of the defining group.
    SuperNew { name: u16, nargs: u16 },
    /// Like `NewBoxArgs`, resolved in the imports of the defining group.
    SuperNewBoxArgs(u16),
    /// Push an empty named-argument map.
    Args,
    /// Pop value, store it under `name` in the argument map below it.
    StoreArg(u16),
    /// Fill the argument map with matching caller attributes for `name`.
    PassThrough { name: u16, is_super: bool },

    // Output
    /// Push an empty options record.
    Options,
    /// Pop value, store it as the given option in the record below it.
    StoreOption(OptionKind),
    /// Pop value → write it.
    Write,
    /// Pop options, pop value → write value with options.
    WriteOpt,
    /// Write a string constant.
    WriteStr(u16),
    /// Write a newline.
    Newline,
    /// Write a newline only if something was written since the last one.
    NewlineIfWrote,
    /// Push an indentation string constant on the writer.
    Indent(u16),
    /// Pop the writer's innermost indentation.
    Dedent,

    // Mapping
    /// Pop template, pop value → push the template applied to each element.
    Map,
    /// Pop `n` templates, pop value → rotate through the templates.
    RotMap(u16),
    /// Pop template, pop `n` values → apply the template position-wise.
    ZipMap(u16),

    // Control flow (operands are instruction addresses)
    Br(u16),
    BrFalse(u16),
    BrTrue(u16),

    // Values
    /// Push an empty list.
    List,
    /// Pop value, append it (flattened one level) to the list below it.
    Add,
    /// Pop value → push its rendered text.
    ToStr,
    Null,
    True,
    False,
    Pop,
    Noop,

    // Built-in functions (pop one value, push result)
    First,
    Last,
    Rest,
    Trunc,
    Strip,
    Trim,
    Length,
    Strlen,
    Reverse,
}

impl Op {
    pub fn string_operand(self) -> Option<u16> {
        match self {
            Op::LoadStr(i)
            | Op::LoadAttr(i)
            | Op::LoadProp(i)
            | Op::NewBoxArgs(i)
            | Op::SuperNewBoxArgs(i)
            | Op::StoreArg(i)
            | Op::WriteStr(i)
            | Op::Indent(i)
            | Op::New { name: i, .. }
            | Op::SuperNew { name: i, .. }
            | Op::PassThrough { name: i, .. } => Some(i),
            _ => None,
        }
    }
}

/// How an omitted argument gets its value.
#[derive(Debug, Clone)]
pub enum ArgDefault {
    /// `={...}`: instantiate the template, or render it right away when
    /// `eval_early` is set.
    Template {
        compiled: Arc<CompiledTemplate>,
        eval_early: bool,
    },
    /// `="text"`, `=true`, `=false`, `=[]`
    Literal(Value),
}

/// A formal argument with its dense slot index.
#[derive(Debug, Clone)]
pub struct FormalArg {
    pub name: String,
    pub index: usize,
    pub default: Option<ArgDefault>,
}

impl FormalArg {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            default: None,
        }
    }
}

/// A compiled template: instructions, constant pool, argument table and
/// source map. Immutable once built; shared behind `Arc`.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// Fully qualified name, always starting with `/`.
    pub name: String,
    /// Namespace used to resolve relative template names, e.g. `/` or `/a/`.
    pub prefix: String,
    pub formal_args: Arc<Vec<FormalArg>>,
    /// False when the template never declared an argument list; such
    /// templates accept attributes by dynamic `add`.
    pub has_formal_args: bool,
    pub num_args_with_defaults: usize,
    pub ops: Vec<Op>,
    pub strings: Vec<Arc<str>>,
    /// Source range per instruction, for diagnostics only.
    pub source_map: Vec<Option<Span>>,
    /// Text the source map points into.
    pub source: Arc<str>,
    pub is_anonymous: bool,
    pub region: RegionKind,
    /// Anonymous sub-templates, default-value templates and region stubs
    /// this template introduced. Registered alongside it.
    pub implicit_templates: Vec<Arc<CompiledTemplate>>,
}

impl CompiledTemplate {
    /// An instruction-free template, used in place of a definition that
    /// failed to compile.
    pub fn empty(name: &str, formal_args: Option<Vec<FormalArg>>) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix_of(name),
            has_formal_args: formal_args.is_some(),
            formal_args: Arc::new(formal_args.unwrap_or_default()),
            num_args_with_defaults: 0,
            ops: Vec::new(),
            strings: Vec::new(),
            source_map: Vec::new(),
            source: Arc::from(""),
            is_anonymous: false,
            region: RegionKind::None,
            implicit_templates: Vec::new(),
        }
    }

    pub fn formal_arg(&self, name: &str) -> Option<&FormalArg> {
        self.formal_args.iter().find(|a| a.name == name)
    }

    pub fn string(&self, idx: u16) -> Option<&Arc<str>> {
        self.strings.get(usize::from(idx))
    }

    pub fn is_region(&self) -> bool {
        self.region != RegionKind::None
    }

    /// Anonymous and region templates see the formal arguments of the
    /// template they are written from.
    pub fn is_transparent(&self) -> bool {
        self.is_anonymous || self.is_region()
    }

    /// `(line, col)` of the source range recorded for instruction `ip`.
    pub fn location(&self, ip: usize) -> Option<(usize, usize)> {
        let span = self.source_map.get(ip).copied().flatten()?;
        Some(offset_to_line_col(&self.source, span.start))
    }

    /// Source text recorded for instruction `ip`.
    pub fn source_text(&self, ip: usize) -> Option<&str> {
        let span = self.source_map.get(ip).copied().flatten()?;
        self.source.get(span.start..span.end)
    }

    /// Human-readable listing of instructions, constants and source ranges.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let args: Vec<&str> = self.formal_args.iter().map(|a| a.name.as_str()).collect();
        if self.has_formal_args {
            let _ = writeln!(out, "{}({}):", self.name, args.join(", "));
        } else {
            let _ = writeln!(out, "{}:", self.name);
        }
        for (ip, op) in self.ops.iter().enumerate() {
            let _ = write!(out, "{ip:04}:\t{}", self.format_op(*op));
            if let Some(span) = self.source_map.get(ip).copied().flatten() {
                let _ = write!(out, "\t{}..{}", span.start, span.end);
            }
            out.push('\n');
        }
        if !self.strings.is_empty() {
            out.push_str("Strings:\n");
            for (i, s) in self.strings.iter().enumerate() {
                let _ = writeln!(out, "{i:04}: {s:?}");
            }
        }
        out
    }

    pub fn format_op(&self, op: Op) -> String {
        let s = |i: u16| {
            self.string(i)
                .map_or_else(|| format!("#{i}"), |v| format!("#{i}:{v:?}"))
        };
        match op {
            Op::New { name, nargs } => format!("new {} {nargs}", s(name)),
            Op::SuperNew { name, nargs } => format!("super_new {} {nargs}", s(name)),
            Op::NewInd { nargs } => format!("new_ind {nargs}"),
            Op::PassThrough { name, is_super } => {
                format!("passthru {}{}", s(name), if is_super { " super" } else { "" })
            }
            Op::LoadLocal(slot) => {
                let name = self.formal_args.get(usize::from(slot)).map_or("?", |a| a.name.as_str());
                format!("load_local {slot}:{name}")
            }
            Op::StoreOption(kind) => format!("store_option {}", kind.name()),
            Op::Br(a) => format!("br {a}"),
            Op::BrFalse(a) => format!("brf {a}"),
            Op::BrTrue(a) => format!("brt {a}"),
            Op::RotMap(n) => format!("rot_map {n}"),
            Op::ZipMap(n) => format!("zip_map {n}"),
            other => {
                let name = format!("{other:?}");
                let mnemonic = snake_case(name.split('(').next().unwrap_or(&name));
                match other.string_operand() {
                    Some(i) => format!("{mnemonic} {}", s(i)),
                    None => mnemonic,
                }
            }
        }
    }
}

fn snake_case(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, ch) in camel.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Namespace of a qualified name: `/a/b/t` → `/a/b/`.
pub fn prefix_of(name: &str) -> String {
    match name.rfind('/') {
        Some(i) => name.get(..=i).unwrap_or("/").to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(prefix_of("/t"), "/");
        assert_eq!(prefix_of("/a/b/t"), "/a/b/");
        assert_eq!(prefix_of("t"), "/");
    }

    #[test]
    fn option_names() {
        assert_eq!(OptionKind::from_name("separator"), Some(OptionKind::Separator));
        assert_eq!(OptionKind::from_name("bogus"), None);
        assert_eq!(OptionKind::Wrap.default_value(), Some("\n"));
        assert_eq!(OptionKind::Null.default_value(), None);
    }

    #[test]
    fn empty_template_has_no_ops() {
        let t = CompiledTemplate::empty("/t", Some(vec![FormalArg::new("x", 0)]));
        assert!(t.ops.is_empty());
        assert!(t.has_formal_args);
        assert_eq!(t.formal_arg("x").map(|a| a.index), Some(0));
        assert!(!t.is_transparent());
    }

    #[test]
    fn disassembly_names_operands() {
        let mut t = CompiledTemplate::empty("/t", None);
        t.strings = vec![Arc::from("hi"), Arc::from("u")];
        t.ops = vec![Op::WriteStr(0), Op::New { name: 1, nargs: 0 }, Op::Write, Op::NewlineIfWrote];
        let listing = t.disassemble();
        assert!(listing.contains("0000:\twrite_str #0:\"hi\""));
        assert!(listing.contains("0001:\tnew #1:\"u\" 0"));
        assert!(listing.contains("0003:\tnewline_if_wrote"));
    }
}
