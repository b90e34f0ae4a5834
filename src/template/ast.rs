/// Byte range within a template's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One piece of a template body.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Literal text with escapes already resolved.
    Text(String),
    /// A source line break.
    Newline,
    /// Leading whitespace at column 0 followed by an element. The indent is
    /// replayed before every line the element writes.
    Indented { indent: String, element: Box<Element> },
    /// `<expr; options>`
    Expr(ExprTag),
    /// `<if(c)> ... <elseif(c)> ... <else> ... <endif>`
    If(IfChain),
    /// Embedded region definition `<@name> ... <@end>`.
    Region { name: String, body: Vec<Element> },
}

/// An expression tag together with its write options.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprTag {
    pub expr: Expr,
    pub options: Vec<OptionDecl>,
}

/// `name` or `name = value` inside the options clause of an expression tag.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    pub name: String,
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfChain {
    /// `if` followed by every `elseif`, in source order.
    pub branches: Vec<(Condition, Vec<Element>)>,
    pub else_body: Option<Vec<Element>>,
}

/// Boolean expression of an `if`/`elseif`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Truth test of a value.
    Value(Expr),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Attribute reference.
    Attr(String),
    Str(String),
    Bool(bool),
    /// `object.name`
    Prop { object: Box<Expr>, name: String },
    /// `object.(expr)`
    PropInd { object: Box<Expr>, name: Box<Expr> },
    /// Built-in function call, e.g. `first(names)`.
    Func { name: String, arg: Box<Expr> },
    /// `name(args)`
    Include { name: String, args: Args },
    /// `super.name(args)`
    SuperInclude { name: String, args: Args },
    /// `(expr)(args)`: template name computed at render time.
    IncludeInd { name: Box<Expr>, args: Vec<Expr> },
    /// `@name()` or `@super.name()`
    Region { name: String, is_super: bool },
    /// `{args | body}`
    Subtemplate(Subtemplate),
    /// `[a, b, , c]`; `None` marks an omitted element.
    List(Vec<Option<Expr>>),
    /// `(expr)`: evaluate to a string right away.
    ToStr(Box<Expr>),
    /// `expr:t()` or the rotating form `expr:t(), u()`.
    Map { expr: Box<Expr>, templates: Vec<TemplateRef> },
    /// `a, b:t()`
    Zip { exprs: Vec<Expr>, template: TemplateRef },
}

/// Arguments of a template include.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Args {
    #[default]
    None,
    Positional(Vec<Expr>),
    Named {
        args: Vec<(String, Expr)>,
        pass_through: bool,
    },
}

/// Anonymous template literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtemplate {
    /// `None` when the literal has no `|` clause.
    pub args: Option<Vec<String>>,
    pub body: Vec<Element>,
    pub span: Span,
}

/// Target of a map or zip.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRef {
    Named { name: String, args: Vec<Expr>, span: Span },
    Anonymous(Subtemplate),
    Indirect { name: Box<Expr>, args: Vec<Expr>, span: Span },
}

impl TemplateRef {
    pub fn span(&self) -> Span {
        match self {
            TemplateRef::Named { span, .. } | TemplateRef::Indirect { span, .. } => *span,
            TemplateRef::Anonymous(sub) => sub.span,
        }
    }
}

// ── Definitions ────────────────────────────────────────────────────

/// A formal argument as declared in a template header.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDecl {
    pub name: String,
    pub default: Option<DefaultDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultDecl {
    /// `={...}`; `eval_early` when the body is a single `(expr)` tag.
    Template {
        body: Vec<Element>,
        source: String,
        eval_early: bool,
    },
    Str(String),
    Bool(bool),
    EmptyList,
}

/// Region definition flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionKind {
    /// Not a region.
    #[default]
    None,
    /// Blank stub synthesised for `<@r()>`.
    Implicit,
    /// `<@r> ... <@end>` inside the enclosing template.
    Embedded,
    /// `@t.r() ::= ...` at group level.
    Explicit,
}

/// A parsed template ready for compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDef {
    /// Fully qualified name, starting with `/`.
    pub name: String,
    /// `None` means the template did not declare an argument list.
    pub args: Option<Vec<ArgDecl>>,
    pub body: Vec<Element>,
    pub region: RegionKind,
}

pub fn mangled_region_name(enclosing: &str, region: &str) -> String {
    format!("/region__{enclosing}__{region}")
}

/// Recover `(enclosing, region)` from a mangled region name.
pub fn unmangled_region_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("/region__")?;
    let split = rest.rfind("__")?;
    Some((rest.get(..split)?, rest.get(split + 2..)?))
}

/// Prefix every unqualified name with `/`.
pub fn qualify(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge() {
        let s = Span::new(4, 9).merge(Span::new(1, 5));
        assert_eq!(s, Span::new(1, 9));
    }

    #[test]
    fn region_names_round_trip() {
        let mangled = mangled_region_name("/page", "header");
        assert_eq!(mangled, "/region__/page__header");
        assert_eq!(unmangled_region_name(&mangled), Some(("/page", "header")));
        assert_eq!(unmangled_region_name("/page"), None);
    }
}
