//! Group file format: imports, delimiters, template definitions, region
//! overrides and dictionaries.
//!
//! ```text
//! import "base.stg"
//! delimiters "$", "$"
//! page(title, body={<title>}) ::= <<
//! ...
//! >>
//! @page.header() ::= "..."
//! colors ::= ["red":"#f00", default:"#000"]
//! ```

use std::collections::HashSet;

use super::ast::*;
use super::error::{offset_to_line_col, CompileError};
use super::lexer::Delimiters;
use super::parser::parse_template;

/// Parsed contents of one group file. Template bodies are parsed; nothing is
/// compiled yet.
#[derive(Debug, Clone, Default)]
pub struct GroupFile {
    pub imports: Vec<ImportDecl>,
    pub delimiters: Delimiters,
    pub templates: Vec<TemplateSource>,
    pub dictionaries: Vec<DictionaryDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub line: usize,
}

/// A template definition together with the text its spans point into and
/// where that text starts in the group file.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub def: TemplateDef,
    pub source: String,
    pub line: usize,
    pub col: usize,
}

impl TemplateSource {
    /// Group-file `(line, col)` of a span inside this template's body.
    pub fn position(&self, span: Span) -> (usize, usize) {
        body_position(&self.source, self.line, self.col, span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryDecl {
    pub name: String,
    pub entries: Vec<(String, DictValue)>,
    pub default: Option<DictValue>,
    pub line: usize,
}

/// Right-hand side of a dictionary entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DictValue {
    Str(String),
    Bool(bool),
    EmptyList,
    /// `key`: the value is the lookup key itself.
    Key,
    /// `<<...>>` or `{...}`: rendered as a template.
    Template(String),
}

/// A group-level problem or a template body error, already positioned in
/// the group file.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupError {
    pub error: CompileError,
    pub line: usize,
    pub col: usize,
}

/// Map a span inside a body that starts at `(line, col)` of the group file.
pub fn body_position(source: &str, line: usize, col: usize, span: Span) -> (usize, usize) {
    let (l, c) = offset_to_line_col(source, span.start);
    if l == 1 {
        (line, col + c - 1)
    } else {
        (line + l - 1, c)
    }
}

pub fn parse_group(text: &str) -> (GroupFile, Vec<GroupError>) {
    let mut errors = Vec::new();
    let tokens = match GroupLexer::new(text).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            errors.push(positioned(text, e));
            return (GroupFile::default(), errors);
        }
    };
    let mut parser = GroupParser {
        text,
        tokens,
        pos: 0,
        file: GroupFile::default(),
        errors,
    };
    parser.parse_file();
    (parser.file, parser.errors)
}

fn positioned(text: &str, error: CompileError) -> GroupError {
    let (line, col) = offset_to_line_col(text, error.span.start);
    GroupError { error, line, col }
}

// ── Group lexer ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum GTok {
    Id(String),
    /// `"..."` with the raw text between the quotes.
    Str(String),
    /// `<<...>>`, one leading and one trailing newline trimmed.
    BigString(String),
    /// `<%...%>`, newlines and following indentation removed.
    BigStringNoNl(String),
    /// `{...}` with the raw text between the braces.
    Anonymous(String),
    Define,
    LParen,
    RParen,
    LBrack,
    RBrack,
    Comma,
    Equals,
    Colon,
    At,
    Dot,
    Eof,
}

#[derive(Debug, Clone)]
struct GToken {
    tok: GTok,
    span: Span,
    /// Byte offset where the token's content starts (after quotes or
    /// trimmed newlines).
    content_start: usize,
}

struct GroupLexer<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> GroupLexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.text.len(), |&(i, _)| i)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.text.get(self.offset()..).is_some_and(|rest| rest.starts_with(s))
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.text.get(start..end).unwrap_or("")
    }

    fn tokenize(&mut self) -> Result<Vec<GToken>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.offset();
            let Some(c) = self.peek() else {
                tokens.push(GToken { tok: GTok::Eof, span: Span::new(start, start), content_start: start });
                return Ok(tokens);
            };
            let (tok, content_start) = match c {
                '"' => self.string()?,
                '<' if self.peek_at(1) == Some('<') => self.big_string()?,
                '<' if self.peek_at(1) == Some('%') => self.big_string_no_nl()?,
                '{' => self.anonymous()?,
                ':' if self.starts_with("::=") => {
                    self.pos += 3;
                    (GTok::Define, start)
                }
                c if c.is_alphabetic() || c == '_' => {
                    while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                        self.pos += 1;
                    }
                    (GTok::Id(self.slice(start, self.offset()).to_string()), start)
                }
                _ => {
                    let tok = match c {
                        '(' => GTok::LParen,
                        ')' => GTok::RParen,
                        '[' => GTok::LBrack,
                        ']' => GTok::RBrack,
                        ',' => GTok::Comma,
                        '=' => GTok::Equals,
                        ':' => GTok::Colon,
                        '@' => GTok::At,
                        '.' => GTok::Dot,
                        other => {
                            return Err(CompileError::group(
                                format!("invalid character '{other}'"),
                                Span::new(start, start + other.len_utf8()),
                            ));
                        }
                    };
                    self.pos += 1;
                    (tok, start)
                }
            };
            tokens.push(GToken { tok, span: Span::new(start, self.offset()), content_start });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.offset();
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => return Err(CompileError::group("unterminated comment", Span::new(start, start + 2))),
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self) -> Result<(GTok, usize), CompileError> {
        let start = self.offset();
        self.pos += 1;
        let content_start = self.offset();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(CompileError::group("unterminated string", Span::new(start, self.offset())));
                }
                Some('\\') => self.pos += 2,
                Some('"') => break,
                Some(_) => self.pos += 1,
            }
        }
        let raw = self.slice(content_start, self.offset()).to_string();
        self.pos += 1;
        Ok((GTok::Str(raw), content_start))
    }

    fn big_string(&mut self) -> Result<(GTok, usize), CompileError> {
        let start = self.offset();
        self.pos += 2;
        let mut content_start = self.offset();
        loop {
            if self.peek().is_none() {
                return Err(CompileError::group("unterminated <<...>> template", Span::new(start, start + 2)));
            }
            if self.peek() == Some('\\') && self.peek_at(1) == Some('>') {
                self.pos += 2;
                continue;
            }
            if self.starts_with(">>") {
                break;
            }
            self.pos += 1;
        }
        let mut end = self.offset();
        self.pos += 2;

        let mut body = self.slice(content_start, end);
        if let Some(rest) = body.strip_prefix("\r\n") {
            content_start += 2;
            body = rest;
        } else if let Some(rest) = body.strip_prefix('\n') {
            content_start += 1;
            body = rest;
        }
        if let Some(rest) = body.strip_suffix("\r\n") {
            end -= 2;
            body = rest;
        } else if let Some(rest) = body.strip_suffix('\n') {
            end -= 1;
            body = rest;
        }
        debug_assert!(content_start <= end);
        Ok((GTok::BigString(body.to_string()), content_start))
    }

    fn big_string_no_nl(&mut self) -> Result<(GTok, usize), CompileError> {
        let start = self.offset();
        self.pos += 2;
        let content_start = self.offset();
        while !self.starts_with("%>") {
            if self.peek().is_none() {
                return Err(CompileError::group("unterminated <%...%> template", Span::new(start, start + 2)));
            }
            self.pos += 1;
        }
        let raw = self.slice(content_start, self.offset());
        self.pos += 2;

        let mut body = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\n' || c == '\r' {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            } else {
                body.push(c);
            }
        }
        Ok((GTok::BigStringNoNl(body), content_start))
    }

    fn anonymous(&mut self) -> Result<(GTok, usize), CompileError> {
        let start = self.offset();
        self.pos += 1;
        let content_start = self.offset();
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => return Err(CompileError::group("unterminated {...} template", Span::new(start, start + 1))),
                Some('\\') => self.pos += 2,
                Some('{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
        let raw = self.slice(content_start, self.offset()).to_string();
        self.pos += 1;
        Ok((GTok::Anonymous(raw), content_start))
    }
}

// ── Group parser ───────────────────────────────────────────────────

type GResult<T> = Result<T, CompileError>;

struct GroupParser<'a> {
    text: &'a str,
    tokens: Vec<GToken>,
    pos: usize,
    file: GroupFile,
    errors: Vec<GroupError>,
}

impl GroupParser<'_> {
    fn peek(&self) -> &GTok {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &GTok {
        self.tokens.get(self.pos + n).map_or(&GTok::Eof, |t| &t.tok)
    }

    fn current(&self) -> Option<&GToken> {
        self.tokens.get(self.pos)
    }

    fn span(&self) -> Span {
        self.current().map_or(Span::new(self.text.len(), self.text.len()), |t| t.span)
    }

    fn advance(&mut self) -> Option<GToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &GTok, what: &str) -> GResult<GToken> {
        if self.peek() == expected {
            if let Some(tok) = self.advance() {
                return Ok(tok);
            }
        }
        Err(CompileError::group(format!("expected {what}"), self.span()))
    }

    fn expect_id(&mut self) -> GResult<String> {
        match self.peek().clone() {
            GTok::Id(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(CompileError::group("expected identifier", self.span())),
        }
    }

    fn error(&mut self, error: CompileError) {
        self.errors.push(positioned(self.text, error));
    }

    fn line_of(&self, offset: usize) -> usize {
        offset_to_line_col(self.text, offset).0
    }

    /// Skip to the start of the next definition after an error.
    fn recover(&mut self) {
        while !matches!(self.peek(), GTok::Eof) {
            self.advance();
            let next_def = matches!(
                (self.peek(), self.peek_at(1)),
                (GTok::Id(_), GTok::LParen | GTok::Define) | (GTok::At, GTok::Id(_))
            );
            let after_body = self.pos > 0
                && self.tokens.get(self.pos - 1).is_some_and(|t| {
                    matches!(t.tok, GTok::Str(_) | GTok::BigString(_) | GTok::BigStringNoNl(_) | GTok::RBrack)
                });
            if next_def && after_body {
                break;
            }
        }
    }

    fn parse_file(&mut self) {
        while !matches!(self.peek(), GTok::Eof) {
            if let Err(e) = self.parse_item() {
                self.error(e);
                self.recover();
            }
        }
    }

    fn parse_item(&mut self) -> GResult<()> {
        match (self.peek().clone(), self.peek_at(1).clone()) {
            (GTok::Id(kw), GTok::Str(_)) if kw == "import" => {
                let start = self.span().start;
                self.advance();
                let Some(GToken { tok: GTok::Str(path), .. }) = self.advance() else {
                    return Err(CompileError::group("expected import path", self.span()));
                };
                let line = self.line_of(start);
                self.file.imports.push(ImportDecl { path: unescape(&path), line });
                Ok(())
            }
            (GTok::Id(kw), GTok::Str(_)) if kw == "delimiters" => self.parse_delimiters(),
            (GTok::At, _) => self.parse_region_def(),
            (GTok::Id(_), GTok::Define) => self.parse_dictionary(),
            (GTok::Id(_), GTok::LParen) => self.parse_template_def(),
            _ => Err(CompileError::group("expected a template definition", self.span())),
        }
    }

    fn parse_delimiters(&mut self) -> GResult<()> {
        self.advance();
        let start = self.delimiter_char()?;
        self.expect(&GTok::Comma, "','")?;
        let stop = self.delimiter_char()?;
        self.file.delimiters = Delimiters { start, stop };
        Ok(())
    }

    fn delimiter_char(&mut self) -> GResult<char> {
        let span = self.span();
        match self.advance().map(|t| t.tok) {
            Some(GTok::Str(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(CompileError::group("delimiter must be a single character", span)),
                }
            }
            _ => Err(CompileError::group("expected delimiter string", span)),
        }
    }

    /// `name(args) ::= body`
    fn parse_template_def(&mut self) -> GResult<()> {
        let name_span = self.span();
        let name = self.expect_id()?;
        self.expect(&GTok::LParen, "'('")?;
        let args = self.parse_formal_args(&name)?;
        self.expect(&GTok::RParen, "')'")?;
        self.expect(&GTok::Define, "'::='")?;
        self.parse_body(qualify(&name), Some(args), RegionKind::None, name_span)
    }

    /// `@enclosing.region() ::= body`
    fn parse_region_def(&mut self) -> GResult<()> {
        let name_span = self.span();
        self.advance();
        let enclosing = self.expect_id()?;
        self.expect(&GTok::Dot, "'.'")?;
        let region = self.expect_id()?;
        self.expect(&GTok::LParen, "'('")?;
        self.expect(&GTok::RParen, "')'")?;
        self.expect(&GTok::Define, "'::='")?;
        let name = mangled_region_name(&qualify(&enclosing), &region);
        self.parse_body(name, None, RegionKind::Explicit, name_span)
    }

    fn parse_body(&mut self, name: String, args: Option<Vec<ArgDecl>>, region: RegionKind, name_span: Span) -> GResult<()> {
        let Some(token) = self.advance() else {
            return Err(CompileError::group("expected template body", name_span));
        };
        let source = match token.tok {
            GTok::Str(raw) => raw.replace("\\\"", "\""),
            GTok::BigString(body) | GTok::BigStringNoNl(body) => body,
            _ => return Err(CompileError::group("expected template body", token.span)),
        };
        let (line, col) = offset_to_line_col(self.text, token.content_start);
        let body = match parse_template(&source, self.file.delimiters) {
            Ok(body) => body,
            Err(errs) => {
                for error in errs {
                    let (l, c) = body_position(&source, line, col, error.span);
                    self.errors.push(GroupError { error, line: l, col: c });
                }
                Vec::new()
            }
        };
        self.file.templates.push(TemplateSource {
            def: TemplateDef { name, args, body, region },
            source,
            line,
            col,
        });
        Ok(())
    }

    fn parse_formal_args(&mut self, template: &str) -> GResult<Vec<ArgDecl>> {
        let mut args: Vec<ArgDecl> = Vec::new();
        let mut seen = HashSet::new();
        let mut saw_default = false;
        if matches!(self.peek(), GTok::RParen) {
            return Ok(args);
        }
        loop {
            let span = self.span();
            let name = self.expect_id()?;
            let default = if matches!(self.peek(), GTok::Equals) {
                self.advance();
                Some(self.parse_default(template, &name)?)
            } else {
                None
            };
            if !seen.insert(name.clone()) {
                self.error(CompileError::group(format!("redefinition of parameter {name}"), span));
            } else if default.is_none() && saw_default {
                self.error(CompileError::group(
                    format!("required parameter {name} follows optional parameters"),
                    span,
                ));
            } else {
                saw_default |= default.is_some();
                args.push(ArgDecl { name, default, span });
            }
            if matches!(self.peek(), GTok::Comma) {
                self.advance();
            } else {
                return Ok(args);
            }
        }
    }

    fn parse_default(&mut self, template: &str, arg: &str) -> GResult<DefaultDecl> {
        let Some(token) = self.advance() else {
            return Err(CompileError::group("expected default value", self.span()));
        };
        match token.tok {
            GTok::Str(raw) => Ok(DefaultDecl::Str(unescape(&raw))),
            GTok::Id(kw) if kw == "true" => Ok(DefaultDecl::Bool(true)),
            GTok::Id(kw) if kw == "false" => Ok(DefaultDecl::Bool(false)),
            GTok::LBrack => {
                self.expect(&GTok::RBrack, "']' (only [] is allowed as a list default)")?;
                Ok(DefaultDecl::EmptyList)
            }
            GTok::Anonymous(source) => {
                let delims = self.file.delimiters;
                let trimmed = source.trim();
                let eval_early = trimmed.starts_with(&format!("{}(", delims.start))
                    && trimmed.ends_with(&format!("){}", delims.stop));
                let (line, col) = offset_to_line_col(self.text, token.content_start);
                let body = match parse_template(&source, delims) {
                    Ok(body) => body,
                    Err(errs) => {
                        for error in errs {
                            let (l, c) = body_position(&source, line, col, error.span);
                            self.errors.push(GroupError {
                                error: CompileError {
                                    message: format!("{} (default of {arg} in {template})", error.message),
                                    ..error
                                },
                                line: l,
                                col: c,
                            });
                        }
                        Vec::new()
                    }
                };
                Ok(DefaultDecl::Template { body, source, eval_early })
            }
            _ => Err(CompileError::group("expected default value", token.span)),
        }
    }

    /// `name ::= [ "key": value, ..., default: value ]`
    fn parse_dictionary(&mut self) -> GResult<()> {
        let start = self.span().start;
        let name = self.expect_id()?;
        self.expect(&GTok::Define, "'::='")?;
        self.expect(&GTok::LBrack, "'['")?;
        let mut entries = Vec::new();
        let mut default = None;
        while !matches!(self.peek(), GTok::RBrack) {
            let key_span = self.span();
            match self.advance().map(|t| t.tok) {
                Some(GTok::Str(raw)) => {
                    self.expect(&GTok::Colon, "':'")?;
                    entries.push((unescape(&raw), self.parse_dict_value()?));
                }
                Some(GTok::Id(kw)) if kw == "default" => {
                    self.expect(&GTok::Colon, "':'")?;
                    default = Some(self.parse_dict_value()?);
                }
                _ => return Err(CompileError::group("expected dictionary key", key_span)),
            }
            if matches!(self.peek(), GTok::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&GTok::RBrack, "']'")?;
        let line = self.line_of(start);
        self.file.dictionaries.push(DictionaryDecl { name, entries, default, line });
        Ok(())
    }

    fn parse_dict_value(&mut self) -> GResult<DictValue> {
        let span = self.span();
        match self.advance().map(|t| t.tok) {
            Some(GTok::Str(raw)) => Ok(DictValue::Str(unescape(&raw))),
            Some(GTok::BigString(body) | GTok::BigStringNoNl(body) | GTok::Anonymous(body)) => {
                Ok(DictValue::Template(body))
            }
            Some(GTok::Id(kw)) if kw == "true" => Ok(DictValue::Bool(true)),
            Some(GTok::Id(kw)) if kw == "false" => Ok(DictValue::Bool(false)),
            Some(GTok::Id(kw)) if kw == "key" => Ok(DictValue::Key),
            Some(GTok::LBrack) => {
                self.expect(&GTok::RBrack, "']'")?;
                Ok(DictValue::EmptyList)
            }
            _ => Err(CompileError::group("expected dictionary value", span)),
        }
    }
}

/// Resolve `\n`, `\t`, `\r`, `\"` and `\\` in a quoted group string.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> GroupFile {
        let (file, errors) = parse_group(text);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        file
    }

    #[test]
    fn string_and_big_string_templates() {
        let file = parse_ok("a(x) ::= \"<x>\\\"\"\nb() ::= <<\nline\n>>\n");
        assert_eq!(file.templates.len(), 2);
        assert_eq!(file.templates[0].def.name, "/a");
        assert_eq!(file.templates[0].source, "<x>\"");
        assert_eq!(file.templates[1].source, "line");
        assert_eq!(file.templates[1].line, 3);
    }

    #[test]
    fn no_newline_big_string() {
        let file = parse_ok("t() ::= <%\n  a\n  b\n%>");
        assert_eq!(file.templates[0].source, "ab");
    }

    #[test]
    fn formal_args_with_defaults() {
        let file = parse_ok("t(a, b=\"x\\ty\", c={<(a)>}, d=true, e=[]) ::= \"\"");
        let args = file.templates[0].def.args.clone().unwrap();
        assert_eq!(args.len(), 5);
        assert_eq!(args[1].default, Some(DefaultDecl::Str("x\ty".into())));
        assert!(matches!(args[2].default, Some(DefaultDecl::Template { eval_early: true, .. })));
        assert_eq!(args[3].default, Some(DefaultDecl::Bool(true)));
        assert_eq!(args[4].default, Some(DefaultDecl::EmptyList));
    }

    #[test]
    fn parameter_errors() {
        let (_, errors) = parse_group("t(a, a) ::= \"\"\nu(a=\"x\", b) ::= \"\"");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].error.message.contains("redefinition of parameter a"));
        assert!(errors[1].error.message.contains("required parameter b"));
        assert_eq!(errors[1].line, 2);
    }

    #[test]
    fn regions_imports_delimiters_and_dictionaries() {
        let file = parse_ok(
            "import \"base.stg\"\n\
             delimiters \"$\", \"$\"\n\
             // comment\n\
             /* block */\n\
             @page.header() ::= \"H\"\n\
             colors ::= [\"red\":\"#f00\", \"id\":key, default:\"none\"]\n",
        );
        assert_eq!(file.imports, vec![ImportDecl { path: "base.stg".into(), line: 1 }]);
        assert_eq!(file.delimiters, Delimiters { start: '$', stop: '$' });
        assert_eq!(file.templates[0].def.name, "/region__/page__header");
        assert_eq!(file.templates[0].def.region, RegionKind::Explicit);
        let dict = &file.dictionaries[0];
        assert_eq!(dict.entries[0], ("red".into(), DictValue::Str("#f00".into())));
        assert_eq!(dict.entries[1].1, DictValue::Key);
        assert_eq!(dict.default, Some(DictValue::Str("none".into())));
    }

    #[test]
    fn body_errors_are_positioned_in_the_file() {
        let (file, errors) = parse_group("a() ::= \"ok\"\nb() ::= <<\nfine\n  <x.>\n>>\n");
        assert_eq!(file.templates.len(), 2);
        assert!(file.templates[1].def.body.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!((errors[0].line, errors[0].col), (4, 6));
    }

    #[test]
    fn recovers_after_bad_definition() {
        let (file, errors) = parse_group("a( ::= \"x\"\nb() ::= \"y\"");
        assert_eq!(errors.len(), 1);
        assert_eq!(file.templates.len(), 1);
        assert_eq!(file.templates[0].def.name, "/b");
    }
}
