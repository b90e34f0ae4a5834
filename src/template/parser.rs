use super::ast::*;
use super::builtins::lookup_builtin;
use super::error::CompileError;
use super::lexer::{lex, Delimiters, SpannedToken, Token};

type PResult<T> = Result<T, CompileError>;

/// Lex and parse a template body.
pub fn parse_template(source: &str, delimiters: Delimiters) -> Result<Vec<Element>, Vec<CompileError>> {
    let tokens = lex(source, delimiters)?;
    parse(tokens)
}

pub fn parse(tokens: Vec<SpannedToken>) -> Result<Vec<Element>, Vec<CompileError>> {
    let mut parser = Parser::new(tokens);
    let body = parser.parse_elements();
    if !parser.at_eof() {
        let span = parser.span();
        let found = describe(parser.peek());
        parser.errors.push(CompileError::parser(format!("unexpected {found}"), span));
    }
    if parser.errors.is_empty() {
        Ok(body)
    } else {
        Err(parser.errors)
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    errors: Vec<CompileError>,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(Span::new(0, 0), |t| t.span)
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(Span::new(0, 0), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == expected
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> PResult<Span> {
        if self.check(expected) {
            let span = self.span();
            self.advance();
            Ok(span)
        } else {
            Err(CompileError::parser(
                format!("expected {} but found {}", describe(expected), describe(self.peek())),
                self.span(),
            ))
        }
    }

    fn expect_id(&mut self) -> PResult<String> {
        match self.peek().clone() {
            Token::Id(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("expected identifier but found {}", describe(&other)),
                self.span(),
            )),
        }
    }

    /// Skip to just past the next `RDelim` after a malformed tag.
    fn recover_to_rdelim(&mut self) {
        while !self.at_eof() {
            if matches!(self.advance(), Token::RDelim) {
                break;
            }
        }
    }

    // ── Line structure ─────────────────────────────────────────────

    /// True when the token at `idx` begins a line (template start or right
    /// after a newline).
    fn starts_line(&self, idx: usize) -> bool {
        idx == 0
            || idx
                .checked_sub(1)
                .and_then(|i| self.tokens.get(i))
                .is_some_and(|t| t.token == Token::Newline)
    }

    /// True when the token after `idx` ends the line.
    fn ends_line(&self, idx: usize) -> bool {
        self.tokens
            .get(idx + 1)
            .map_or(true, |t| matches!(t.token, Token::Newline | Token::Eof))
    }

    /// Is the upcoming `[INDENT] LDELIM keyword` an `elseif`/`else`/`endif`/`@end`?
    fn at_control_tag(&self) -> bool {
        let offset = usize::from(matches!(self.peek(), Token::Indent(_)));
        matches!(self.peek_at(offset), Token::LDelim)
            && matches!(
                self.peek_at(offset + 1),
                Token::ElseIf | Token::Else | Token::EndIf | Token::RegionEnd
            )
    }

    /// Consume a control tag `[INDENT] LDELIM ... RDELIM` via `inner`. If the
    /// tag sits alone on its line its indentation and trailing newline are
    /// dropped.
    fn control_tag<T>(&mut self, inner: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<(T, bool)> {
        let tag_start = self.pos;
        if matches!(self.peek(), Token::Indent(_)) {
            self.advance();
        }
        let value = inner(self)?;
        let rdelim = self.pos.saturating_sub(1);
        let alone = self.starts_line(tag_start) && self.ends_line(rdelim);
        if alone {
            self.eat(&Token::Newline);
        }
        Ok((value, alone))
    }

    // ── Elements ───────────────────────────────────────────────────

    fn parse_elements(&mut self) -> Vec<Element> {
        let mut elements = Vec::new();
        loop {
            if self.at_eof() || self.check(&Token::RCurly) || self.at_control_tag() {
                break;
            }
            let before = self.pos;
            match self.parse_element() {
                Ok(Some(e)) => elements.push(e),
                Ok(None) => {}
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_rdelim();
                }
            }
            if self.pos == before {
                // Stray token the element grammar cannot place.
                let span = self.span();
                let found = describe(self.peek());
                self.errors.push(CompileError::parser(format!("unexpected {found}"), span));
                self.advance();
            }
        }
        elements
    }

    fn parse_element(&mut self) -> PResult<Option<Element>> {
        let span = self.span();
        match self.peek().clone() {
            Token::Indent(indent) => self.parse_indented(indent),
            Token::Comment => {
                let alone = self.starts_line(self.pos) && self.ends_line(self.pos);
                self.advance();
                if alone {
                    self.eat(&Token::Newline);
                }
                Ok(None)
            }
            Token::Text(text) => {
                self.advance();
                Ok(Some(Element { kind: ElementKind::Text(text), span }))
            }
            Token::Newline => {
                self.advance();
                Ok(Some(Element { kind: ElementKind::Newline, span }))
            }
            Token::LDelim => self.parse_tag(None),
            other => Err(CompileError::parser(format!("unexpected {}", describe(&other)), span)),
        }
    }

    fn parse_indented(&mut self, indent: String) -> PResult<Option<Element>> {
        let start = self.span();
        match self.peek_at(1) {
            // `INDENT <!..!> NEWLINE` at column 0: drop the whole line.
            Token::Comment if self.starts_line(self.pos) && self.ends_line(self.pos + 1) => {
                self.advance();
                self.advance();
                self.eat(&Token::Newline);
                Ok(None)
            }
            Token::Comment => {
                self.advance();
                self.advance();
                Ok(None)
            }
            Token::LDelim => self.parse_tag(Some(indent)),
            Token::Text(_) | Token::Newline => {
                self.advance();
                let Some(inner) = self.parse_element()? else {
                    return Ok(None);
                };
                let span = start.merge(inner.span);
                Ok(Some(Element {
                    kind: ElementKind::Indented { indent, element: Box::new(inner) },
                    span,
                }))
            }
            // Indentation before `}` or end of input carries nothing.
            _ => {
                self.advance();
                Ok(None)
            }
        }
    }

    /// A tag starting at `LDELIM` (an `INDENT` before it, if any, is still
    /// unconsumed when `indent` is set).
    fn parse_tag(&mut self, indent: Option<String>) -> PResult<Option<Element>> {
        let offset = usize::from(indent.is_some());
        let compound = match (self.peek_at(offset + 1), self.peek_at(offset + 2), self.peek_at(offset + 3)) {
            (Token::If, _, _) => true,
            (Token::At, Token::Id(_), Token::RDelim) => true,
            _ => false,
        };

        if compound {
            let start = self.span();
            let is_if = matches!(self.peek_at(offset + 1), Token::If);
            let (kind, alone) = if is_if { self.parse_if()? } else { self.parse_region()? };
            let span = start.merge(self.prev_span());
            let element = Element { kind, span };
            return Ok(Some(match indent {
                Some(indent) if !alone => Element {
                    kind: ElementKind::Indented { indent, element: Box::new(element) },
                    span,
                },
                _ => element,
            }));
        }

        let start = self.span();
        if indent.is_some() {
            self.advance();
        }
        let tag = self.parse_expr_tag()?;
        let span = start.merge(self.prev_span());
        let element = Element { kind: ElementKind::Expr(tag), span };
        Ok(Some(match indent {
            Some(indent) => Element {
                kind: ElementKind::Indented { indent, element: Box::new(element) },
                span,
            },
            None => element,
        }))
    }

    fn parse_expr_tag(&mut self) -> PResult<ExprTag> {
        self.expect(&Token::LDelim)?;
        let expr = self.parse_expr()?;
        let mut options = Vec::new();
        if self.eat(&Token::Semi) {
            loop {
                let span = self.span();
                let name = self.expect_id()?;
                let value = if self.eat(&Token::Equals) {
                    Some(self.parse_expr_no_comma()?)
                } else {
                    None
                };
                options.push(OptionDecl {
                    name,
                    value,
                    span: span.merge(self.prev_span()),
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RDelim)?;
        Ok(ExprTag { expr, options })
    }

    /// `if`, every `elseif`, optional `else`, then `endif`. Returns whether
    /// the opening tag was alone on its line.
    fn parse_if(&mut self) -> PResult<(ElementKind, bool)> {
        let (cond, alone) = self.control_tag(|p| {
            p.expect(&Token::LDelim)?;
            p.expect(&Token::If)?;
            p.expect(&Token::LParen)?;
            let cond = p.parse_conditional()?;
            p.expect(&Token::RParen)?;
            p.expect(&Token::RDelim)?;
            Ok(cond)
        })?;
        let mut branches = vec![(cond, self.parse_elements())];
        let mut else_body = None;

        loop {
            let keyword = if matches!(self.peek(), Token::Indent(_)) {
                self.peek_at(2).clone()
            } else {
                self.peek_at(1).clone()
            };
            match keyword {
                Token::ElseIf if else_body.is_none() => {
                    let (cond, _) = self.control_tag(|p| {
                        p.expect(&Token::LDelim)?;
                        p.expect(&Token::ElseIf)?;
                        p.expect(&Token::LParen)?;
                        let cond = p.parse_conditional()?;
                        p.expect(&Token::RParen)?;
                        p.expect(&Token::RDelim)?;
                        Ok(cond)
                    })?;
                    branches.push((cond, self.parse_elements()));
                }
                Token::Else if else_body.is_none() => {
                    self.control_tag(|p| {
                        p.expect(&Token::LDelim)?;
                        p.expect(&Token::Else)?;
                        p.expect(&Token::RDelim)
                    })?;
                    else_body = Some(self.parse_elements());
                }
                Token::EndIf => {
                    self.control_tag(|p| {
                        p.expect(&Token::LDelim)?;
                        p.expect(&Token::EndIf)?;
                        p.expect(&Token::RDelim)
                    })?;
                    break;
                }
                _ => {
                    return Err(CompileError::parser("missing endif", self.span()));
                }
            }
        }
        Ok((ElementKind::If(IfChain { branches, else_body }), alone))
    }

    /// `<@name> ... <@end>`
    fn parse_region(&mut self) -> PResult<(ElementKind, bool)> {
        let (name, alone) = self.control_tag(|p| {
            p.expect(&Token::LDelim)?;
            p.expect(&Token::At)?;
            let name = p.expect_id()?;
            p.expect(&Token::RDelim)?;
            Ok(name)
        })?;
        let body = self.parse_elements();
        self.control_tag(|p| {
            p.expect(&Token::LDelim)?;
            p.expect(&Token::RegionEnd)?;
            p.expect(&Token::RDelim)
        })?;
        Ok((ElementKind::Region { name, body }, alone))
    }

    // ── Conditions ─────────────────────────────────────────────────

    fn parse_conditional(&mut self) -> PResult<Condition> {
        let mut left = self.parse_and_conditional()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and_conditional()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_conditional(&mut self) -> PResult<Condition> {
        let mut left = self.parse_not_conditional()?;
        while self.eat(&Token::And) {
            let right = self.parse_not_conditional()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_conditional(&mut self) -> PResult<Condition> {
        if self.eat(&Token::Bang) {
            return Ok(Condition::Not(Box::new(self.parse_not_conditional()?)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_conditional()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        Ok(Condition::Value(self.parse_member_expr()?))
    }

    // ── Expressions ────────────────────────────────────────────────

    /// `a:t()`, `a:t(),u()`, `a,b:t()`, chained with further `:` maps.
    fn parse_expr(&mut self) -> PResult<Expr> {
        let first = self.parse_member_expr()?;
        let mut zipped = false;
        let mut expr = if self.check(&Token::Comma) {
            let mut exprs = vec![first];
            while self.eat(&Token::Comma) {
                exprs.push(self.parse_member_expr()?);
            }
            self.expect(&Token::Colon)?;
            let template = self.parse_template_ref()?;
            let span = exprs
                .first()
                .map_or(template.span(), |e| e.span)
                .merge(template.span());
            zipped = true;
            Expr::new(ExprKind::Zip { exprs, template }, span)
        } else {
            first
        };

        while self.eat(&Token::Colon) {
            let mut templates = vec![self.parse_template_ref()?];
            while !zipped && self.eat(&Token::Comma) {
                templates.push(self.parse_template_ref()?);
            }
            let span = templates.iter().fold(expr.span, |s, t| s.merge(t.span()));
            expr = Expr::new(ExprKind::Map { expr: Box::new(expr), templates }, span);
        }
        Ok(expr)
    }

    fn parse_expr_no_comma(&mut self) -> PResult<Expr> {
        let expr = self.parse_member_expr()?;
        if self.eat(&Token::Colon) {
            let template = self.parse_template_ref()?;
            let span = expr.span.merge(template.span());
            return Ok(Expr::new(
                ExprKind::Map { expr: Box::new(expr), templates: vec![template] },
                span,
            ));
        }
        Ok(expr)
    }

    fn parse_member_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_include_expr()?;
        while self.eat(&Token::Dot) {
            if self.eat(&Token::LParen) {
                let name = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                let span = expr.span.merge(self.prev_span());
                expr = Expr::new(ExprKind::PropInd { object: Box::new(expr), name: Box::new(name) }, span);
            } else {
                let name = self.expect_id()?;
                let span = expr.span.merge(self.prev_span());
                expr = Expr::new(ExprKind::Prop { object: Box::new(expr), name }, span);
            }
        }
        Ok(expr)
    }

    fn parse_include_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        match (self.peek().clone(), self.peek_at(1).clone()) {
            (Token::Id(name), Token::LParen) => {
                self.advance();
                self.advance();
                if lookup_builtin(&name).is_some() {
                    if self.check(&Token::RParen) {
                        return Err(CompileError::parser(
                            format!("function {name} expects one argument"),
                            self.span(),
                        ));
                    }
                    let arg = self.parse_expr()?;
                    self.expect(&Token::RParen)?;
                    let span = start.merge(self.prev_span());
                    return Ok(Expr::new(ExprKind::Func { name, arg: Box::new(arg) }, span));
                }
                let args = self.parse_args()?;
                self.expect(&Token::RParen)?;
                let span = start.merge(self.prev_span());
                Ok(Expr::new(ExprKind::Include { name, args }, span))
            }
            (Token::Super, _) => {
                self.advance();
                self.expect(&Token::Dot)?;
                let name = self.expect_id()?;
                self.expect(&Token::LParen)?;
                let args = self.parse_args()?;
                self.expect(&Token::RParen)?;
                let span = start.merge(self.prev_span());
                Ok(Expr::new(ExprKind::SuperInclude { name, args }, span))
            }
            (Token::At, _) => {
                self.advance();
                let is_super = self.eat(&Token::Super);
                if is_super {
                    self.expect(&Token::Dot)?;
                }
                let name = self.expect_id()?;
                self.expect(&Token::LParen)?;
                self.expect(&Token::RParen)?;
                let span = start.merge(self.prev_span());
                Ok(Expr::new(ExprKind::Region { name, is_super }, span))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.span();
        match self.peek().clone() {
            Token::Id(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Attr(name), start))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), start))
            }
            Token::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), start))
            }
            Token::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), start))
            }
            Token::LCurly => {
                let sub = self.parse_subtemplate()?;
                let span = sub.span;
                Ok(Expr::new(ExprKind::Subtemplate(sub), span))
            }
            Token::LBrack => self.parse_list(),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                if self.eat(&Token::LParen) {
                    let args = self.parse_positional_args()?;
                    self.expect(&Token::RParen)?;
                    let span = start.merge(self.prev_span());
                    return Ok(Expr::new(ExprKind::IncludeInd { name: Box::new(inner), args }, span));
                }
                let span = start.merge(self.prev_span());
                Ok(Expr::new(ExprKind::ToStr(Box::new(inner)), span))
            }
            other => Err(CompileError::parser(
                format!("unexpected {} in expression", describe(&other)),
                start,
            )),
        }
    }

    fn parse_list(&mut self) -> PResult<Expr> {
        let start = self.expect(&Token::LBrack)?;
        let mut items = Vec::new();
        if !self.eat(&Token::RBrack) {
            loop {
                if matches!(self.peek(), Token::Comma | Token::RBrack) {
                    items.push(None);
                } else {
                    items.push(Some(self.parse_expr_no_comma()?));
                }
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RBrack)?;
                break;
            }
        }
        let span = start.merge(self.prev_span());
        Ok(Expr::new(ExprKind::List(items), span))
    }

    fn parse_subtemplate(&mut self) -> PResult<Subtemplate> {
        let start = self.expect(&Token::LCurly)?;
        let args = if matches!(self.peek(), Token::Id(_)) {
            let mut names = vec![self.expect_id()?];
            while self.eat(&Token::Comma) {
                names.push(self.expect_id()?);
            }
            self.expect(&Token::Pipe)?;
            Some(names)
        } else {
            None
        };
        let body = self.parse_elements();
        self.expect(&Token::RCurly)?;
        Ok(Subtemplate {
            args,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_template_ref(&mut self) -> PResult<TemplateRef> {
        let start = self.span();
        match self.peek().clone() {
            Token::Id(name) => {
                self.advance();
                self.expect(&Token::LParen)?;
                let args = self.parse_positional_args()?;
                self.expect(&Token::RParen)?;
                Ok(TemplateRef::Named { name, args, span: start.merge(self.prev_span()) })
            }
            Token::LCurly => Ok(TemplateRef::Anonymous(self.parse_subtemplate()?)),
            Token::LParen => {
                self.advance();
                let name = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                self.expect(&Token::LParen)?;
                let args = self.parse_positional_args()?;
                self.expect(&Token::RParen)?;
                Ok(TemplateRef::Indirect {
                    name: Box::new(name),
                    args,
                    span: start.merge(self.prev_span()),
                })
            }
            other => Err(CompileError::parser(
                format!("expected template reference but found {}", describe(&other)),
                start,
            )),
        }
    }

    fn parse_args(&mut self) -> PResult<Args> {
        if self.check(&Token::RParen) {
            return Ok(Args::None);
        }
        if self.eat(&Token::Ellipsis) {
            return Ok(Args::Named { args: Vec::new(), pass_through: true });
        }
        if matches!((self.peek(), self.peek_at(1)), (Token::Id(_), Token::Equals)) {
            let mut args = Vec::new();
            let mut pass_through = false;
            loop {
                let name = self.expect_id()?;
                self.expect(&Token::Equals)?;
                args.push((name, self.parse_expr_no_comma()?));
                if !self.eat(&Token::Comma) {
                    break;
                }
                if self.eat(&Token::Ellipsis) {
                    pass_through = true;
                    break;
                }
            }
            return Ok(Args::Named { args, pass_through });
        }
        Ok(Args::Positional(self.parse_positional_args()?))
    }

    fn parse_positional_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr_no_comma()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(args)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Text(_) => "text".into(),
        Token::Newline => "newline".into(),
        Token::Indent(_) => "indentation".into(),
        Token::Comment => "comment".into(),
        Token::LDelim => "start of expression".into(),
        Token::RDelim => "end of expression".into(),
        Token::Id(name) => format!("'{name}'"),
        Token::Str(s) => format!("\"{s}\""),
        Token::True => "'true'".into(),
        Token::False => "'false'".into(),
        Token::If => "'if'".into(),
        Token::ElseIf => "'elseif'".into(),
        Token::Else => "'else'".into(),
        Token::EndIf => "'endif'".into(),
        Token::Super => "'super'".into(),
        Token::RegionEnd => "'@end'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::LBrack => "'['".into(),
        Token::RBrack => "']'".into(),
        Token::LCurly => "'{'".into(),
        Token::RCurly => "'}'".into(),
        Token::Comma => "','".into(),
        Token::Dot => "'.'".into(),
        Token::Colon => "':'".into(),
        Token::Semi => "';'".into(),
        Token::Equals => "'='".into(),
        Token::Bang => "'!'".into(),
        Token::And => "'&&'".into(),
        Token::Or => "'||'".into(),
        Token::Ellipsis => "'...'".into(),
        Token::At => "'@'".into(),
        Token::Pipe => "'|'".into(),
        Token::Eof => "end of template".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse_src(src: &str) -> Vec<Element> {
        parse_template(src, Delimiters::default()).unwrap()
    }

    fn kinds(src: &str) -> Vec<ElementKind> {
        parse_src(src).into_iter().map(|e| e.kind).collect()
    }

    fn only_expr(src: &str) -> ExprKind {
        match kinds(src).remove(0) {
            ElementKind::Expr(tag) => tag.expr.kind,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn text_newline_and_expr() {
        let k = kinds("a <x>\nb");
        assert!(matches!(&k[0], ElementKind::Text(t) if t == "a "));
        assert!(matches!(&k[1], ElementKind::Expr(_)));
        assert!(matches!(k[2], ElementKind::Newline));
        assert!(matches!(&k[3], ElementKind::Text(t) if t == "b"));
    }

    #[test]
    fn property_chain() {
        let ExprKind::Prop { object, name } = only_expr("<a.b.c>") else {
            panic!("expected property")
        };
        assert_eq!(name, "c");
        assert!(matches!(object.kind, ExprKind::Prop { ref name, .. } if name == "b"));
    }

    #[test]
    fn builtin_vs_include() {
        assert!(matches!(only_expr("<first(names)>"), ExprKind::Func { ref name, .. } if name == "first"));
        assert!(matches!(only_expr("<row(x, y)>"), ExprKind::Include { args: Args::Positional(ref a), .. } if a.len() == 2));
    }

    #[test]
    fn named_args_with_pass_through() {
        let ExprKind::Include { args, .. } = only_expr("<t(a=x, b=\"s\", ...)>") else {
            panic!("expected include")
        };
        let Args::Named { args, pass_through } = args else {
            panic!("expected named args")
        };
        assert_eq!(args.len(), 2);
        assert!(pass_through);
    }

    #[test]
    fn map_rotation_and_zip() {
        let ExprKind::Map { templates, .. } = only_expr("<names:a(), b()>") else {
            panic!("expected map")
        };
        assert_eq!(templates.len(), 2);

        let ExprKind::Zip { exprs, .. } = only_expr("<a, b:{x, y | <x><y>}>") else {
            panic!("expected zip")
        };
        assert_eq!(exprs.len(), 2);
    }

    #[test]
    fn chained_map() {
        let ExprKind::Map { expr, .. } = only_expr("<names:t():u()>") else {
            panic!("expected map")
        };
        assert!(matches!(expr.kind, ExprKind::Map { .. }));
    }

    #[test]
    fn list_with_omitted_element() {
        let ExprKind::List(items) = only_expr("<[a,,b]>") else {
            panic!("expected list")
        };
        assert_eq!(items.len(), 3);
        assert!(items[1].is_none());
    }

    #[test]
    fn options_clause() {
        let ElementKind::Expr(tag) = kinds("<names; separator=\", \", wrap, anchor>").remove(0) else {
            panic!("expected expression")
        };
        let names: Vec<&str> = tag.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["separator", "wrap", "anchor"]);
        assert!(tag.options[1].value.is_none());
    }

    #[test]
    fn indirect_include_and_to_str() {
        assert!(matches!(only_expr("<(name)(a)>"), ExprKind::IncludeInd { .. }));
        assert!(matches!(only_expr("<(name)>"), ExprKind::ToStr(_)));
    }

    #[test]
    fn regions_and_super() {
        assert!(matches!(only_expr("<@r()>"), ExprKind::Region { is_super: false, .. }));
        assert!(matches!(only_expr("<@super.r()>"), ExprKind::Region { is_super: true, .. }));
        assert!(matches!(only_expr("<super.t()>"), ExprKind::SuperInclude { .. }));
    }

    #[test]
    fn if_chain_with_conditions() {
        let ElementKind::If(chain) = kinds("<if(!a&&(b||c))>x<elseif(d)>y<else>z<endif>").remove(0) else {
            panic!("expected if")
        };
        assert_eq!(chain.branches.len(), 2);
        assert!(chain.else_body.is_some());
        assert!(matches!(chain.branches[0].0, Condition::And(..)));
    }

    #[test]
    fn control_tags_alone_on_lines_drop_their_lines() {
        let k = kinds("begin\n   <if(x)>\n   foo\n   <else>\n   bar\n   <endif>\nend\n");
        assert_eq!(k.len(), 5);
        let ElementKind::If(chain) = &k[2] else {
            panic!("expected if, got {:?}", k[2])
        };
        let then_kinds: Vec<&ElementKind> = chain.branches[0].1.iter().map(|e| &e.kind).collect();
        assert_eq!(then_kinds.len(), 2);
        assert!(matches!(then_kinds[0], ElementKind::Indented { indent, .. } if indent == "   "));
        assert!(matches!(then_kinds[1], ElementKind::Newline));
        assert!(matches!(&k[3], ElementKind::Text(t) if t == "end"));
    }

    #[test]
    fn inline_indented_if_keeps_indent() {
        let k = kinds("  <if(x)>a<endif>\n");
        assert!(matches!(&k[0], ElementKind::Indented { element, .. } if matches!(element.kind, ElementKind::If(_))));
        assert!(matches!(k[1], ElementKind::Newline));
    }

    #[test]
    fn comment_lines_vanish() {
        let k = kinds("a\n  <! note !>\nb<! inline !>c");
        let texts: Vec<String> = k
            .iter()
            .map(|e| match e {
                ElementKind::Text(t) => t.clone(),
                ElementKind::Newline => "\\n".into(),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["a", "\\n", "b", "c"]);
    }

    #[test]
    fn embedded_region() {
        let k = kinds("a\n<@r>\nbody\n<@end>\nz");
        assert!(matches!(&k[2], ElementKind::Region { name, body } if name == "r" && body.len() == 2));
    }

    #[test]
    fn subtemplate_args() {
        let ExprKind::Map { templates, .. } = only_expr("<xs:{x | <x>}>") else {
            panic!("expected map")
        };
        let TemplateRef::Anonymous(sub) = &templates[0] else {
            panic!("expected anonymous template")
        };
        assert_eq!(sub.args.as_deref(), Some(&["x".to_string()][..]));
    }

    #[test]
    fn errors_are_reported() {
        let errs = parse_template("<a.>", Delimiters::default()).unwrap_err();
        assert!(errs[0].message.contains("expected identifier"));
        let errs = parse_template("<if(x)>a", Delimiters::default()).unwrap_err();
        assert!(errs[0].message.contains("missing endif"));
        let errs = parse_template("<first()>", Delimiters::default()).unwrap_err();
        assert!(errs[0].message.contains("expects one argument"));
    }
}
