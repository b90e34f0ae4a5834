use super::ast::Span;
use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Outside expressions
    Text(String),
    Newline,
    /// Whitespace at the start of a line.
    Indent(String),
    Comment,
    LDelim,
    RDelim,

    // Inside expressions
    Id(String),
    Str(String),
    True,
    False,
    If,
    ElseIf,
    Else,
    EndIf,
    Super,
    RegionEnd, // @end

    // Punctuation
    LParen,
    RParen,
    LBrack,
    RBrack,
    LCurly,
    RCurly,
    Comma,
    Dot,
    Colon,
    Semi,
    Equals,
    Bang,
    And,      // &&
    Or,       // ||
    Ellipsis, // ...
    At,
    Pipe,

    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Expression delimiters of a template group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub start: char,
    pub stop: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self { start: '<', stop: '>' }
    }
}

pub fn lex(source: &str, delimiters: Delimiters) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
    let mut lexer = Lexer::new(source, delimiters);
    lexer.tokenize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    Subtemplate,
    Inside,
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    delimiters: Delimiters,
    modes: Vec<Mode>,
    tokens: Vec<SpannedToken>,
    errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, delimiters: Delimiters) -> Self {
        Self {
            source,
            pos: 0,
            delimiters,
            modes: vec![Mode::Outside],
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
        while self.pos < self.source.len() {
            match self.mode() {
                Mode::Outside | Mode::Subtemplate => self.lex_outside(),
                Mode::Inside => self.lex_inside(),
            }
        }
        match self.mode() {
            Mode::Inside => self.errors.push(CompileError::lexer(
                format!("premature EOF: expected '{}'", self.delimiters.stop),
                Span::new(self.pos, self.pos),
            )),
            Mode::Subtemplate => self.errors.push(CompileError::lexer(
                "premature EOF: unterminated anonymous template",
                Span::new(self.pos, self.pos),
            )),
            Mode::Outside => {}
        }
        self.push(Token::Eof, self.pos);
        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(Mode::Outside)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos..).and_then(|s| s.chars().next())
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.source.get(self.pos..).and_then(|s| s.chars().nth(n))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0
            || self
                .source
                .get(..self.pos)
                .and_then(|s| s.chars().next_back())
                .is_some_and(|c| c == '\n' || c == '\r')
    }

    fn push(&mut self, token: Token, start: usize) {
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, self.pos),
        });
    }

    fn error(&mut self, message: impl Into<String>, start: usize) {
        self.errors.push(CompileError::lexer(message, Span::new(start, self.pos.max(start + 1))));
    }

    // ── Outside ────────────────────────────────────────────────────

    fn lex_outside(&mut self) {
        let start = self.pos;
        let Some(c) = self.peek() else { return };

        if self.at_line_start() && (c == ' ' || c == '\t') {
            let mut ws = String::new();
            while let Some(c @ (' ' | '\t')) = self.peek() {
                ws.push(c);
                self.bump();
            }
            if self.pos < self.source.len() {
                self.push(Token::Indent(ws), start);
            } else {
                self.push(Token::Text(ws), start);
            }
            return;
        }

        if c == self.delimiters.start {
            self.bump();
            match self.peek() {
                Some('!') => self.lex_comment(start),
                Some('\\') => self.lex_escape(start),
                _ => {
                    self.push(Token::LDelim, start);
                    self.modes.push(Mode::Inside);
                }
            }
            return;
        }

        match c {
            '\r' => {
                self.bump();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                self.push(Token::Newline, start);
            }
            '\n' => {
                self.bump();
                self.push(Token::Newline, start);
            }
            '}' if self.mode() == Mode::Subtemplate => {
                self.bump();
                self.push(Token::RCurly, start);
                self.modes.pop();
            }
            _ => self.lex_text(start),
        }
    }

    fn lex_text(&mut self, start: usize) {
        let in_sub = self.mode() == Mode::Subtemplate;
        let mut buf = String::new();
        while let Some(c) = self.peek() {
            if c == self.delimiters.start || c == '\r' || c == '\n' || (c == '}' && in_sub) {
                break;
            }
            if c == '\\' {
                match self.peek_nth(1) {
                    Some('\\') => {
                        self.bump();
                        self.bump();
                        buf.push('\\');
                        continue;
                    }
                    Some(next) if next == self.delimiters.start || next == '}' => {
                        self.bump();
                        self.bump();
                        buf.push(next);
                        continue;
                    }
                    _ => {}
                }
            }
            buf.push(c);
            self.bump();
        }
        self.push(Token::Text(buf), start);
    }

    fn lex_comment(&mut self, start: usize) {
        self.bump(); // '!'
        loop {
            match self.bump() {
                Some('!') if self.peek() == Some(self.delimiters.stop) => {
                    self.bump();
                    self.push(Token::Comment, start);
                    return;
                }
                Some(_) => {}
                None => {
                    self.error("unterminated comment", start);
                    return;
                }
            }
        }
    }

    /// `<\n>`, `<\t>`, `<\ >`, `<\uXXXX>` produce text; `<\\>` swallows the
    /// rest of the line and the next line's indentation.
    fn lex_escape(&mut self, start: usize) {
        if self.peek_nth(1) == Some('\\') {
            self.bump();
            self.bump();
            if self.peek() != Some(self.delimiters.stop) {
                self.error("expected delimiter after line continuation", start);
                return;
            }
            self.bump();
            while let Some(' ' | '\t') = self.peek() {
                self.bump();
            }
            if self.peek() == Some('\r') {
                self.bump();
            }
            if self.peek() == Some('\n') {
                self.bump();
            }
            while let Some(' ' | '\t') = self.peek() {
                self.bump();
            }
            return;
        }

        let mut buf = String::new();
        while self.peek() == Some('\\') {
            self.bump();
            match self.bump() {
                Some('n') => buf.push('\n'),
                Some('t') => buf.push('\t'),
                Some(' ') => buf.push(' '),
                Some('u') => {
                    let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(ch) => buf.push(ch),
                        None => self.error(format!("invalid unicode escape \\u{hex}"), start),
                    }
                }
                Some(other) => self.error(format!("invalid escape character '{other}'"), start),
                None => break,
            }
        }
        if self.peek() == Some(self.delimiters.stop) {
            self.bump();
            self.push(Token::Text(buf), start);
        } else {
            self.error(format!("expected '{}' after escape", self.delimiters.stop), start);
        }
    }

    // ── Inside ─────────────────────────────────────────────────────

    fn lex_inside(&mut self) {
        while let Some(' ' | '\t' | '\r' | '\n') = self.peek() {
            self.bump();
        }
        let start = self.pos;
        let Some(c) = self.peek() else { return };

        if c == self.delimiters.stop {
            self.bump();
            self.push(Token::RDelim, start);
            self.modes.pop();
            return;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBrack),
            ']' => Some(Token::RBrack),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            ';' => Some(Token::Semi),
            '=' => Some(Token::Equals),
            '!' => Some(Token::Bang),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            self.push(token, start);
            return;
        }

        match c {
            '.' => {
                self.bump();
                if self.peek() == Some('.') && self.peek_nth(1) == Some('.') {
                    self.bump();
                    self.bump();
                    self.push(Token::Ellipsis, start);
                } else {
                    self.push(Token::Dot, start);
                }
            }
            '&' | '|' => {
                self.bump();
                if self.peek() == Some(c) {
                    self.bump();
                    self.push(if c == '&' { Token::And } else { Token::Or }, start);
                } else {
                    self.error(format!("expected '{c}{c}'"), start);
                }
            }
            '@' => {
                self.bump();
                let rest = self.source.get(self.pos..).unwrap_or("");
                let is_end = rest.starts_with("end")
                    && !rest.get(3..).and_then(|s| s.chars().next()).is_some_and(is_id_char);
                if is_end {
                    self.pos += 3;
                    self.push(Token::RegionEnd, start);
                } else {
                    self.push(Token::At, start);
                }
            }
            '"' => self.lex_string(start),
            '{' => self.lex_subtemplate(start),
            c if is_id_start(c) => {
                let word = self.scan_id();
                let token = match word.as_str() {
                    "if" => Token::If,
                    "elseif" => Token::ElseIf,
                    "else" => Token::Else,
                    "endif" => Token::EndIf,
                    "true" => Token::True,
                    "false" => Token::False,
                    "super" => Token::Super,
                    _ => Token::Id(word),
                };
                self.push(token, start);
            }
            other => {
                self.bump();
                self.error(format!("invalid character '{other}'"), start);
            }
        }
    }

    fn scan_id(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !is_id_char(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn lex_string(&mut self, start: usize) {
        self.bump(); // opening quote
        let mut buf = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => buf.push('\n'),
                    Some('r') => buf.push('\r'),
                    Some('t') => buf.push('\t'),
                    Some(other) => buf.push(other),
                    None => {
                        self.error("unterminated string", start);
                        return;
                    }
                },
                Some(c) => buf.push(c),
                None => {
                    self.error("unterminated string", start);
                    return;
                }
            }
        }
        self.push(Token::Str(buf), start);
    }

    /// `{` switches back to text mode. A leading `ID (, ID)* |` clause is
    /// emitted as argument tokens, and one whitespace char after `|` is
    /// dropped.
    fn lex_subtemplate(&mut self, start: usize) {
        self.bump();
        self.push(Token::LCurly, start);
        self.modes.push(Mode::Subtemplate);

        let mark = self.pos;
        let mut arg_tokens = Vec::new();
        loop {
            self.skip_ws();
            let id_start = self.pos;
            if !self.peek().is_some_and(is_id_start) {
                break;
            }
            let id = self.scan_id();
            arg_tokens.push(SpannedToken {
                token: Token::Id(id),
                span: Span::new(id_start, self.pos),
            });
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    let comma = self.pos;
                    self.bump();
                    arg_tokens.push(SpannedToken {
                        token: Token::Comma,
                        span: Span::new(comma, self.pos),
                    });
                }
                Some('|') if self.peek_nth(1) != Some('|') => {
                    let pipe = self.pos;
                    self.bump();
                    arg_tokens.push(SpannedToken {
                        token: Token::Pipe,
                        span: Span::new(pipe, self.pos),
                    });
                    if let Some(' ' | '\t' | '\r' | '\n') = self.peek() {
                        self.bump();
                    }
                    self.tokens.extend(arg_tokens);
                    return;
                }
                _ => break,
            }
        }
        self.pos = mark;
    }

    fn skip_ws(&mut self) {
        while let Some(' ' | '\t' | '\r' | '\n') = self.peek() {
            self.bump();
        }
    }
}

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '/'
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '/'
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        lex(src, Delimiters::default())
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn text_and_expression() {
        assert_eq!(
            tokens("hi <name>!"),
            vec![
                Token::Text("hi ".into()),
                Token::LDelim,
                Token::Id("name".into()),
                Token::RDelim,
                Token::Text("!".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn indent_only_at_line_start() {
        assert_eq!(
            tokens("a\n  <x>"),
            vec![
                Token::Text("a".into()),
                Token::Newline,
                Token::Indent("  ".into()),
                Token::LDelim,
                Token::Id("x".into()),
                Token::RDelim,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn escapes_in_text() {
        assert_eq!(tokens(r"a\<b\\c"), vec![Token::Text(r"a<b\c".into()), Token::Eof]);
    }

    #[test]
    fn escape_tags() {
        assert_eq!(
            tokens(r"<\n><\t><\ ><\u0041>"),
            vec![
                Token::Text("\n".into()),
                Token::Text("\t".into()),
                Token::Text(" ".into()),
                Token::Text("A".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn line_continuation_swallows_newline_and_indent() {
        assert_eq!(
            tokens("a <\\\\>  \n    b"),
            vec![Token::Text("a ".into()), Token::Text("b".into()), Token::Eof]
        );
    }

    #[test]
    fn comment_token() {
        assert_eq!(
            tokens("a<! hidden > !>b"),
            vec![Token::Text("a".into()), Token::Comment, Token::Text("b".into()), Token::Eof]
        );
    }

    #[test]
    fn subtemplate_with_args() {
        assert_eq!(
            tokens("<names:{n, i | <n>}>"),
            vec![
                Token::LDelim,
                Token::Id("names".into()),
                Token::Colon,
                Token::LCurly,
                Token::Id("n".into()),
                Token::Comma,
                Token::Id("i".into()),
                Token::Pipe,
                Token::LDelim,
                Token::Id("n".into()),
                Token::RDelim,
                Token::RCurly,
                Token::RDelim,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn subtemplate_without_args_keeps_text() {
        assert_eq!(
            tokens("<{ x }>"),
            vec![
                Token::LDelim,
                Token::LCurly,
                Token::Text(" x ".into()),
                Token::RCurly,
                Token::RDelim,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_operators() {
        assert_eq!(
            tokens("<if(!a&&b||c)><elseif(x)><else><endif><@end><@r()><super.t(...)>"),
            vec![
                Token::LDelim, Token::If, Token::LParen, Token::Bang, Token::Id("a".into()),
                Token::And, Token::Id("b".into()), Token::Or, Token::Id("c".into()),
                Token::RParen, Token::RDelim,
                Token::LDelim, Token::ElseIf, Token::LParen, Token::Id("x".into()), Token::RParen, Token::RDelim,
                Token::LDelim, Token::Else, Token::RDelim,
                Token::LDelim, Token::EndIf, Token::RDelim,
                Token::LDelim, Token::RegionEnd, Token::RDelim,
                Token::LDelim, Token::At, Token::Id("r".into()), Token::LParen, Token::RParen, Token::RDelim,
                Token::LDelim, Token::Super, Token::Dot, Token::Id("t".into()), Token::LParen,
                Token::Ellipsis, Token::RParen, Token::RDelim,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#"<"a\"b\n">"#),
            vec![Token::LDelim, Token::Str("a\"b\n".into()), Token::RDelim, Token::Eof]
        );
    }

    #[test]
    fn custom_delimiters() {
        let toks: Vec<Token> = lex("a $x$ <b>", Delimiters { start: '$', stop: '$' })
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        assert_eq!(
            toks,
            vec![
                Token::Text("a ".into()),
                Token::LDelim,
                Token::Id("x".into()),
                Token::RDelim,
                Token::Text(" <b>".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_expression_is_an_error() {
        let errs = lex("a <b", Delimiters::default()).unwrap_err();
        assert!(errs[0].message.contains("premature EOF"));
    }
}
