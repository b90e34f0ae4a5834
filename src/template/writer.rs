use std::fmt;

/// Output sink for rendering. Tracks indentation, anchors and the current
/// column so it can replay indentation after newlines and wrap long lines.
pub trait TemplateWriter {
    fn push_indentation(&mut self, indent: &str);
    fn pop_indentation(&mut self) -> Option<String>;

    /// Remember the current column; wrapped lines return to it.
    fn push_anchor_point(&mut self);
    fn pop_anchor_point(&mut self);

    fn line_width(&self) -> Option<usize>;
    fn set_line_width(&mut self, width: Option<usize>);

    /// Characters written so far, indentation included.
    fn index(&self) -> usize;

    /// Write text, indenting each new non-empty line. Returns the number of
    /// characters emitted.
    fn write(&mut self, s: &str) -> Result<usize, fmt::Error>;

    /// Emit `wrap` if writing `next_len` more characters on the current
    /// line would pass the line width. Returns the characters emitted.
    fn write_wrap(&mut self, wrap: &str, next_len: usize) -> Result<usize, fmt::Error>;

    /// Separators are written as-is; they never trigger a wrap.
    fn write_separator(&mut self, s: &str) -> Result<usize, fmt::Error> {
        self.write(s)
    }
}

/// Writer that indents lazily: indentation for a line is emitted just before
/// its first character, so blank lines stay empty.
#[derive(Debug)]
pub struct AutoIndentWriter<W> {
    out: W,
    indents: Vec<String>,
    anchors: Vec<usize>,
    newline: String,
    line_width: Option<usize>,
    at_start_of_line: bool,
    /// Column on the current line.
    char_position: usize,
    char_index: usize,
}

impl<W: fmt::Write> AutoIndentWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            indents: Vec::new(),
            anchors: Vec::new(),
            newline: "\n".to_string(),
            line_width: None,
            at_start_of_line: true,
            char_position: 0,
            char_index: 0,
        }
    }

    pub fn with_newline(mut self, newline: &str) -> Self {
        newline.clone_into(&mut self.newline);
        self
    }

    pub fn with_line_width(mut self, width: Option<usize>) -> Self {
        self.line_width = width;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn newline(&mut self) -> Result<usize, fmt::Error> {
        self.out.write_str(&self.newline)?;
        let n = self.newline.chars().count();
        self.char_index += n;
        self.char_position = 0;
        Ok(n)
    }

    /// Emit every pushed indentation, then pad out to the innermost anchor
    /// if it sits further right.
    fn indent(&mut self) -> Result<usize, fmt::Error> {
        let mut n = 0;
        for ind in &self.indents {
            self.out.write_str(ind)?;
            n += ind.chars().count();
        }
        if let Some(&anchor) = self.anchors.last() {
            for _ in n..anchor {
                self.out.write_char(' ')?;
            }
            n = n.max(anchor);
        }
        self.char_position += n;
        self.char_index += n;
        Ok(n)
    }
}

impl<W: fmt::Write> TemplateWriter for AutoIndentWriter<W> {
    fn push_indentation(&mut self, indent: &str) {
        self.indents.push(indent.to_string());
    }

    fn pop_indentation(&mut self) -> Option<String> {
        self.indents.pop()
    }

    fn push_anchor_point(&mut self) {
        self.anchors.push(self.char_position);
    }

    fn pop_anchor_point(&mut self) {
        self.anchors.pop();
    }

    fn line_width(&self) -> Option<usize> {
        self.line_width
    }

    fn set_line_width(&mut self, width: Option<usize>) {
        self.line_width = width;
    }

    fn index(&self) -> usize {
        self.char_index
    }

    fn write(&mut self, s: &str) -> Result<usize, fmt::Error> {
        let mut n = 0;
        for c in s.chars() {
            match c {
                '\r' => {}
                '\n' => {
                    self.at_start_of_line = true;
                    n += self.newline()?;
                }
                _ => {
                    if self.at_start_of_line {
                        n += self.indent()?;
                        self.at_start_of_line = false;
                    }
                    self.out.write_char(c)?;
                    n += 1;
                    self.char_position += 1;
                    self.char_index += 1;
                }
            }
        }
        Ok(n)
    }

    fn write_wrap(&mut self, wrap: &str, next_len: usize) -> Result<usize, fmt::Error> {
        let Some(width) = self.line_width else {
            return Ok(0);
        };
        if wrap.is_empty() || self.at_start_of_line || self.char_position + next_len <= width {
            return Ok(0);
        }
        let mut n = 0;
        for c in wrap.chars() {
            match c {
                '\r' => {}
                '\n' => {
                    n += self.newline()?;
                    n += self.indent()?;
                }
                _ => {
                    self.out.write_char(c)?;
                    n += 1;
                    self.char_position += 1;
                    self.char_index += 1;
                }
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn writer() -> AutoIndentWriter<String> {
        AutoIndentWriter::new(String::new())
    }

    #[test]
    fn indentation_skips_blank_lines() {
        let mut w = writer();
        w.push_indentation("  ");
        w.write("Terence\n\nis a maniac").unwrap();
        assert_eq!(w.into_inner(), "  Terence\n\n  is a maniac");
    }

    #[test]
    fn nested_indentation_accumulates() {
        let mut w = writer();
        w.push_indentation("  ");
        w.write("a\n").unwrap();
        w.push_indentation("    ");
        w.write("b\n").unwrap();
        assert_eq!(w.pop_indentation().as_deref(), Some("    "));
        w.write("c").unwrap();
        assert_eq!(w.into_inner(), "  a\n      b\n  c");
    }

    #[test]
    fn carriage_returns_are_dropped_and_newline_is_configurable() {
        let mut w = AutoIndentWriter::new(String::new()).with_newline("\r\n");
        w.write("a\r\nb").unwrap();
        assert_eq!(w.into_inner(), "a\r\nb");
    }

    #[test]
    fn counts_characters_written() {
        let mut w = writer();
        w.push_indentation("\t");
        assert_eq!(w.write("ab\ncd").unwrap(), 7);
        assert_eq!(w.index(), 7);
    }

    #[test]
    fn wraps_before_overflowing_chunk() {
        let mut w = writer().with_line_width(Some(6));
        for (i, word) in ["abc", "de", "fgh"].iter().enumerate() {
            if i > 0 {
                w.write_separator(" ").unwrap();
            }
            w.write_wrap("\n", word.len()).unwrap();
            w.write(word).unwrap();
        }
        assert_eq!(w.into_inner(), "abc de \nfgh");
    }

    #[test]
    fn wrap_returns_to_anchor() {
        let mut w = writer().with_line_width(Some(8));
        w.write("x = ").unwrap();
        w.push_anchor_point();
        w.write("aaa").unwrap();
        w.write_wrap("\n", 3).unwrap();
        w.write("bbb").unwrap();
        w.pop_anchor_point();
        assert_eq!(w.into_inner(), "x = aaa\n    bbb");
    }

    #[test]
    fn no_wrap_without_width_or_at_line_start() {
        let mut w = writer();
        assert_eq!(w.write_wrap("\n", 1000).unwrap(), 0);
        let mut w = writer().with_line_width(Some(2));
        assert_eq!(w.write_wrap("\n", 10).unwrap(), 0);
        assert_eq!(w.into_inner(), "");
    }
}
