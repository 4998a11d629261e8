//! Indented output buffer with retroactive insertion.

/// A saved position in a [`LuaWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    offset: usize,
    indent: usize,
}

/// Line-oriented Lua text buffer.
///
/// Indentation is applied lazily when the first text of a line is written.
/// A [`Mark`] remembers a line boundary so declarations discovered later can
/// be spliced in front of code that was already written.
#[derive(Debug, Default)]
pub struct LuaWriter {
    out: String,
    indent: usize,
    at_line_start: bool,
}

const INDENT: &str = "    ";

impl LuaWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    pub fn with_indent(indent: usize) -> Self {
        Self {
            indent,
            ..Self::new()
        }
    }

    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.out.push_str(INDENT);
            }
            self.at_line_start = false;
        }
        self.out.push_str(text);
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.write(text.as_ref());
        self.newline();
    }

    /// Append pre-rendered text verbatim, ignoring indentation.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        self.at_line_start = text.is_empty() || text.ends_with('\n');
    }

    /// Write pre-rendered lines, each indented at the current level.
    pub fn block(&mut self, text: &str) {
        for line in text.lines() {
            if line.is_empty() {
                self.newline();
            } else {
                self.line(line);
            }
        }
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn outdent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn mark(&self) -> Mark {
        Mark {
            offset: self.out.len(),
            indent: self.indent,
        }
    }

    /// Insert whole lines at `mark`, indented as they were when it was taken.
    ///
    /// Marks taken after `mark` are invalidated.
    pub fn insert_lines(&mut self, mark: Mark, lines: &[String]) {
        let mut text = String::new();
        for line in lines {
            for _ in 0..mark.indent {
                text.push_str(INDENT);
            }
            text.push_str(line);
            text.push('\n');
        }
        self.out.insert_str(mark.offset, &text);
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_lazily() {
        let mut w = LuaWriter::new();
        w.line("do");
        w.indent();
        w.write("x = ");
        w.write("1");
        w.newline();
        w.outdent();
        w.line("end");
        assert_eq!(w.finish(), "do\n    x = 1\nend\n");
    }

    #[test]
    fn inserts_at_mark() {
        let mut w = LuaWriter::with_indent(1);
        let mark = w.mark();
        w.line("reg1 = 2;");
        w.insert_lines(mark, &["local reg1;".to_string()]);
        assert_eq!(w.finish(), "    local reg1;\n    reg1 = 2;\n");
    }

    #[test]
    fn block_reindents() {
        let mut w = LuaWriter::new();
        w.line("function f()");
        w.indent();
        w.block("a = 1;\nif a then\n    b();\nend\n");
        w.outdent();
        w.line("end");
        assert_eq!(
            w.finish(),
            "function f()\n    a = 1;\n    if a then\n        b();\n    end\nend\n"
        );
    }

    #[test]
    fn raw_text_is_verbatim() {
        let mut w = LuaWriter::with_indent(2);
        w.raw("a\n");
        w.line("b");
        assert_eq!(w.finish(), "a\n        b\n");
    }
}
