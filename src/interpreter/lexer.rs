//! Tokenizer for guest source.
//!
//! Produces a flat token stream in which block structure is made explicit by
//! `Indent`/`Dedent` tokens, the way Python's tokenizer does. Newlines inside
//! brackets are ignored, and so are blank and comment-only lines.

use super::{Result, ScriptError};

/// Token payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifier or keyword.
    Name(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal with escapes already processed.
    Str(String),
    /// Raw body of an f-string (escapes processed, braces untouched).
    FStr(String),
    /// Operator or punctuation.
    Op(&'static str),
    /// End of a logical line.
    Newline,
    /// Block opened.
    Indent,
    /// Block closed.
    Dedent,
    /// End of input.
    Eof,
}

/// Token with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Payload.
    pub tok: Tok,
    /// 1-based source line.
    pub line: usize,
}

// Longest spellings first so that greedy matching picks `**=` over `**` over `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", "+", "-",
    "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

/// Tokenize `source`.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut at_line_start = true;
        while self.index < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.handle_indentation()? {
                    at_line_start = true;
                    continue;
                }
            }

            let ch = match self.current() {
                Some(ch) => ch,
                None => break,
            };
            match ch {
                '\n' => {
                    self.index += 1;
                    if self.depth == 0 {
                        self.end_logical_line();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.index += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek(1) == Some('\n') => {
                    self.index += 2;
                    self.line += 1;
                }
                '"' | '\'' => self.lex_string(false, false)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_name_or_prefixed_string()?,
                _ => self.lex_operator()?,
            }
        }

        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    fn end_logical_line(&mut self) {
        let needs_newline = matches!(
            self.tokens.last(),
            Some(Token { tok, .. }) if !matches!(tok, Tok::Newline | Tok::Indent | Tok::Dedent)
        );
        if needs_newline {
            self.push(Tok::Newline);
        }
    }

    /// Measure leading whitespace and emit indent/dedent tokens. Returns `true`
    /// when the line was blank or comment-only and has been consumed.
    fn handle_indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        while let Some(ch) = self.current() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.index += 1;
        }

        match self.current() {
            None => return Ok(true),
            Some('\n') => {
                self.index += 1;
                self.line += 1;
                return Ok(true);
            }
            Some('\r') if self.peek(1) == Some('\n') => {
                self.index += 2;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.current() == Some('\n') {
                    self.index += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            _ => {}
        }

        let top = *self.indents.last().unwrap_or(&0);
        if width > top {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < top {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(ScriptError::new(
                    "IndentationError",
                    "unindent does not match any outer indentation level",
                )
                .at_line(self.line));
            }
        }
        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.index += 1;
        }
    }

    fn lex_name_or_prefixed_string(&mut self) -> Result<()> {
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                self.index += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.index].iter().collect();

        if matches!(self.current(), Some('"') | Some('\'')) {
            let lower = word.to_ascii_lowercase();
            match lower.as_str() {
                "f" => return self.lex_string(true, false),
                "r" => return self.lex_string(false, true),
                "fr" | "rf" => return self.lex_string(true, true),
                "b" | "u" => return self.lex_string(false, false),
                _ => {}
            }
        }

        self.push(Tok::Name(word));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<()> {
        let start = self.index;
        let mut is_float = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '_' {
                self.index += 1;
            } else if ch == '.' && !is_float {
                is_float = true;
                self.index += 1;
            } else if (ch == 'e' || ch == 'E')
                && (self.peek(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek(1), Some('+') | Some('-'))
                        && self.peek(2).is_some_and(|c| c.is_ascii_digit())))
            {
                is_float = true;
                self.index += 2;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.index]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value = text.parse::<f64>().map_err(|_| {
                ScriptError::syntax(self.line, format!("invalid float literal '{text}'"))
            })?;
            self.push(Tok::Float(value));
        } else {
            let value = text.parse::<i64>().map_err(|_| {
                ScriptError::new("OverflowError", format!("integer literal '{text}' is too large"))
                    .at_line(self.line)
            })?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }

    fn lex_string(&mut self, formatted: bool, raw: bool) -> Result<()> {
        let start_line = self.line;
        let quote = self.current().unwrap_or('"');
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.index += if triple { 3 } else { 1 };

        let mut buf = String::new();
        loop {
            let ch = match self.current() {
                Some(ch) => ch,
                None => {
                    return Err(ScriptError::syntax(
                        start_line,
                        "unterminated string literal",
                    ));
                }
            };

            if ch == quote {
                if !triple {
                    self.index += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.index += 3;
                    break;
                }
            }

            if ch == '\n' {
                if !triple {
                    return Err(ScriptError::syntax(
                        start_line,
                        "unterminated string literal",
                    ));
                }
                self.line += 1;
            }

            if ch == '\\' && !raw {
                let escaped = self.peek(1).ok_or_else(|| {
                    ScriptError::syntax(start_line, "unterminated string literal")
                })?;
                self.index += 2;
                match escaped {
                    'n' => buf.push('\n'),
                    't' => buf.push('\t'),
                    'r' => buf.push('\r'),
                    '0' => buf.push('\0'),
                    '\\' => buf.push('\\'),
                    '\'' => buf.push('\''),
                    '"' => buf.push('"'),
                    '\n' => self.line += 1,
                    other => {
                        buf.push('\\');
                        buf.push(other);
                    }
                }
                continue;
            }

            buf.push(ch);
            self.index += 1;
        }

        let tok = if formatted {
            Tok::FStr(buf)
        } else {
            Tok::Str(buf)
        };
        self.tokens.push(Token {
            tok,
            line: start_line,
        });
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<()> {
        for op in OPERATORS {
            let matches = op
                .chars()
                .enumerate()
                .all(|(offset, expected)| self.peek(offset) == Some(expected));
            if matches {
                self.index += op.chars().count();
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(Tok::Op(op));
                return Ok(());
            }
        }
        let ch = self.current().unwrap_or(' ');
        Err(ScriptError::syntax(
            self.line,
            format!("invalid character '{ch}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn emits_indent_and_dedent_around_blocks() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
        assert_eq!(toks.last(), Some(&Tok::Eof));
    }

    #[test]
    fn ignores_newlines_inside_brackets_and_comment_lines() {
        let toks = kinds("values = [1,\n  2]\n# note\nprint(values)\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn lexes_prefixed_and_triple_quoted_strings() {
        let toks = kinds("a = f'{x}'\nb = \"\"\"one\ntwo\"\"\"\n");
        assert!(toks.contains(&Tok::FStr("{x}".into())));
        assert!(toks.contains(&Tok::Str("one\ntwo".into())));
    }

    #[test]
    fn reports_inconsistent_dedent() {
        let err = tokenize("if x:\n    a = 1\n  b = 2\n").unwrap_err();
        assert_eq!(err.kind, "IndentationError");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn reports_unterminated_string() {
        let err = tokenize("print('oops)\n").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");
    }
}
