use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerState {
    LineBegin,
    TokenStart,
}

enum StepOutcome<'a> {
    Emit(Token<'a>),
    Continue,
}

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error(
        "IndentationError at {span}: dedent to {found} spaces does not match any outer indentation level (expected {expected})"
    )]
    InvalidDedent {
        found: usize,
        expected: usize,
        span: Span,
    },
    #[error("SyntaxError at {span}: tabs are not supported for indentation")]
    TabIndentation { span: Span },
    #[error("SyntaxError at {span}: unexpected character '{character}'")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("SyntaxError at {span}: integer literal '{literal}' is out of range")]
    IntegerOutOfRange { literal: String, span: Span },
    #[error("SyntaxError at {span}: unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("SyntaxError at {span}: lexer invariant violated: {message}")]
    InvariantViolation { message: &'static str, span: Span },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    bracket_depth: usize,
    state: LexerState,
    needs_newline_at_eof: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            bracket_depth: 0,
            state: LexerState::LineBegin,
            needs_newline_at_eof: false,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        loop {
            if let Some(token) = self.pending_tokens.pop() {
                return Ok(token);
            }

            match self.step_state()? {
                StepOutcome::Emit(token) => {
                    self.needs_newline_at_eof =
                        !matches!(token.kind, TokenKind::Newline | TokenKind::Dedent);
                    return Ok(token);
                }
                StepOutcome::Continue => continue,
            }
        }
    }

    fn step_state(&mut self) -> LexResult<StepOutcome<'a>> {
        match self.state {
            LexerState::LineBegin => {
                // Compute the indentation delta and produce Indent/Dedent
                // tokens as needed. Blank and comment-only lines never change
                // the indentation depth.
                let indent_level = self.count_indentation()?;
                let current_indent = self.current_indent()?;
                let span = self.here();

                if indent_level > current_indent {
                    self.indent_stack.push(indent_level);
                    self.state = LexerState::TokenStart;
                    return Ok(StepOutcome::Emit(Token::new(TokenKind::Indent, span)));
                }

                if indent_level < current_indent {
                    while let Some(&top) = self.indent_stack.last() {
                        if top > indent_level {
                            self.indent_stack.pop();
                            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                        } else {
                            break;
                        }
                    }
                    let expected = self.current_indent()?;
                    if expected != indent_level {
                        return Err(LexError::InvalidDedent {
                            found: indent_level,
                            expected,
                            span,
                        });
                    }
                    self.state = LexerState::TokenStart;
                    return Ok(StepOutcome::Continue);
                }

                self.state = LexerState::TokenStart;
                Ok(StepOutcome::Continue)
            }
            LexerState::TokenStart => {
                self.skip_spaces_and_comments();

                if self.peek_char().is_none() {
                    return self.handle_eof();
                }

                self.read_token_from_current_position()
            }
        }
    }

    fn handle_eof(&mut self) -> LexResult<StepOutcome<'a>> {
        // A source that does not end in a newline still ends a logical line;
        // synthesize the Newline so the parser sees uniform line structure,
        // then flush every open indentation level before EOF.
        if self.needs_newline_at_eof {
            return Ok(StepOutcome::Emit(Token::new(TokenKind::Newline, self.here())));
        }

        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            let span = self.here();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if !self.pending_tokens.is_empty() {
            return Ok(StepOutcome::Continue);
        }

        Ok(StepOutcome::Emit(Token::new(TokenKind::EOF, self.here())))
    }

    fn count_indentation(&mut self) -> LexResult<usize> {
        let indentation = self.consume_while(|c| c == ' ');
        match self.peek_char() {
            Some('\t') => Err(LexError::TabIndentation { span: self.here() }),
            // Blank lines and comment-only lines keep the current depth.
            Some('\n') | Some('#') | None => self.current_indent(),
            _ => Ok(indentation),
        }
    }

    fn skip_spaces_and_comments(&mut self) {
        loop {
            self.consume_while(|c| c == ' ');
            if self.peek_char() == Some('#') {
                self.consume_while(|c| c != '\n');
                continue;
            }
            break;
        }
    }

    fn read_token_from_current_position(&mut self) -> LexResult<StepOutcome<'a>> {
        let start = self.here();
        let ch = self.peek_char().ok_or(LexError::InvariantViolation {
            message: "read_token_from_current_position called at EOF",
            span: start,
        })?;

        if ch == '\n' {
            self.consume_char();
            if self.bracket_depth > 0 {
                // Inside an open bracket pair line breaks are whitespace.
                return Ok(StepOutcome::Continue);
            }
            self.state = LexerState::LineBegin;
            return Ok(StepOutcome::Emit(Token::new(
                TokenKind::Newline,
                self.span_from(start),
            )));
        }

        let token = if let Some(kind) = self.try_consume_operator(ch) {
            Token::new(kind, self.span_from(start))
        } else {
            match ch {
                '"' => self.read_string(start)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
                c if c.is_ascii_digit() => self.read_number(start)?,
                _ => {
                    return Err(LexError::UnexpectedCharacter {
                        character: ch,
                        span: start,
                    });
                }
            }
        };

        Ok(StepOutcome::Emit(token))
    }

    /// Two-character operators are matched before single-character ones.
    fn try_consume_operator(&mut self, ch: char) -> Option<TokenKind<'a>> {
        let two = match (ch, self.peek_second_char()) {
            ('=', Some('=')) => Some(TokenKind::EqEq),
            ('!', Some('=')) => Some(TokenKind::NotEq),
            ('<', Some('=')) => Some(TokenKind::LessEq),
            ('>', Some('=')) => Some(TokenKind::GreaterEq),
            _ => None,
        };
        if let Some(kind) = two {
            self.consume_char();
            self.consume_char();
            return Some(kind);
        }

        let kind = match ch {
            '=' => TokenKind::Assign,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => {
                self.bracket_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '{' => {
                self.bracket_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            _ => return None,
        };

        self.consume_char();
        Some(kind)
    }

    fn read_identifier(&mut self, start: Span) -> Token<'a> {
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let ident = &self.input[start.start..self.pos];
        let kind = match ident {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(kind, self.span_from(start))
    }

    fn read_number(&mut self, start: Span) -> LexResult<Token<'a>> {
        self.consume_while(|c| c.is_ascii_digit());

        // A float needs at least one digit on both sides of the dot; `1.` is
        // an integer followed by a Dot token.
        let is_float = self.peek_char() == Some('.')
            && self
                .peek_second_char()
                .is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            let literal = &self.input[start.start..self.pos];
            let value = literal.parse::<f64>().map_err(|_| LexError::InvariantViolation {
                message: "digit run failed to parse as f64",
                span: start,
            })?;
            return Ok(Token::new(TokenKind::Float(value), self.span_from(start)));
        }

        let literal = &self.input[start.start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::IntegerOutOfRange {
                literal: literal.to_string(),
                span: start,
            })?;
        Ok(Token::new(TokenKind::Integer(value), self.span_from(start)))
    }

    fn read_string(&mut self, start: Span) -> LexResult<Token<'a>> {
        if self.input[self.pos..].starts_with("\"\"\"") {
            return self.read_triple_quoted_string(start);
        }

        self.consume_char(); // opening quote
        let content_start = self.pos;
        loop {
            match self.peek_char() {
                Some('"') => break,
                Some('\n') | None => {
                    return Err(LexError::UnterminatedString { span: start });
                }
                Some('\\') => {
                    // Keep the raw escape; the parser decodes it. Consume the
                    // escaped character too so `\"` does not close the string.
                    self.consume_char();
                    if self.consume_char().is_none() {
                        return Err(LexError::UnterminatedString { span: start });
                    }
                }
                Some(_) => {
                    self.consume_char();
                }
            }
        }
        let content = &self.input[content_start..self.pos];
        self.consume_char(); // closing quote
        Ok(Token::new(TokenKind::String(content), self.span_from(start)))
    }

    /// `"""..."""` spans lines and preserves inner newlines literally.
    fn read_triple_quoted_string(&mut self, start: Span) -> LexResult<Token<'a>> {
        for _ in 0..3 {
            self.consume_char();
        }
        let content_start = self.pos;
        loop {
            if self.pos >= self.input.len() {
                return Err(LexError::UnterminatedString { span: start });
            }
            if self.input[self.pos..].starts_with("\"\"\"") {
                break;
            }
            self.consume_char();
        }
        let content = &self.input[content_start..self.pos];
        for _ in 0..3 {
            self.consume_char();
        }
        Ok(Token::new(TokenKind::String(content), self.span_from(start)))
    }

    fn consume_while<P>(&mut self, keep_predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second_char(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Zero-width span at the current position.
    fn here(&self) -> Span {
        Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, start: Span) -> Span {
        Span {
            start: start.start,
            end: self.pos,
            line: start.line,
            column: start.column,
        }
    }

    fn current_indent(&self) -> LexResult<usize> {
        self.indent_stack
            .last()
            .copied()
            .ok_or(LexError::InvariantViolation {
                message: "indent stack is empty",
                span: self.here(),
            })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(token) => Some(Ok(token)),
            Err(e) => Some(Err(e)),
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_simple_program() {
        let input = indoc! {"
            def add(a, b):
                return a + b
            print(add(1, 2))
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier("add"),
            TokenKind::LParen,
            TokenKind::Identifier("a"),
            TokenKind::Comma,
            TokenKind::Identifier("b"),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Return,
            TokenKind::Identifier("a"),
            TokenKind::Plus,
            TokenKind::Identifier("b"),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("print"),
            TokenKind::LParen,
            TokenKind::Identifier("add"),
            TokenKind::LParen,
            TokenKind::Integer(1),
            TokenKind::Comma,
            TokenKind::Integer(2),
            TokenKind::RParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn tokenizes_float_and_two_char_operators() {
        assert_eq!(
            kinds("x = 1.5 <= 2.25 != 3\n"),
            vec![
                TokenKind::Identifier("x"),
                TokenKind::Assign,
                TokenKind::Float(1.5),
                TokenKind::LessEq,
                TokenKind::Float(2.25),
                TokenKind::NotEq,
                TokenKind::Integer(3),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn integer_dot_is_not_a_float() {
        assert_eq!(
            kinds("xs[0].pop()\n"),
            vec![
                TokenKind::Identifier("xs"),
                TokenKind::LBracket,
                TokenKind::Integer(0),
                TokenKind::RBracket,
                TokenKind::Dot,
                TokenKind::Identifier("pop"),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_whitespace() {
        let input = indoc! {"
            xs = [1,
                  2,
                  3]
            print(xs)
        "};
        let expected = vec![
            TokenKind::Identifier("xs"),
            TokenKind::Assign,
            TokenKind::LBracket,
            TokenKind::Integer(1),
            TokenKind::Comma,
            TokenKind::Integer(2),
            TokenKind::Comma,
            TokenKind::Integer(3),
            TokenKind::RBracket,
            TokenKind::Newline,
            TokenKind::Identifier("print"),
            TokenKind::LParen,
            TokenKind::Identifier("xs"),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn comments_are_skipped() {
        let input = indoc! {"
            # leading comment
            x = 1  # trailing comment
        "};
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Newline,
                TokenKind::Identifier("x"),
                TokenKind::Assign,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn comment_only_line_does_not_change_indentation() {
        let input = indoc! {"
            if true:
                x = 1
            # back at top level
                y = 2
        "};
        let observed = kinds(input);
        let dedents = observed
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(dedents, 1, "only the final dedent should be emitted");
    }

    #[test]
    fn triple_quoted_string_preserves_newlines() {
        let tokens = tokenize("s = \"\"\"a\nb\"\"\"\n").expect("tokenize should succeed");
        assert_eq!(tokens[2].kind, TokenKind::String("a\nb"));
    }

    #[test]
    fn string_keeps_raw_escapes_for_parser() {
        let tokens = tokenize("s = \"a\\\"b\\n\"\n").expect("tokenize should succeed");
        assert_eq!(tokens[2].kind, TokenKind::String("a\\\"b\\n"));
    }

    #[test]
    fn emits_newline_and_dedent_before_eof() {
        let input = "if true:\n    x = 1";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::If,
                TokenKind::True,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier("x"),
                TokenKind::Assign,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn blank_line_does_not_change_indentation() {
        let input = indoc! {"
            if true:
                x = 1

                y = 2
        "};
        let expected = vec![
            TokenKind::If,
            TokenKind::True,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("x"),
            TokenKind::Assign,
            TokenKind::Integer(1),
            TokenKind::Newline,
            TokenKind::Newline,
            TokenKind::Identifier("y"),
            TokenKind::Assign,
            TokenKind::Integer(2),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = indoc! {"
            if true:
                x = 1
              y = 2
        "};
        let err = tokenize(input).expect_err("expected inconsistent dedent failure");
        assert!(matches!(
            err,
            LexError::InvalidDedent {
                found: 2,
                expected: 0,
                ..
            }
        ));
    }

    #[test]
    fn errors_on_tab_indentation() {
        let err = tokenize("if true:\n\tx = 1\n").expect_err("expected tab indentation failure");
        assert!(matches!(err, LexError::TabIndentation { .. }));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = \"abc\n").expect_err("expected unterminated string failure");
        assert!(matches!(err, LexError::UnterminatedString { .. }));
        assert!(err.to_string().contains("line 1, col 5"));
    }

    #[test]
    fn errors_on_unknown_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("unexpected character '@'"));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999\n").expect_err("expected overflow");
        assert!(matches!(err, LexError::IntegerOutOfRange { .. }));
    }

    #[test]
    fn tracks_line_and_column_positions() {
        let tokens = tokenize("x = 1\ny = 2\n").expect("tokenize should succeed");
        let y = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Identifier("y"))
            .expect("y token");
        assert_eq!((y.span.line, y.span.column), (2, 1));
    }
}
