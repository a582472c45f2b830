use std::{iter::Peekable, str::CharIndices};

use crate::error::{SyntaxError, SyntaxResult};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    at_line_start: bool,
    eof_reached: bool,
    line_has_content: bool,
    bracket_depth: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            at_line_start: true,
            eof_reached: false,
            line_has_content: false,
            bracket_depth: 0,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> SyntaxResult<Token<'a>> {
        if let Some(token) = self.pending_tokens.pop() {
            return Ok(token);
        }

        if self.eof_reached {
            return Ok(Token::new(TokenKind::EOF, self.here()));
        }

        if self.at_line_start {
            self.at_line_start = false;
            let indent_level = self.count_indentation()?;
            let current_indent = self.current_indent();
            let span = self.here();

            if indent_level > current_indent {
                self.indent_stack.push(indent_level);
                return Ok(Token::new(TokenKind::Indent, span));
            } else if indent_level < current_indent {
                while let Some(&top) = self.indent_stack.last() {
                    if top > indent_level {
                        self.indent_stack.pop();
                        self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                    } else {
                        break;
                    }
                }
                if self.current_indent() != indent_level {
                    return Err(SyntaxError::new(
                        format!("Invalid dedent to {indent_level} spaces"),
                        self.line,
                        self.column,
                    ));
                }
                if let Some(token) = self.pending_tokens.pop() {
                    return Ok(token);
                }
            }
        }

        self.skip_whitespace_and_comments()?;

        let (start_idx, ch) = match self.chars.peek() {
            Some(&(idx, c)) => (idx, c),
            None => return Ok(self.finish_input()),
        };

        let start_line = self.line;
        let start_column = self.column;
        let single = |kind: TokenKind<'a>| {
            Token::new(
                kind,
                Span {
                    start: start_idx,
                    end: start_idx + 1,
                    line: start_line,
                    column: start_column,
                },
            )
        };

        let token = match ch {
            '\n' => {
                self.advance_char();
                self.at_line_start = true;
                self.line_has_content = false;
                return Ok(single(TokenKind::Newline));
            }
            '=' | '!' | '<' | '>' => {
                return self.read_comparison(ch, start_idx, start_line, start_column);
            }
            '+' => self.take(single(TokenKind::Plus)),
            '-' => self.take(single(TokenKind::Minus)),
            '*' => self.take(single(TokenKind::Star)),
            '/' => self.take(single(TokenKind::Slash)),
            '%' => self.take(single(TokenKind::Percent)),
            ':' => self.take(single(TokenKind::Colon)),
            ',' => self.take(single(TokenKind::Comma)),
            '.' => self.take(single(TokenKind::Dot)),
            '(' | '[' | '{' => {
                self.bracket_depth += 1;
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                };
                self.take(single(kind))
            }
            ')' | ']' | '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                let kind = match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                };
                self.take(single(kind))
            }
            '"' => self.read_string(start_idx, start_line, start_column)?,
            c if c.is_alphabetic() || c == '_' => {
                self.read_identifier(start_idx, start_line, start_column)
            }
            c if c.is_ascii_digit() => self.read_number(start_idx, start_line, start_column)?,
            _ => {
                return Err(SyntaxError::new(
                    format!("Unexpected character '{ch}'"),
                    start_line,
                    start_column,
                ));
            }
        };
        self.line_has_content = true;
        Ok(token)
    }

    /// Closes the last logical line, unwinds open blocks, then reports EOF.
    fn finish_input(&mut self) -> Token<'a> {
        self.eof_reached = true;
        let span = self.here();
        self.pending_tokens.push(Token::new(TokenKind::EOF, span));
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.line_has_content {
            self.line_has_content = false;
            self.pending_tokens.push(Token::new(TokenKind::Newline, span));
        }
        // Pending tokens are popped from the back; EOF was pushed first.
        self.pending_tokens
            .pop()
            .unwrap_or_else(|| Token::new(TokenKind::EOF, span))
    }

    fn take(&mut self, token: Token<'a>) -> Token<'a> {
        self.advance_char();
        token
    }

    fn count_indentation(&mut self) -> SyntaxResult<usize> {
        let mut count = 0;

        // Blank and comment-only lines never open or close blocks.
        let mut temp_chars = self.chars.clone();
        let mut is_blank_line = false;
        while let Some(&(_, c)) = temp_chars.peek() {
            match c {
                ' ' => {
                    temp_chars.next();
                }
                '\t' => {
                    return Err(SyntaxError::new(
                        "Tabs are not supported for indentation",
                        self.line,
                        self.column,
                    ));
                }
                '\r' | '\n' | '#' => {
                    is_blank_line = true;
                    break;
                }
                _ => break,
            }
        }
        if temp_chars.peek().is_none() {
            is_blank_line = true;
        }

        if is_blank_line {
            return Ok(self.current_indent());
        }

        while let Some(&(_, c)) = self.chars.peek() {
            if c == ' ' {
                self.advance_char();
                count += 1;
            } else {
                break;
            }
        }

        Ok(count)
    }

    fn skip_whitespace_and_comments(&mut self) -> SyntaxResult<()> {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '\n' if self.bracket_depth > 0 => {
                    self.advance_char();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_comparison(
        &mut self,
        first: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> SyntaxResult<Token<'a>> {
        self.advance_char();
        let followed_by_equal = matches!(self.chars.peek(), Some(&(_, '=')));
        if followed_by_equal {
            self.advance_char();
        }
        let kind = match (first, followed_by_equal) {
            ('=', true) => TokenKind::EqualEqual,
            ('=', false) => TokenKind::Equal,
            ('!', true) => TokenKind::NotEqual,
            ('<', true) => TokenKind::LessEqual,
            ('<', false) => TokenKind::Less,
            ('>', true) => TokenKind::GreaterEqual,
            ('>', false) => TokenKind::Greater,
            _ => {
                return Err(SyntaxError::new(
                    "Unexpected character '!' (use 'not' or '!=')",
                    line,
                    column,
                ));
            }
        };
        self.line_has_content = true;
        Ok(Token::new(
            kind,
            Span {
                start,
                end: start + if followed_by_equal { 2 } else { 1 },
                line,
                column,
            },
        ))
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = match ident {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "repeat" => TokenKind::Repeat,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "pass" => TokenKind::Pass,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" | "True" => TokenKind::True,
            "false" | "False" => TokenKind::False,
            "null" | "None" => TokenKind::Null,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(
            kind,
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> SyntaxResult<Token<'a>> {
        self.advance_char(); // Consume first digit
        let mut seen_dot = false;
        loop {
            match self.chars.peek() {
                Some(&(_, c)) if c.is_ascii_digit() => {
                    self.advance_char();
                }
                Some(&(idx, '.')) if !seen_dot => {
                    // Only a dot followed by a digit belongs to the literal.
                    let next_is_digit = self.input[idx + 1..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_digit());
                    if !next_is_digit {
                        break;
                    }
                    seen_dot = true;
                    self.advance_char();
                }
                _ => break,
            }
        }

        let end_idx = self.current_index();
        let literal = &self.input[start..end_idx];
        let value = literal.parse::<f64>().map_err(|_| {
            SyntaxError::new(format!("Invalid number literal '{literal}'"), line, column)
        })?;
        Ok(Token::new(
            TokenKind::Number(value),
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        ))
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> SyntaxResult<Token<'a>> {
        self.advance_char(); // Consume opening quote
        let mut value = String::new();
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '"' => {
                    self.advance_char(); // Consume closing quote
                    return Ok(Token::new(
                        TokenKind::String(value),
                        Span {
                            start,
                            end: idx + 1,
                            line,
                            column,
                        },
                    ));
                }
                '\n' => break,
                '\\' => {
                    self.advance_char();
                    let escaped = match self.advance_char() {
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, '"')) => '"',
                        Some((_, '\\')) => '\\',
                        Some((_, other)) => {
                            return Err(SyntaxError::new(
                                format!("Unknown escape sequence '\\{other}'"),
                                self.line,
                                self.column,
                            ));
                        }
                        None => break,
                    };
                    value.push(escaped);
                }
                _ => {
                    value.push(c);
                    self.advance_char();
                }
            }
        }
        Err(SyntaxError::new("Unterminated string literal", line, column))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = SyntaxResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_token())
    }
}

impl Lexer<'_> {
    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn here(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }
}

pub fn tokenize(input: &str) -> SyntaxResult<Vec<Token<'_>>> {
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
    fn test_simple_program() {
        let input = indoc! {"
            def go(n):
                move(\"forward\")
            go(2)
        "};
        let expected_tokens = vec![
            TokenKind::Def,
            TokenKind::Identifier("go"),
            TokenKind::LParen,
            TokenKind::Identifier("n"),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("move"),
            TokenKind::LParen,
            TokenKind::String("forward".to_string()),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("go"),
            TokenKind::LParen,
            TokenKind::Number(2.0),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn comments_and_blank_lines_keep_line_numbers() {
        let input = indoc! {"
            # setup
            x = 1

                # indented comment
            y = 2.5
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let y = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Identifier("y"))
            .expect("y token");
        assert_eq!(y.span.line, 5);
        assert!(tokens.iter().all(|token| token.kind != TokenKind::Indent));
        assert!(tokens.iter().any(|token| token.kind == TokenKind::Number(2.5)));
    }

    #[test]
    fn brackets_join_lines() {
        let input = "items = [1,\n    2]\n";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Identifier("items"),
                TokenKind::Equal,
                TokenKind::LBracket,
                TokenKind::Number(1.0),
                TokenKind::Comma,
                TokenKind::Number(2.0),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn missing_trailing_newline_still_closes_blocks() {
        assert_eq!(
            kinds("while true:\n    pass"),
            vec![
                TokenKind::While,
                TokenKind::True,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Pass,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn lexes_two_character_operators() {
        assert_eq!(
            kinds("a <= b != c\n"),
            vec![
                TokenKind::Identifier("a"),
                TokenKind::LessEqual,
                TokenKind::Identifier("b"),
                TokenKind::NotEqual,
                TokenKind::Identifier("c"),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(
            kinds("\"a\\\"b\\n\"\n")[0],
            TokenKind::String("a\"b\n".to_string())
        );
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = indoc! {"
            if x:
                    y = 1
                z = 2
        "};
        let err = tokenize(input).expect_err("expected dedent failure");
        assert!(err.message.contains("Invalid dedent"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("say(\"hello)\n").expect_err("expected string failure");
        assert_eq!(err.message, "Unterminated string literal");
    }

    #[test]
    fn errors_on_tab_indentation() {
        let err = tokenize("if x:\n\ty = 1\n").expect_err("expected tab failure");
        assert!(err.message.contains("Tabs"));
    }
}
