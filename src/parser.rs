use crate::ast::{
    AssignTarget, BinaryOperator, Expression, Program, Statement, StatementKind, UnaryOperator,
};
use crate::error::{SyntaxError, SyntaxResult};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
    block_depth: usize,
    function_name: Option<String>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            position: 0,
            block_depth: 0,
            function_name: None,
        }
    }

    pub fn parse_program(mut self) -> SyntaxResult<Program> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    /// Parses a lone expression, optionally followed by one line break.
    pub fn parse_standalone_expression(mut self) -> SyntaxResult<Expression> {
        self.consume_newlines();
        let expr = self.parse_expression()?;
        self.consume_newlines();
        if !self.at(&TokenKind::EOF) {
            return Err(self.error("end of expression"));
        }
        Ok(expr)
    }

    fn parse_statement(&mut self) -> SyntaxResult<Statement> {
        let line = self.current().span.line;
        let kind = match self.current().kind {
            TokenKind::Def => self.parse_function_def()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                StatementKind::While { condition, body }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Repeat => self.parse_repeat()?,
            TokenKind::Return => {
                if self.function_name.is_none() {
                    return Err(self.error_message("'return' outside of a function"));
                }
                self.advance();
                let value = if self.at(&TokenKind::Newline) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_newline()?;
                StatementKind::Return(value)
            }
            TokenKind::Break => self.parse_keyword_statement(StatementKind::Break)?,
            TokenKind::Continue => self.parse_keyword_statement(StatementKind::Continue)?,
            TokenKind::Pass => self.parse_keyword_statement(StatementKind::Pass)?,
            TokenKind::Indent => return Err(self.error_message("Unexpected indent")),
            _ => self.parse_simple_statement()?,
        };
        Ok(Statement::new(line, kind))
    }

    fn parse_keyword_statement(&mut self, kind: StatementKind) -> SyntaxResult<StatementKind> {
        self.advance();
        self.expect_newline()?;
        Ok(kind)
    }

    fn parse_function_def(&mut self) -> SyntaxResult<StatementKind> {
        if self.block_depth > 0 {
            return Err(self.error_message("Functions can only be defined at the top level"));
        }
        self.expect(&TokenKind::Def, "def")?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen, "(")?;
        let mut params: Vec<String> = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let param = self.expect_identifier()?;
            if params.contains(&param) {
                return Err(self.error_message(format!("Duplicate parameter '{param}'")));
            }
            params.push(param);
            if !self.at(&TokenKind::RParen) {
                self.expect(&TokenKind::Comma, ",")?;
            }
        }
        self.expect(&TokenKind::RParen, ")")?;

        self.function_name = Some(name.clone());
        let body = self.parse_block();
        self.function_name = None;

        Ok(StatementKind::FunctionDef {
            name,
            params,
            body: body?,
        })
    }

    fn parse_if(&mut self) -> SyntaxResult<StatementKind> {
        // Accepts either `if` or `elif` as the leading keyword.
        self.advance();
        let condition = self.parse_expression()?;
        let then_body = self.parse_block()?;
        let else_body = match self.current().kind {
            TokenKind::Elif => {
                let line = self.current().span.line;
                vec![Statement::new(line, self.parse_if()?)]
            }
            TokenKind::Else => {
                self.advance();
                self.parse_block()?
            }
            _ => Vec::new(),
        };
        Ok(StatementKind::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> SyntaxResult<StatementKind> {
        self.expect(&TokenKind::For, "for")?;
        let target = self.expect_identifier()?;
        self.expect(&TokenKind::In, "in")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        match iterable {
            Expression::Call { name, mut args } if name == "range" && (1..=3).contains(&args.len()) => {
                let step = if args.len() == 3 { args.pop() } else { None };
                let (start, end) = if args.len() == 1 {
                    (Expression::Number(0.0), args.remove(0))
                } else {
                    let end = args.remove(1);
                    (args.remove(0), end)
                };
                Ok(StatementKind::ForRange {
                    target,
                    start,
                    end,
                    step,
                    body,
                })
            }
            iterable => Ok(StatementKind::ForEach {
                target,
                iterable,
                body,
            }),
        }
    }

    fn parse_repeat(&mut self) -> SyntaxResult<StatementKind> {
        self.expect(&TokenKind::Repeat, "repeat")?;
        let count = self.parse_expression()?;
        match self.current().kind {
            TokenKind::Identifier("times") => {
                self.advance();
            }
            _ => return Err(self.error("'times'")),
        }
        let body = self.parse_block()?;
        Ok(StatementKind::Repeat { count, body })
    }

    fn parse_simple_statement(&mut self) -> SyntaxResult<StatementKind> {
        let expr = self.parse_expression()?;
        if self.at(&TokenKind::Equal) {
            let target = match expr {
                Expression::Identifier(name) => AssignTarget::Name(name),
                Expression::Index { object, index } => match *object {
                    Expression::Identifier(name) => AssignTarget::Index {
                        name,
                        index: *index,
                    },
                    _ => {
                        return Err(
                            self.error_message("Only variable[index] can be assigned to")
                        );
                    }
                },
                _ => return Err(self.error_message("Cannot assign to this expression")),
            };
            self.advance();
            let value = self.parse_expression()?;
            self.expect_newline()?;
            return Ok(StatementKind::Assign { target, value });
        }
        self.expect_newline()?;
        Ok(StatementKind::Expr(expr))
    }

    fn parse_block(&mut self) -> SyntaxResult<Vec<Statement>> {
        self.expect(&TokenKind::Colon, ":")?;
        self.expect_newline()?;
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
        if !self.at(&TokenKind::Indent) {
            return Err(self.error("an indented block"));
        }
        self.advance();

        self.block_depth += 1;
        let mut body = Vec::new();
        while !matches!(self.current().kind, TokenKind::Dedent | TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            match self.parse_statement() {
                Ok(statement) => body.push(statement),
                Err(error) => {
                    self.block_depth -= 1;
                    return Err(error);
                }
            }
        }
        self.block_depth -= 1;
        self.expect(&TokenKind::Dedent, "dedent")?;
        Ok(body)
    }

    pub fn parse_expression(&mut self) -> SyntaxResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_and()?;
        while self.at(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOperator::Or, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_not()?;
        while self.at(&TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            expr = binary(expr, BinaryOperator::And, right);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> SyntaxResult<Expression> {
        if self.at(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqualEqual => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::Less => BinaryOperator::LessThan,
                TokenKind::LessEqual => BinaryOperator::LessEqual,
                TokenKind::Greater => BinaryOperator::GreaterThan,
                TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> SyntaxResult<Expression> {
        if self.at(&TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            // Fold negative literals so `-3` reads back as a single number.
            if let Expression::Number(value) = operand {
                return Ok(Expression::Number(-value));
            }
            return Ok(Expression::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> SyntaxResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "]")?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    let Expression::Identifier(receiver) = expr else {
                        return Err(
                            self.error_message("Methods can only be called on variables")
                        );
                    };
                    self.advance();
                    let method = self.expect_identifier()?;
                    self.expect(&TokenKind::LParen, "(")?;
                    let args = self.parse_arguments(&TokenKind::RParen, ")")?;
                    expr = Expression::MethodCall {
                        receiver,
                        method,
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> SyntaxResult<Expression> {
        let expr = match &self.current().kind {
            TokenKind::Number(value) => Expression::Number(*value),
            TokenKind::String(value) => Expression::String(value.clone()),
            TokenKind::True => Expression::Boolean(true),
            TokenKind::False => Expression::Boolean(false),
            TokenKind::Null => Expression::Null,
            TokenKind::Identifier(name) => {
                let name = name.to_string();
                self.advance();
                if self.at(&TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_arguments(&TokenKind::RParen, ")")?;
                    return Ok(Expression::Call { name, args });
                }
                return Ok(Expression::Identifier(name));
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, ")")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_arguments(&TokenKind::RBracket, "]")?;
                return Ok(Expression::List(items));
            }
            TokenKind::LBrace => {
                self.advance();
                return self.parse_object();
            }
            _ => return Err(self.error("expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn parse_arguments(
        &mut self,
        close: &TokenKind<'_>,
        close_name: &str,
    ) -> SyntaxResult<Vec<Expression>> {
        let mut args = Vec::new();
        while !self.at(close) {
            args.push(self.parse_expression()?);
            if !self.at(close) {
                self.expect(&TokenKind::Comma, ",")?;
            }
        }
        self.expect(close, close_name)?;
        Ok(args)
    }

    fn parse_object(&mut self) -> SyntaxResult<Expression> {
        let mut entries: Vec<(String, Expression)> = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let key = match &self.current().kind {
                TokenKind::String(key) => key.clone(),
                _ => return Err(self.error("string key")),
            };
            self.advance();
            self.expect(&TokenKind::Colon, ":")?;
            let value = self.parse_expression()?;
            if let Some(entry) = entries.iter_mut().find(|(existing, _)| *existing == key) {
                entry.1 = value;
            } else {
                entries.push((key, value));
            }
            if !self.at(&TokenKind::RBrace) {
                self.expect(&TokenKind::Comma, ",")?;
            }
        }
        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Expression::Object(entries))
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.at(&TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn expect_identifier(&mut self) -> SyntaxResult<String> {
        if let TokenKind::Identifier(name) = self.current().kind {
            let name = name.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect(&mut self, kind: &TokenKind<'_>, expected: &str) -> SyntaxResult<()> {
        if self.at(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("'{expected}'")))
        }
    }

    fn expect_newline(&mut self) -> SyntaxResult<()> {
        if matches!(self.current().kind, TokenKind::Newline | TokenKind::EOF) {
            if self.at(&TokenKind::Newline) {
                self.advance();
            }
            Ok(())
        } else {
            Err(self.error("end of line"))
        }
    }

    fn at(&self, kind: &TokenKind<'_>) -> bool {
        &self.current().kind == kind
    }

    fn current(&self) -> &Token<'a> {
        // tokenize always ends the stream with EOF, so the last token is a safe fallback.
        let index = self.position.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn error(&self, expected: &str) -> SyntaxError {
        let token = self.current();
        SyntaxError::new(
            format!("Expected {expected}, got {}", token.kind.describe()),
            token.span.line,
            token.span.column,
        )
    }

    fn error_message(&self, message: impl Into<String>) -> SyntaxError {
        let span = self.current().span;
        SyntaxError::new(message, span.line, span.column)
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> SyntaxResult<Program> {
    if tokens.is_empty() {
        return Ok(Program::default());
    }
    Parser::new(tokens).parse_program()
}

pub fn parse(input: &str) -> SyntaxResult<Program> {
    parse_tokens(tokenize(input)?)
}

/// Parses `input` as exactly one expression (host predicates, win conditions).
pub fn parse_expression(input: &str) -> SyntaxResult<Expression> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new("Expected expression", 1, 0));
    }
    Parser::new(tokens).parse_standalone_expression()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn identifier(name: &str) -> Expression {
        Expression::Identifier(name.to_string())
    }

    fn number(value: f64) -> Expression {
        Expression::Number(value)
    }

    #[test]
    fn parses_simple_program() {
        let input = indoc! {"
            def go(steps):
                n = steps + 1
                move(\"forward\")
            go(4)
        "};
        let program = parse(input).expect("parse failed");

        let expected = Program {
            statements: vec![
                Statement::new(
                    1,
                    StatementKind::FunctionDef {
                        name: "go".to_string(),
                        params: vec!["steps".to_string()],
                        body: vec![
                            Statement::new(
                                2,
                                StatementKind::Assign {
                                    target: AssignTarget::Name("n".to_string()),
                                    value: binary(identifier("steps"), BinaryOperator::Add, number(1.0)),
                                },
                            ),
                            Statement::new(
                                3,
                                StatementKind::Expr(Expression::Call {
                                    name: "move".to_string(),
                                    args: vec![Expression::String("forward".to_string())],
                                }),
                            ),
                        ],
                    },
                ),
                Statement::new(
                    4,
                    StatementKind::Expr(Expression::Call {
                        name: "go".to_string(),
                        args: vec![number(4.0)],
                    }),
                ),
            ],
        };

        assert_eq!(program, expected);
    }

    #[test]
    fn respects_operator_precedence() {
        let expr = parse_expression("1 + 2 * 3 < 10 and not done").expect("parse failed");
        let expected = binary(
            binary(
                binary(number(1.0), BinaryOperator::Add, binary(number(2.0), BinaryOperator::Mul, number(3.0))),
                BinaryOperator::LessThan,
                number(10.0),
            ),
            BinaryOperator::And,
            Expression::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(identifier("done")),
            },
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn parses_range_loops_and_foreach() {
        let input = indoc! {"
            for i in range(3):
                pass
            for item in items:
                pass
        "};
        let program = parse(input).expect("parse failed");
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::ForRange { target, start: Expression::Number(start), step: None, .. }
                if target == "i" && *start == 0.0
        ));
        assert!(matches!(
            &program.statements[1].kind,
            StatementKind::ForEach { target, iterable: Expression::Identifier(name), .. }
                if target == "item" && name == "items"
        ));
    }

    #[test]
    fn elif_chains_nest_into_else() {
        let input = indoc! {"
            if a:
                x = 1
            elif b:
                x = 2
            else:
                x = 3
        "};
        let program = parse(input).expect("parse failed");
        let StatementKind::If { else_body, .. } = &program.statements[0].kind else {
            panic!("expected if");
        };
        assert_eq!(else_body.len(), 1);
        assert_eq!(else_body[0].line, 3);
        let StatementKind::If { else_body, .. } = &else_body[0].kind else {
            panic!("expected nested if");
        };
        assert_eq!(else_body[0].line, 6);
    }

    #[test]
    fn parses_repeat_index_assignment_and_methods() {
        let input = indoc! {"
            repeat 3 times:
                items.append(1)
            items[0] = {\"a\": [1, 2]}
        "};
        let program = parse(input).expect("parse failed");
        assert!(matches!(program.statements[0].kind, StatementKind::Repeat { .. }));
        assert!(matches!(
            &program.statements[1].kind,
            StatementKind::Assign { target: AssignTarget::Index { name, .. }, value: Expression::Object(_) }
                if name == "items"
        ));
    }

    #[test]
    fn folds_negative_literals() {
        assert_eq!(parse_expression("-5").expect("parse failed"), number(-5.0));
    }

    #[test]
    fn rejects_return_outside_function() {
        let err = parse("return 1\n").expect_err("expected failure");
        assert!(err.message.contains("outside of a function"));
    }

    #[test]
    fn rejects_nested_function_definitions() {
        let input = indoc! {"
            def outer():
                def inner():
                    pass
        "};
        let err = parse(input).expect_err("expected failure");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn reports_line_of_unexpected_token() {
        let err = parse("x = 1\ny = 2 +\n").expect_err("expected failure");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn rejects_missing_block() {
        let err = parse("while true:\npass\n").expect_err("expected failure");
        assert!(err.message.contains("indented block"));
    }

    #[test]
    fn standalone_expression_rejects_statements() {
        assert!(parse_expression("x = 1").is_err());
        assert!(parse_expression("").is_err());
    }
}
