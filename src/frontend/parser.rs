use std::rc::Rc;

use colored::Colorize;

use crate::frontend::{
    SourceFile,
    ast::{BinaryOperatorKind, ComparisonOperatorKind, Node, NodeKind, PrintKind, VarType},
    lexer::{Keyword, Lexer, Span, Token, TokenKind},
};

#[cfg(feature = "error-backtrace")]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

macro_rules! report_fatal_error {
    ($self:expr, $span:expr, $($fmt:tt)+) => {{
        let message = format!("{}: {}", "error".red(), format!($($fmt)+));

        #[cfg(feature = "error-backtrace")]
        let message = format!(
            "{}: {}\n{}",
            "backtrace".blue(),
            format!(
                "{}::{} {}",
                module_path!(),
                function!(),
                format!("(at {}:{}:{})", file!(), line!(), column!()).white()
            ),
            message
        );

        $self.fatal($span, &message)
    }};
}

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    pub fn parse_program(source_file: &'source SourceFile) -> Rc<Node> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
        };

        let mut statements = Vec::new();

        while !parser.lexer.is_eof() && parser.lexer.peek().is_some() {
            statements.push(parser.parse_statement());
        }

        chain_statements(statements, Span::new(0, source_file.contents.len()))
    }

    fn fatal(&self, offending_span: Span, message: &str) -> ! {
        eprintln!(
            "{} ({}:{}:{})",
            message,
            self.lexer.source().origin,
            self.lexer.source().row_for_position(offending_span.start),
            self.lexer.source().column_for_position(offending_span.start)
        );
        std::process::exit(1);
    }

    fn eof_span(&self) -> Span {
        let end = self.lexer.source().contents.len();
        Span::new(end, end)
    }

    fn value_of(&self, token: &Token) -> String {
        self.lexer.source().value_of_span(token.span).to_owned()
    }

    fn expect_peek(&mut self, expecting: &str) -> Token {
        let Some(token) = self.lexer.peek() else {
            report_fatal_error!(
                self,
                self.eof_span(),
                "Expected {expecting} but reached end of file"
            )
        };

        token
    }

    fn expect_next(&mut self, expecting: &str) -> Token {
        let Some(token) = self.lexer.next() else {
            report_fatal_error!(
                self,
                self.eof_span(),
                "Expected {expecting} but reached end of file"
            )
        };

        token
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> Token {
        let token = self.expect_next(&format!("{kind:?}"));

        if token.kind != kind {
            report_fatal_error!(
                self,
                token.span,
                "Expected {:?} but found {:?} ({})",
                kind,
                token.kind,
                self.lexer.source().value_of_span(token.span)
            )
        }

        token
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Token {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn parse_statement(&mut self) -> Rc<Node> {
        let peeked = self.expect_peek("a statement");

        match peeked.kind {
            TokenKind::Keyword(Keyword::Int) | TokenKind::Keyword(Keyword::String) => {
                self.parse_declaration()
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Print) => self.parse_print(Keyword::Print, PrintKind::Int),
            TokenKind::Keyword(Keyword::Prints) => self.parse_print(Keyword::Prints, PrintKind::Str),
            TokenKind::Identifier => self.parse_assignment(),
            _ => report_fatal_error!(
                self,
                peeked.span,
                "Expected a statement but found: {} ({:?})",
                self.lexer.source().value_of_span(peeked.span),
                peeked.kind
            ),
        }
    }

    /// int a, b; — or — int a = expr; — or — string s = "text";
    fn parse_declaration(&mut self) -> Rc<Node> {
        let keyword = self.expect_next("a type keyword");

        let ty = match keyword.kind {
            TokenKind::Keyword(Keyword::Int) => VarType::Int,
            TokenKind::Keyword(Keyword::String) => VarType::Str,
            _ => unreachable!("parse_declaration called without a type keyword"),
        };

        let mut names = Vec::new();
        let first = self.expect_next_to_be(TokenKind::Identifier);
        names.push(self.value_of(&first));

        while self.expect_peek("`,`, `=`, or `;`").kind == TokenKind::Comma {
            self.expect_next_to_be(TokenKind::Comma);
            let name = self.expect_next_to_be(TokenKind::Identifier);
            names.push(self.value_of(&name));
        }

        let initializer = (self.expect_peek("`=` or `;`").kind == TokenKind::Equals).then(|| {
            self.expect_next_to_be(TokenKind::Equals);
            self.parse_expression()
        });

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon);

        Rc::new(Node {
            span: Span::new(keyword.span.start, semicolon.span.end),
            kind: NodeKind::Declaration {
                ty,
                names,
                initializer,
            },
        })
    }

    /// name = expr;
    fn parse_assignment(&mut self) -> Rc<Node> {
        let name = self.expect_next_to_be(TokenKind::Identifier);

        self.expect_next_to_be(TokenKind::Equals);
        let value = self.parse_expression();
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon);

        Rc::new(Node {
            span: Span::new(name.span.start, semicolon.span.end),
            kind: NodeKind::Assignment {
                name: self.value_of(&name),
                value,
            },
        })
    }

    /// if (cond) { ... } — optionally followed by — else { ... }
    fn parse_if(&mut self) -> Rc<Node> {
        let if_keyword = self.expect_keyword(Keyword::If);

        self.expect_next_to_be(TokenKind::OpenParen);
        let condition = self.parse_condition();
        self.expect_next_to_be(TokenKind::CloseParen);

        let then_body = self.parse_block();

        let else_body = (self
            .lexer
            .peek()
            .is_some_and(|token| token.kind == TokenKind::Keyword(Keyword::Else)))
        .then(|| {
            self.expect_keyword(Keyword::Else);
            self.parse_block()
        });

        let end = else_body
            .as_ref()
            .map(|body| body.span.end)
            .unwrap_or(then_body.span.end);

        Rc::new(Node {
            span: Span::new(if_keyword.span.start, end),
            kind: NodeKind::If {
                condition,
                then_body,
                else_body,
            },
        })
    }

    /// while (cond) { ... }
    fn parse_while(&mut self) -> Rc<Node> {
        let while_keyword = self.expect_keyword(Keyword::While);

        self.expect_next_to_be(TokenKind::OpenParen);
        let condition = self.parse_condition();
        self.expect_next_to_be(TokenKind::CloseParen);

        let body = self.parse_block();

        Rc::new(Node {
            span: Span::new(while_keyword.span.start, body.span.end),
            kind: NodeKind::While { condition, body },
        })
    }

    /// print(expr); — or — prints(expr);
    fn parse_print(&mut self, keyword: Keyword, kind: PrintKind) -> Rc<Node> {
        let print_keyword = self.expect_keyword(keyword);

        self.expect_next_to_be(TokenKind::OpenParen);
        let payload = self.parse_expression();
        self.expect_next_to_be(TokenKind::CloseParen);
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon);

        Rc::new(Node {
            span: Span::new(print_keyword.span.start, semicolon.span.end),
            kind: NodeKind::Print { kind, payload },
        })
    }

    /// expr cmp expr
    fn parse_condition(&mut self) -> Rc<Node> {
        let lhs = self.parse_expression();

        let operator_token = self.expect_next("a comparison operator");

        let operator = match operator_token.kind {
            TokenKind::DoubleEquals => ComparisonOperatorKind::Equals,
            TokenKind::NotEquals => ComparisonOperatorKind::NotEquals,
            TokenKind::LessThan => ComparisonOperatorKind::LessThan,
            TokenKind::LessThanOrEqualTo => ComparisonOperatorKind::LessThanOrEqualTo,
            TokenKind::GreaterThan => ComparisonOperatorKind::GreaterThan,
            TokenKind::GreaterThanOrEqualTo => ComparisonOperatorKind::GreaterThanOrEqualTo,
            _ => report_fatal_error!(
                self,
                operator_token.span,
                "Expected a comparison operator but found {:?} ({})",
                operator_token.kind,
                self.lexer.source().value_of_span(operator_token.span)
            ),
        };

        let rhs = self.parse_expression();

        Rc::new(Node {
            span: Span::new(lhs.span.start, rhs.span.end),
            kind: NodeKind::Condition { lhs, operator, rhs },
        })
    }

    fn parse_block(&mut self) -> Rc<Node> {
        let open = self.expect_next_to_be(TokenKind::OpenBrace);

        let mut statements = Vec::new();

        while self.expect_peek("a statement or `}`").kind != TokenKind::CloseBrace {
            statements.push(self.parse_statement());
        }

        let close = self.expect_next_to_be(TokenKind::CloseBrace);

        chain_statements(statements, Span::new(open.span.start, close.span.end))
    }

    fn parse_expression(&mut self) -> Rc<Node> {
        let mut lhs = self.parse_term();

        while self
            .lexer
            .peek()
            .is_some_and(|token| token.kind.is_term_operator())
        {
            let operator_token = self.expect_next("an operator");
            let operator = match operator_token.kind {
                TokenKind::Plus => BinaryOperatorKind::Add,
                TokenKind::Minus => BinaryOperatorKind::Subtract,
                _ => unreachable!(),
            };

            let rhs = self.parse_term();

            lhs = Rc::new(Node {
                span: Span::new(lhs.span.start, rhs.span.end),
                kind: NodeKind::Binary { lhs, operator, rhs },
            });
        }

        lhs
    }

    fn parse_term(&mut self) -> Rc<Node> {
        let mut lhs = self.parse_factor();

        while self
            .lexer
            .peek()
            .is_some_and(|token| token.kind.is_factor_operator())
        {
            let operator_token = self.expect_next("an operator");
            let operator = match operator_token.kind {
                TokenKind::Asterisk => BinaryOperatorKind::Multiply,
                TokenKind::Divide => BinaryOperatorKind::Divide,
                _ => unreachable!(),
            };

            let rhs = self.parse_factor();

            lhs = Rc::new(Node {
                span: Span::new(lhs.span.start, rhs.span.end),
                kind: NodeKind::Binary { lhs, operator, rhs },
            });
        }

        lhs
    }

    fn parse_factor(&mut self) -> Rc<Node> {
        let token = self.expect_next("an expression");

        match token.kind {
            TokenKind::IntegerLiteral => Rc::new(Node {
                span: token.span,
                kind: NodeKind::Number(self.value_of(&token)),
            }),
            // A negative literal is a single number node; the language has no
            // general unary minus
            TokenKind::Minus => {
                let literal = self.expect_next_to_be(TokenKind::IntegerLiteral);

                Rc::new(Node {
                    span: Span::new(token.span.start, literal.span.end),
                    kind: NodeKind::Number(format!("-{}", self.value_of(&literal))),
                })
            }
            TokenKind::Identifier => Rc::new(Node {
                span: token.span,
                kind: NodeKind::Identifier(self.value_of(&token)),
            }),
            TokenKind::StringLiteral => {
                let raw = self.value_of(&token);

                Rc::new(Node {
                    span: token.span,
                    kind: NodeKind::StringLiteral(raw[1..raw.len() - 1].to_owned()),
                })
            }
            TokenKind::OpenParen => {
                let expression = self.parse_expression();
                self.expect_next_to_be(TokenKind::CloseParen);

                expression
            }
            _ => report_fatal_error!(
                self,
                token.span,
                "Expected an expression but found {:?} ({})",
                token.kind,
                self.lexer.source().value_of_span(token.span)
            ),
        }
    }
}

/// Folds parsed statements into the right-leaning sequence chain lowering
/// walks. An empty list becomes an empty sequence node; a single statement
/// needs no wrapper.
fn chain_statements(statements: Vec<Rc<Node>>, span: Span) -> Rc<Node> {
    let mut statements = statements.into_iter().rev();

    let Some(last) = statements.next() else {
        return Rc::new(Node {
            span,
            kind: NodeKind::Sequence {
                first: None,
                second: None,
            },
        });
    };

    statements.fold(last, |chain, statement| {
        Rc::new(Node {
            span: Span::new(statement.span.start, chain.span.end),
            kind: NodeKind::Sequence {
                first: Some(statement),
                second: Some(chain),
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::SourceFileOrigin;

    fn parse(contents: &str) -> Rc<Node> {
        let source = SourceFile {
            contents: contents.to_owned(),
            origin: SourceFileOrigin::Memory,
        };

        Parser::parse_program(&source)
    }

    #[test]
    fn statements_chain_in_order() {
        let root = parse("int a; a = 1;");

        let NodeKind::Sequence {
            first: Some(first),
            second: Some(second),
        } = &root.kind
        else {
            panic!("expected a sequence, got {:?}", root.kind);
        };

        assert!(matches!(&first.kind, NodeKind::Declaration { .. }));
        assert!(matches!(&second.kind, NodeKind::Assignment { .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let root = parse("int x = 1 + 2 * 3;");

        let NodeKind::Declaration {
            initializer: Some(initializer),
            ..
        } = &root.kind
        else {
            panic!("expected a declaration with initializer");
        };

        let NodeKind::Binary { lhs, operator, rhs } = &initializer.kind else {
            panic!("expected a binary node");
        };

        assert_eq!(*operator, BinaryOperatorKind::Add);
        assert!(matches!(&lhs.kind, NodeKind::Number(n) if n == "1"));
        assert!(matches!(
            &rhs.kind,
            NodeKind::Binary {
                operator: BinaryOperatorKind::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn if_with_else_branch() {
        let root = parse("int a; if (a < 1) { a = 2; } else { a = 3; }");

        let NodeKind::Sequence {
            second: Some(second),
            ..
        } = &root.kind
        else {
            panic!("expected a sequence");
        };

        let NodeKind::If {
            condition,
            else_body,
            ..
        } = &second.kind
        else {
            panic!("expected an if, got {:?}", second.kind);
        };

        assert!(matches!(
            &condition.kind,
            NodeKind::Condition {
                operator: ComparisonOperatorKind::LessThan,
                ..
            }
        ));
        assert!(else_body.is_some());
    }

    #[test]
    fn negative_literals_parse_as_numbers() {
        let root = parse("int x = -5;");

        let NodeKind::Declaration {
            initializer: Some(initializer),
            ..
        } = &root.kind
        else {
            panic!("expected a declaration with initializer");
        };

        assert!(matches!(&initializer.kind, NodeKind::Number(n) if n == "-5"));
    }

    #[test]
    fn string_literal_quotes_are_stripped() {
        let root = parse("prints(\"hi\");");

        let NodeKind::Print { payload, .. } = &root.kind else {
            panic!("expected a print statement");
        };

        assert!(matches!(&payload.kind, NodeKind::StringLiteral(s) if s == "hi"));
    }
}
