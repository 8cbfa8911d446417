//! Parser for the Monkey programming language using chumsky.

use chumsky::prelude::*;
use chumsky::Stream;

use crate::ast::*;
use crate::errors::{parse_error_to_source_error, SourceError};
use crate::lexer::{lex, Token};

/// Convert chumsky span to our Span
fn to_span(span: std::ops::Range<usize>) -> Span {
    Span::new(span.start, span.end)
}

/// Parser for identifiers.
fn ident() -> impl Parser<Token, Ident, Error = Simple<Token>> + Clone {
    filter_map(|span: std::ops::Range<usize>, tok| match tok {
        Token::Ident(s) => Ok(Spanned::new(s, to_span(span))),
        _ => Err(Simple::expected_input_found(span, vec![], Some(tok))),
    })
}

/// A single postfix operation: call arguments, an index, or a selector.
enum Postfix {
    Call(Vec<Expr>, Span),
    Index(Expr, Span),
    Selector(Ident),
}

fn parser() -> impl Parser<Token, Program, Error = Simple<Token>> {
    let stmt = recursive(|stmt| {
        let block = stmt
            .clone()
            .repeated()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with_span(|statements, span| Block {
                statements,
                span: to_span(span),
            });

        let expr = recursive(|expr| {
            let int = filter_map(|span: std::ops::Range<usize>, tok| match tok {
                Token::Int(n) => Ok(Expr::Integer(n, to_span(span))),
                _ => Err(Simple::expected_input_found(span, vec![], Some(tok))),
            });

            let string = filter_map(|span: std::ops::Range<usize>, tok| match tok {
                Token::Str(s) => Ok(Expr::Str(s, to_span(span))),
                _ => Err(Simple::expected_input_found(span, vec![], Some(tok))),
            });

            let boolean = just(Token::True)
                .map_with_span(|_, span| Expr::Boolean(true, to_span(span)))
                .or(just(Token::False)
                    .map_with_span(|_, span| Expr::Boolean(false, to_span(span))));

            let null = just(Token::Null).map_with_span(|_, span| Expr::Null(to_span(span)));

            let identifier = ident().map(Expr::Ident);

            let array = expr
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map_with_span(|elements, span| Expr::Array(elements, to_span(span)));

            let hash = expr
                .clone()
                .then_ignore(just(Token::Colon))
                .then(expr.clone())
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .delimited_by(just(Token::LBrace), just(Token::RBrace))
                .map_with_span(|pairs, span| Expr::Hash(pairs, to_span(span)));

            let grouped = expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen));

            let function = just(Token::Fn)
                .ignore_then(
                    ident()
                        .separated_by(just(Token::Comma))
                        .allow_trailing()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .then(block.clone())
                .map_with_span(|(parameters, body), span| {
                    Expr::Function(FunctionLit {
                        name: None,
                        parameters,
                        body,
                        span: to_span(span),
                    })
                });

            // `else` accepts either a block or another if-expression, so
            // `else if` chains parse without explicit braces.
            let if_expr = recursive(|if_expr| {
                just(Token::If)
                    .ignore_then(
                        expr.clone()
                            .delimited_by(just(Token::LParen), just(Token::RParen)),
                    )
                    .then(block.clone())
                    .then(
                        just(Token::Else)
                            .ignore_then(block.clone().or(if_expr.map(|nested: Expr| {
                                let span = nested.span();
                                Block {
                                    statements: vec![Stmt::Expr(nested)],
                                    span,
                                }
                            })))
                            .or_not(),
                    )
                    .map_with_span(|((condition, consequence), alternative), span| Expr::If {
                        condition: Box::new(condition),
                        consequence,
                        alternative,
                        span: to_span(span),
                    })
            });

            let while_expr = just(Token::While)
                .ignore_then(
                    expr.clone()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .then(block.clone())
                .map_with_span(|(condition, body), span| Expr::While {
                    condition: Box::new(condition),
                    body,
                    span: to_span(span),
                });

            let atom = choice((
                int, string, boolean, null, function, if_expr, while_expr, array, hash,
                grouped, identifier,
            ));

            // Postfix: calls, indexing and `.name` selector sugar.
            let call_args = expr
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map_with_span(|arguments, span| Postfix::Call(arguments, to_span(span)));

            let index = expr
                .clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map_with_span(|idx, span| Postfix::Index(idx, to_span(span)));

            let selector = just(Token::Dot).ignore_then(ident()).map(Postfix::Selector);

            let postfix = atom
                .then(choice((call_args, index, selector)).repeated())
                .foldl(|left, post| match post {
                    Postfix::Call(arguments, span) => Expr::Call {
                        span: left.span().merge(span),
                        function: Box::new(left),
                        arguments,
                    },
                    Postfix::Index(idx, span) => Expr::Index {
                        span: left.span().merge(span),
                        left: Box::new(left),
                        index: Box::new(idx),
                    },
                    Postfix::Selector(name) => Expr::Index {
                        span: left.span().merge(name.span),
                        left: Box::new(left),
                        index: Box::new(Expr::Str(name.node, name.span)),
                    },
                });

            let prefix_op = choice((
                just(Token::Bang).to(PrefixOp::Not),
                just(Token::Tilde).to(PrefixOp::BitNot),
                just(Token::Minus).to(PrefixOp::Neg),
            ));

            let unary = prefix_op
                .map_with_span(|op, span| (op, to_span(span)))
                .repeated()
                .then(postfix)
                .foldr(|(op, span), right| {
                    let span = span.merge(right.span());
                    Expr::Prefix(op, Box::new(right), span)
                });

            macro_rules! binary_level {
                ($inner:expr, $($token:pat => $op:expr),+ $(,)?) => {
                    $inner
                        .clone()
                        .then(
                            filter_map(|span: std::ops::Range<usize>, tok| match tok {
                                $($token => Ok($op),)+
                                _ => Err(Simple::expected_input_found(span, vec![], Some(tok))),
                            })
                            .then($inner)
                            .repeated(),
                        )
                        .foldl(|left: Expr, (op, right): (InfixOp, Expr)| {
                            let span = left.span().merge(right.span());
                            Expr::Infix(op, Box::new(left), Box::new(right), span)
                        })
                };
            }

            let product = binary_level!(
                unary,
                Token::Star => InfixOp::Mul,
                Token::Slash => InfixOp::Div,
                Token::Percent => InfixOp::Mod,
            );
            let sum = binary_level!(
                product,
                Token::Plus => InfixOp::Add,
                Token::Minus => InfixOp::Sub,
            );
            let comparison = binary_level!(
                sum,
                Token::Lt => InfixOp::Lt,
                Token::Gt => InfixOp::Gt,
                Token::LtEq => InfixOp::LtEq,
                Token::GtEq => InfixOp::GtEq,
            );
            let equality = binary_level!(
                comparison,
                Token::EqEq => InfixOp::Eq,
                Token::NotEq => InfixOp::NotEq,
            );
            let bit_and = binary_level!(equality, Token::Amp => InfixOp::BitAnd);
            let bit_xor = binary_level!(bit_and, Token::Caret => InfixOp::BitXor);
            let bit_or = binary_level!(bit_xor, Token::Pipe => InfixOp::BitOr);
            let logic_and = binary_level!(bit_or, Token::AndAnd => InfixOp::And);
            let logic_or = binary_level!(logic_and, Token::OrOr => InfixOp::Or);

            // Bind and assignment sit at the lowest precedence. The
            // right-hand side recurses through the whole expression
            // grammar, making them right-associative.
            logic_or
                .then(
                    choice((
                        just(Token::Bind).to(true),
                        just(Token::Assign).to(false),
                    ))
                    .then(expr.clone())
                    .or_not(),
                )
                .map(|(target, tail)| match tail {
                    None => target,
                    Some((is_bind, value)) => {
                        let span = target.span().merge(value.span());
                        if is_bind {
                            let mut value = value;
                            if let (Expr::Ident(name), Expr::Function(func)) =
                                (&target, &mut value)
                            {
                                if func.name.is_none() {
                                    func.name = Some(name.node.clone());
                                }
                            }
                            Expr::Bind {
                                target: Box::new(target),
                                value: Box::new(value),
                                span,
                            }
                        } else {
                            Expr::Assign {
                                target: Box::new(target),
                                value: Box::new(value),
                                span,
                            }
                        }
                    }
                })
        });

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone())
            .map_with_span(|value, span| Stmt::Return(value, to_span(span)));

        let expr_stmt = expr.map(Stmt::Expr);

        choice((return_stmt, expr_stmt)).then_ignore(just(Token::Semicolon).repeated())
    });

    stmt.repeated()
        .then_ignore(end())
        .map(|statements| Program { statements })
}

/// Parse source code into a Program, collecting any parse errors.
pub fn parse(source: &str) -> (Option<Program>, Vec<SourceError>) {
    let tokens: Vec<_> = lex(source).collect();
    let eoi = source.len()..source.len();
    let (program, errors) = parser().parse_recovery(Stream::from_iter(eoi, tokens.into_iter()));
    let errors = errors.iter().map(parse_error_to_source_error).collect();
    (program, errors)
}
