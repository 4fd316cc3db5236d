//! Recursive descent parser that builds box-tree expressions from a slice of
//! tokens, using a single token of lookahead.
//!
//! ```text
//! statement   := IMPORT | IDENT ':=' term | term
//! term        := primary primary*
//! primary     := IDENT
//!              | '(' '\' IDENT+ '.' term ')'
//!              | '(' term ')'
//! ```

use thiserror::Error;

use crate::box_tree_impl::box_tree_ast::ExprNode;
use crate::lexical_analysis::{Token, TokenClass};

/// Default ceiling on how deeply one form may nest, counting parentheses as
/// well as the abstractions and applications of the tree built from it.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Represents a parsing error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("expected {expected} but found {found} at line {line_num}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line_num: usize,
        column: usize,
    },
    #[error("lambda without parameters at line {line_num}, column {column}")]
    EmptyParameterList { line_num: usize, column: usize },
    #[error("missing body at line {line_num}, column {column}")]
    EmptyBody { line_num: usize, column: usize },
    #[error("expression nested deeper than {limit} levels at line {line_num}, column {column}")]
    NestingTooDeep {
        limit: usize,
        line_num: usize,
        column: usize,
    },
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
}

impl ParseError {
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::UnexpectedToken {
                line_num, column, ..
            }
            | ParseError::NestingTooDeep {
                line_num, column, ..
            }
            | ParseError::EmptyParameterList { line_num, column }
            | ParseError::EmptyBody { line_num, column } => return Some((*line_num, *column)),
            ParseError::UnexpectedEndOfInput => return None,
        }
    }
}

// How many parentheses enclose the rule being parsed, and the ceiling that
// both this count and the height of every built subtree must stay within.
#[derive(Debug, Clone, Copy)]
struct Nesting {
    depth: usize,
    limit: usize,
}

impl Nesting {
    fn too_deep(self, token: &Token) -> ParseError {
        return ParseError::NestingTooDeep {
            limit: self.limit,
            line_num: token.line_num,
            column: token.column,
        };
    }

    fn enter(self, token: &Token) -> Result<Nesting, ParseError> {
        if self.depth >= self.limit {
            return Err(self.too_deep(token));
        }

        return Ok(Nesting {
            depth: self.depth + 1,
            ..self
        });
    }

    fn check_height(self, height: usize, token: &Token) -> Result<usize, ParseError> {
        if height > self.limit {
            return Err(self.too_deep(token));
        }

        return Ok(height);
    }
}

// A parsed subtree and its height. Vars have height 1.
struct Subtree {
    expr_node: ExprNode,
    height: usize,
}

fn describe_token(token: &Token) -> String {
    match token.token_class {
        TokenClass::Identifier => return format!("identifier `{}`", token.token_text),
        token_class => return String::from(token_class.describe()),
    }
}

fn unexpected_token(token: &Token, expected: &str) -> ParseError {
    return ParseError::UnexpectedToken {
        expected: String::from(expected),
        found: describe_token(token),
        line_num: token.line_num,
        column: token.column,
    };
}

fn peek_token(tokens: &[Token], cursor: usize) -> Result<&Token, ParseError> {
    return tokens.get(cursor).ok_or(ParseError::UnexpectedEndOfInput);
}

fn peek_class(tokens: &[Token], cursor: usize) -> Option<TokenClass> {
    return tokens.get(cursor).map(|token| token.token_class);
}

/// Consumes a token of the requested class at `tokens[*cursor]`.
fn try_token_class<'a>(
    tokens: &'a [Token],
    cursor: &mut usize,
    token_class: TokenClass,
) -> Result<&'a Token, ParseError> {
    let token = peek_token(tokens, *cursor)?;

    if token.token_class != token_class {
        return Err(unexpected_token(token, token_class.describe()));
    }

    *cursor += 1;
    return Ok(token);
}

// Fails with EmptyBody if the next token cannot start a term at all.
fn ensure_body_present(tokens: &[Token], cursor: usize) -> Result<(), ParseError> {
    let token = peek_token(tokens, cursor)?;

    match token.token_class {
        TokenClass::CloseParen | TokenClass::EndOfExpression | TokenClass::EndOfInput => {
            return Err(ParseError::EmptyBody {
                line_num: token.line_num,
                column: token.column,
            });
        }
        _ => return Ok(()),
    }
}

/// Parses `(\x y z. body)`, desugaring the parameters right-to-left into
/// nested abstractions.
fn try_function_rule(
    tokens: &[Token],
    cursor: &mut usize,
    nesting: Nesting,
) -> Result<Subtree, ParseError> {
    let open_paren_token = try_token_class(tokens, cursor, TokenClass::OpenParen)?;
    let nesting = nesting.enter(open_paren_token)?;
    let lambda_token = try_token_class(tokens, cursor, TokenClass::Lambda)?;

    let mut formal_params = Vec::new();
    while peek_class(tokens, *cursor) == Some(TokenClass::Identifier) {
        formal_params.push(tokens[*cursor].token_text.clone());
        *cursor += 1;
    }

    if formal_params.is_empty() {
        return Err(ParseError::EmptyParameterList {
            line_num: lambda_token.line_num,
            column: lambda_token.column,
        });
    }
    nesting.check_height(formal_params.len(), lambda_token)?;

    try_token_class(tokens, cursor, TokenClass::Dot)?;
    ensure_body_present(tokens, *cursor)?;
    let fn_body = try_term_rule(tokens, cursor, nesting)?;
    try_token_class(tokens, cursor, TokenClass::CloseParen)?;

    let height = nesting.check_height(fn_body.height + formal_params.len(), lambda_token)?;
    let expr_node = formal_params
        .iter()
        .rev()
        .fold(fn_body.expr_node, |fn_body, formal_param| {
            ExprNode::abs(formal_param, fn_body)
        });

    return Ok(Subtree { expr_node, height });
}

/// Parses `(term)`.
fn try_parenthesis_rule(
    tokens: &[Token],
    cursor: &mut usize,
    nesting: Nesting,
) -> Result<Subtree, ParseError> {
    let open_paren_token = try_token_class(tokens, cursor, TokenClass::OpenParen)?;
    let nesting = nesting.enter(open_paren_token)?;
    ensure_body_present(tokens, *cursor)?;
    let subtree = try_term_rule(tokens, cursor, nesting)?;
    try_token_class(tokens, cursor, TokenClass::CloseParen)?;

    return Ok(subtree);
}

/// Parses according to the production `primary -> IDENT | function | (term)`.
/// A `(` directly followed by a lambda is a function.
fn try_primary_rule(
    tokens: &[Token],
    cursor: &mut usize,
    nesting: Nesting,
) -> Result<Subtree, ParseError> {
    let token = peek_token(tokens, *cursor)?;

    match token.token_class {
        TokenClass::Identifier => {
            *cursor += 1;
            return Ok(Subtree {
                expr_node: ExprNode::var(&token.token_text),
                height: 1,
            });
        }
        TokenClass::OpenParen => {
            if peek_class(tokens, *cursor + 1) == Some(TokenClass::Lambda) {
                return try_function_rule(tokens, cursor, nesting);
            }
            return try_parenthesis_rule(tokens, cursor, nesting);
        }
        _ => return Err(unexpected_token(token, "expression")),
    }
}

fn starts_primary(tokens: &[Token], cursor: usize) -> bool {
    return matches!(
        peek_class(tokens, cursor),
        Some(TokenClass::Identifier) | Some(TokenClass::OpenParen)
    );
}

/// Parses a chain of primaries as left-associative application.
fn try_term_rule(
    tokens: &[Token],
    cursor: &mut usize,
    nesting: Nesting,
) -> Result<Subtree, ParseError> {
    let mut out_subtree = try_primary_rule(tokens, cursor, nesting)?;

    while starts_primary(tokens, *cursor) {
        let next_token = &tokens[*cursor];
        let next_primary = try_primary_rule(tokens, cursor, nesting)?;
        let height = out_subtree.height.max(next_primary.height) + 1;

        out_subtree = Subtree {
            expr_node: ExprNode::app(out_subtree.expr_node, next_primary.expr_node),
            height: nesting.check_height(height, next_token)?,
        };
    }

    return Ok(out_subtree);
}

/// Parses `name := term`.
fn try_definition_rule(
    tokens: &[Token],
    cursor: &mut usize,
    nesting: Nesting,
) -> Result<ExprNode, ParseError> {
    let def_name_token = try_token_class(tokens, cursor, TokenClass::Identifier)?;
    try_token_class(tokens, cursor, TokenClass::Define)?;
    ensure_body_present(tokens, *cursor)?;
    let def_body = try_term_rule(tokens, cursor, nesting)?;

    return Ok(ExprNode::Def {
        def_name: def_name_token.token_text.clone(),
        def_body: Box::new(def_body.expr_node),
    });
}

/// Parses one top-level form starting at `tokens[*cursor]`: an import, a
/// definition or a plain term. The cursor is left just past the form and its
/// end-of-expression marker, so the next form can be parsed from it.
pub fn parse_expression(tokens: &[Token], cursor: &mut usize) -> Result<ExprNode, ParseError> {
    return parse_expression_with_limit(tokens, cursor, MAX_NESTING_DEPTH);
}

/// Like [`parse_expression`], with a caller-chosen nesting ceiling.
pub fn parse_expression_with_limit(
    tokens: &[Token],
    cursor: &mut usize,
    max_nesting: usize,
) -> Result<ExprNode, ParseError> {
    let nesting = Nesting {
        depth: 0,
        limit: max_nesting,
    };
    let token = peek_token(tokens, *cursor)?;

    let expr_node = match token.token_class {
        TokenClass::Import => {
            *cursor += 1;
            ExprNode::Import {
                filename: token.token_text.clone(),
            }
        }
        TokenClass::Identifier
            if peek_class(tokens, *cursor + 1) == Some(TokenClass::Define) =>
        {
            try_definition_rule(tokens, cursor, nesting)?
        }
        _ => try_term_rule(tokens, cursor, nesting)?.expr_node,
    };

    let end_token = peek_token(tokens, *cursor)?;
    match end_token.token_class {
        TokenClass::EndOfExpression => *cursor += 1,
        TokenClass::EndOfInput => {}
        _ => return Err(unexpected_token(end_token, "end of expression")),
    }

    return Ok(expr_node);
}

/// Parses every top-level form in the token stream, skipping empty lines.
pub fn parse_statements(tokens: &[Token]) -> Result<Vec<ExprNode>, ParseError> {
    return parse_statements_with_limit(tokens, MAX_NESTING_DEPTH);
}

/// Like [`parse_statements`], with a caller-chosen nesting ceiling.
pub fn parse_statements_with_limit(
    tokens: &[Token],
    max_nesting: usize,
) -> Result<Vec<ExprNode>, ParseError> {
    let mut statements = Vec::new();
    let mut cursor = 0;

    loop {
        match peek_class(tokens, cursor) {
            Some(TokenClass::EndOfExpression) => cursor += 1,
            Some(TokenClass::EndOfInput) | None => break,
            Some(_) => {
                statements.push(parse_expression_with_limit(tokens, &mut cursor, max_nesting)?)
            }
        }
    }

    return Ok(statements);
}
