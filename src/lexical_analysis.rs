//! Turns lines of lambda-calculus source text into tokens.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// The different classes of tokens that compose the language.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TokenClass {
    OpenParen,
    CloseParen,
    Lambda,
    Dot,
    Identifier,
    Define,
    Import,
    EndOfExpression,
    EndOfInput,
    Invalid,
    Comment,
    Whitespace,
}

impl TokenClass {
    /// Returns true for tokens that carry no meaning for the parser.
    fn is_uninteresting(self) -> bool {
        matches!(self, TokenClass::Comment | TokenClass::Whitespace)
    }

    /// How the token class is spelled in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenClass::OpenParen => "`(`",
            TokenClass::CloseParen => "`)`",
            TokenClass::Lambda => "`\\`",
            TokenClass::Dot => "`.`",
            TokenClass::Identifier => "identifier",
            TokenClass::Define => "`:=`",
            TokenClass::Import => "#import directive",
            TokenClass::EndOfExpression => "end of expression",
            TokenClass::EndOfInput => "end of input",
            TokenClass::Invalid => "invalid token",
            TokenClass::Comment => "comment",
            TokenClass::Whitespace => "whitespace",
        }
    }
}

/// Represents a single token of the language. For identifiers `token_text` is
/// the name, for imports it is the quoted filename without its quotes.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Token {
    pub token_class: TokenClass,
    pub token_text: String,
    pub line_num: usize,
    pub column: usize,
}

/// Errors produced while tokenizing. Either one aborts the whole line.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LexError {
    #[error("invalid character {character:?} at line {line_num}, column {column}")]
    InvalidCharacter {
        character: char,
        line_num: usize,
        column: usize,
    },
    #[error("unterminated import path at line {line_num}, column {column}")]
    UnterminatedString { line_num: usize, column: usize },
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            LexError::InvalidCharacter {
                line_num, column, ..
            }
            | LexError::UnterminatedString { line_num, column } => (*line_num, *column),
        }
    }
}

// Represents how to recognize a token class.
#[derive(Debug)]
struct TokenRule {
    token_class: TokenClass,
    regex: Regex,
}

// Vector of regex patterns that correspond to each token class. Every pattern
// is anchored to the start of the remaining input.
lazy_static! {
    static ref TOKEN_RULES: Vec<TokenRule> = vec![
        TokenRule {
            token_class: TokenClass::Identifier,
            regex: Regex::new(r"^[A-Za-z][A-Za-z0-9_]*")
                .expect("Unable to compile Identifier rule regex."),
        },
        TokenRule {
            token_class: TokenClass::Define,
            regex: Regex::new(r"^:=").expect("Unable to compile Define rule regex."),
        },
        TokenRule {
            token_class: TokenClass::Lambda,
            regex: Regex::new(r"^(\\|λ)").expect("Unable to compile Lambda rule regex."),
        },
        TokenRule {
            token_class: TokenClass::Dot,
            regex: Regex::new(r"^\.").expect("Unable to compile Dot rule regex."),
        },
        TokenRule {
            token_class: TokenClass::OpenParen,
            regex: Regex::new(r"^\(").expect("Unable to compile OpenParen rule regex."),
        },
        TokenRule {
            token_class: TokenClass::CloseParen,
            regex: Regex::new(r"^\)").expect("Unable to compile CloseParen rule regex."),
        },
        TokenRule {
            token_class: TokenClass::Comment,
            regex: Regex::new(r"^--[^\n]*").expect("Unable to compile Comment rule regex."),
        },
        TokenRule {
            token_class: TokenClass::EndOfExpression,
            regex: Regex::new(r"^\n").expect("Unable to compile EndOfExpression rule regex."),
        },
        TokenRule {
            token_class: TokenClass::Whitespace,
            regex: Regex::new(r"^[ \t\r]+").expect("Unable to compile Whitespace rule regex."),
        },
    ];
    static ref IMPORT_REGEX: Regex = Regex::new(r#"^#import[ \t]*(?:"([^"\n]*)"|'([^'\n]*)')"#)
        .expect("Unable to compile Import rule regex.");
    static ref IMPORT_PREFIX_REGEX: Regex = Regex::new(r#"^#import[ \t]*["']"#)
        .expect("Unable to compile Import prefix regex.");
}

// Finds the rule that matches the most characters from the start of the input
// string. Returns None if no rule matches at all.
fn get_longest_matching_rule(input_str: &str) -> Option<(&'static TokenRule, usize)> {
    let mut longest: Option<(&'static TokenRule, usize)> = None;

    for token_rule in TOKEN_RULES.iter() {
        if let Some(match_obj) = token_rule.regex.find(input_str) {
            let beats_current = longest.map_or(true, |(_, len)| match_obj.len() > len);
            if beats_current {
                longest = Some((token_rule, match_obj.len()));
            }
        }
    }

    return longest;
}

/// A single forward pass over some source text. Yields tokens with comments
/// and whitespace already dropped, then exactly one `EndOfInput` token. After
/// an error it yields nothing more.
pub struct TokenIter<'a> {
    program_str: &'a str,
    curr_idx: usize,
    line_num: usize,
    column: usize,
    finished: bool,
}

impl<'a> TokenIter<'a> {
    /// `first_line_num` is the 1-based line the text starts on, used for
    /// positions only.
    pub fn new(program_str: &'a str, first_line_num: usize) -> Self {
        TokenIter {
            program_str,
            curr_idx: 0,
            line_num: first_line_num,
            column: 1,
            finished: false,
        }
    }

    fn advance(&mut self, matched: &str) {
        for c in matched.chars() {
            if c == '\n' {
                self.line_num += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.curr_idx += matched.len();
    }

    // Handles the `#import "path"` directive, which is not a plain regex rule
    // because a missing closing quote is its own error.
    fn lex_import(&mut self, rest: &'a str) -> Result<Token, LexError> {
        let (line_num, column) = (self.line_num, self.column);

        match IMPORT_REGEX.captures(rest) {
            Some(captures) => {
                let filename = captures
                    .get(1)
                    .or_else(|| captures.get(2))
                    .map_or("", |m| m.as_str());
                let token = Token {
                    token_class: TokenClass::Import,
                    token_text: String::from(filename),
                    line_num,
                    column,
                };
                let whole_len = captures.get(0).map_or(0, |m| m.len());
                self.advance(&rest[..whole_len]);
                Ok(token)
            }
            None if IMPORT_PREFIX_REGEX.is_match(rest) => {
                Err(LexError::UnterminatedString { line_num, column })
            }
            None => Err(LexError::InvalidCharacter {
                character: '#',
                line_num,
                column,
            }),
        }
    }

    fn next_token(&mut self) -> Option<Result<Token, LexError>> {
        loop {
            if self.finished {
                return None;
            }

            let program_str = self.program_str;
            let rest = &program_str[self.curr_idx..];

            if rest.is_empty() {
                self.finished = true;
                return Some(Ok(Token {
                    token_class: TokenClass::EndOfInput,
                    token_text: String::new(),
                    line_num: self.line_num,
                    column: self.column,
                }));
            }

            if rest.starts_with('#') {
                let result = self.lex_import(rest);
                if result.is_err() {
                    self.finished = true;
                }
                return Some(result);
            }

            match get_longest_matching_rule(rest) {
                Some((token_rule, match_len)) => {
                    let token = Token {
                        token_class: token_rule.token_class,
                        token_text: String::from(&rest[..match_len]),
                        line_num: self.line_num,
                        column: self.column,
                    };
                    self.advance(&rest[..match_len]);

                    if token.token_class.is_uninteresting() {
                        continue;
                    }
                    return Some(Ok(token));
                }
                None => {
                    self.finished = true;
                    let character = rest.chars().next().unwrap_or('\0');
                    return Some(Err(LexError::InvalidCharacter {
                        character,
                        line_num: self.line_num,
                        column: self.column,
                    }));
                }
            }
        }
    }
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Given a string, returns the tokens that comprise it, ending with
/// `EndOfInput`. On any error nothing already produced is kept.
pub fn run_lexical_analysis(
    program_str: &str,
    first_line_num: usize,
) -> Result<Vec<Token>, LexError> {
    return TokenIter::new(program_str, first_line_num).collect();
}
