//! Lexer and parser for the s-expression pattern syntax

use super::{ChildPattern, KindMatcher, Pattern};
use thiserror::Error;

/// Error while parsing or validating a pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    InvalidCharacter { offset: usize, ch: char },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        offset: usize,
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected}, found end of pattern")]
    UnexpectedEnd { expected: &'static str },

    #[error("'...' at offset {offset} must be the last child of a node pattern")]
    MisplacedRest { offset: usize },

    #[error("empty alternative set")]
    EmptyUnion { offset: Option<usize> },

    #[error("capture ${name} is declared more than once")]
    DuplicateCapture { name: String },

    #[error("union alternatives bind different captures: [{expected}] vs [{found}]")]
    UnbalancedUnion { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Open,
    Close,
    OpenSet,
    CloseSet,
    Rest,
    /// `_`, `nil`, `nil?`, node kinds
    Word(String),
    /// `:name`
    Symbol(String),
    /// `"text"`
    Str(String),
    Int(String),
    /// `$name`, with `constrained` set for `$name:`
    Capture { name: String, constrained: bool },
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Open => "'('".to_string(),
            TokenKind::Close => "')'".to_string(),
            TokenKind::OpenSet => "'{'".to_string(),
            TokenKind::CloseSet => "'}'".to_string(),
            TokenKind::Rest => "'...'".to_string(),
            TokenKind::Word(word) => format!("`{}`", word),
            TokenKind::Symbol(sym) => format!("`:{}`", sym),
            TokenKind::Str(text) => format!("{:?}", text),
            TokenKind::Int(digits) => digits.clone(),
            TokenKind::Capture { name, .. } => format!("`${}`", name),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '@'
}

/// True if `text` can be written back as a `:symbol` literal
pub(crate) fn is_symbol_text(text: &str) -> bool {
    let body = text.trim_end_matches(['?', '!', '=']);
    !body.is_empty()
        && body.chars().all(is_symbol_char)
        && text.len() - body.len() <= 1
        && !body.starts_with(|c: char| c.is_ascii_digit())
}

fn lex(text: &str) -> Result<Vec<Token>, PatternError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    // Reads the longest run of characters accepted by `accept`, starting at `start`
    fn take_while(
        text: &str,
        chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
        start: usize,
        accept: fn(char) -> bool,
    ) -> String {
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if !accept(c) {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        text[start..end].to_string()
    }

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' | ')' | '{' | '}' => {
                chars.next();
                let kind = match c {
                    '(' => TokenKind::Open,
                    ')' => TokenKind::Close,
                    '{' => TokenKind::OpenSet,
                    _ => TokenKind::CloseSet,
                };
                tokens.push(Token { kind, offset });
            }
            '.' => {
                if text[offset..].starts_with("...") {
                    chars.nth(2);
                    tokens.push(Token {
                        kind: TokenKind::Rest,
                        offset,
                    });
                } else {
                    return Err(PatternError::InvalidCharacter { offset, ch: c });
                }
            }
            ':' => {
                chars.next();
                let mut name = take_while(text, &mut chars, offset + 1, is_symbol_char);
                if let Some(&(_, suffix @ ('?' | '!' | '='))) = chars.peek() {
                    chars.next();
                    name.push(suffix);
                }
                if name.is_empty() {
                    return Err(PatternError::InvalidCharacter { offset, ch: c });
                }
                tokens.push(Token {
                    kind: TokenKind::Symbol(name),
                    offset,
                });
            }
            '$' => {
                chars.next();
                let name = take_while(text, &mut chars, offset + 1, is_word_char);
                if name.is_empty() || !name.starts_with(is_word_start) {
                    return Err(PatternError::InvalidCharacter { offset, ch: c });
                }
                let constrained = matches!(chars.peek(), Some(&(_, ':')));
                if constrained {
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Capture { name, constrained },
                    offset,
                });
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                            }
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(PatternError::UnterminatedString { offset });
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    offset,
                });
            }
            c if c.is_ascii_digit() => {
                let digits = take_while(text, &mut chars, offset, |c| c.is_ascii_digit());
                tokens.push(Token {
                    kind: TokenKind::Int(digits),
                    offset,
                });
            }
            c if is_word_start(c) => {
                let mut word = take_while(text, &mut chars, offset, is_word_char);
                if let Some(&(_, '?')) = chars.peek() {
                    chars.next();
                    word.push('?');
                }
                tokens.push(Token {
                    kind: TokenKind::Word(word),
                    offset,
                });
            }
            other => return Err(PatternError::InvalidCharacter { offset, ch: other }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, PatternError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(PatternError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(token: &Token, expected: &'static str) -> PatternError {
        PatternError::UnexpectedToken {
            offset: token.offset,
            expected,
            found: token.kind.describe(),
        }
    }

    fn pattern(&mut self) -> Result<Pattern, PatternError> {
        let open = self.next("'('")?;
        if open.kind != TokenKind::Open {
            return Err(Self::unexpected(&open, "'('"));
        }

        let mut pattern = Pattern::new(self.kind_matcher()?);
        loop {
            let token = self.peek().ok_or(PatternError::UnexpectedEnd { expected: "')'" })?;
            match token.kind {
                TokenKind::Close => {
                    self.pos += 1;
                    return Ok(pattern);
                }
                TokenKind::Rest => {
                    let offset = token.offset;
                    self.pos += 1;
                    match self.peek() {
                        Some(Token {
                            kind: TokenKind::Close,
                            ..
                        }) => {
                            self.pos += 1;
                            return Ok(pattern.rest());
                        }
                        _ => return Err(PatternError::MisplacedRest { offset }),
                    }
                }
                _ => pattern = pattern.child(self.child()?),
            }
        }
    }

    fn kind_matcher(&mut self) -> Result<KindMatcher, PatternError> {
        const EXPECTED: &str = "a node kind, '_' or '{'";
        let token = self.next(EXPECTED)?;
        match token.kind {
            TokenKind::Word(word) if word == "_" => Ok(KindMatcher::Any),
            TokenKind::Word(word) if !word.ends_with('?') => Ok(KindMatcher::Exact(word)),
            TokenKind::OpenSet => {
                let mut kinds = Vec::new();
                loop {
                    let token = self.next("a node kind or '}'")?;
                    match token.kind {
                        TokenKind::CloseSet if kinds.is_empty() => {
                            return Err(PatternError::EmptyUnion {
                                offset: Some(token.offset),
                            })
                        }
                        TokenKind::CloseSet => return Ok(KindMatcher::OneOf(kinds)),
                        TokenKind::Word(word) if word != "_" && !word.ends_with('?') => {
                            kinds.push(word)
                        }
                        _ => return Err(Self::unexpected(&token, "a node kind or '}'")),
                    }
                }
            }
            _ => Err(Self::unexpected(&token, EXPECTED)),
        }
    }

    fn child(&mut self) -> Result<ChildPattern, PatternError> {
        const EXPECTED: &str = "a child pattern";
        let token = self.peek().cloned().ok_or(PatternError::UnexpectedEnd {
            expected: EXPECTED,
        })?;
        match token.kind {
            TokenKind::Open => Ok(ChildPattern::Node(self.pattern()?)),
            TokenKind::OpenSet => {
                self.pos += 1;
                let mut alternatives = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token {
                            kind: TokenKind::CloseSet,
                            offset,
                        }) => {
                            let offset = *offset;
                            self.pos += 1;
                            if alternatives.is_empty() {
                                return Err(PatternError::EmptyUnion {
                                    offset: Some(offset),
                                });
                            }
                            return Ok(ChildPattern::Union(alternatives));
                        }
                        Some(_) => alternatives.push(self.child()?),
                        None => return Err(PatternError::UnexpectedEnd { expected: "'}'" }),
                    }
                }
            }
            TokenKind::Capture { name, constrained } => {
                self.pos += 1;
                if constrained {
                    Ok(ChildPattern::capture_if(name, self.child()?))
                } else {
                    Ok(ChildPattern::capture(name))
                }
            }
            TokenKind::Word(ref word) => {
                self.pos += 1;
                match word.as_str() {
                    "_" => Ok(ChildPattern::Any),
                    "nil" | "nil?" => Ok(ChildPattern::Nil),
                    _ => Err(Self::unexpected(
                        &token,
                        "'_', 'nil', ':atom' or a nested pattern",
                    )),
                }
            }
            TokenKind::Symbol(text) | TokenKind::Str(text) | TokenKind::Int(text) => {
                self.pos += 1;
                Ok(ChildPattern::Atom(text))
            }
            TokenKind::Rest => Err(PatternError::MisplacedRest {
                offset: token.offset,
            }),
            TokenKind::Close | TokenKind::CloseSet => Err(Self::unexpected(&token, EXPECTED)),
        }
    }
}

/// Parse one top-level pattern; trailing tokens are an error
pub(super) fn parse(text: &str) -> Result<Pattern, PatternError> {
    let mut parser = Parser {
        tokens: lex(text)?,
        pos: 0,
    };
    let pattern = parser.pattern()?;
    if let Some(extra) = parser.peek() {
        return Err(Parser::unexpected(extra, "end of pattern"));
    }
    Ok(pattern)
}
