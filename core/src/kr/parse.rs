//! Reader for the textual term syntax carried on the wire and in agent files.
//!
//! Grammar: `term ::= VAR | INT | STRING | atom [ "(" term ("," term)* ")" ]`,
//! where an atom is a bare lowercase identifier (letters, digits, `_`, `-`) or a
//! single-quoted name. A conjunction is a comma-separated sequence of terms.

use super::Term;
use crate::errors::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Var(String),
    Atom(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Eof,
}

struct Tokenizer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            current_pos: 0,
        }
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let (pos, ch) = match self.chars.next() {
            Some((pos, ch)) => {
                self.current_pos = pos;
                (pos, ch)
            }
            None => {
                self.current_pos = self.input.len();
                return Ok(Token::Eof);
            }
        };

        match ch {
            '(' => Ok(Token::LParen),
            ')' => Ok(Token::RParen),
            ',' => Ok(Token::Comma),
            '"' => self.read_quoted(pos, '"').map(Token::Str),
            '\'' => self.read_quoted(pos, '\'').map(Token::Atom),
            '-' if matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) => {
                self.read_number(pos, ch)
            }
            '0'..='9' => self.read_number(pos, ch),
            'a'..='z' => Ok(Token::Atom(self.read_identifier(ch))),
            'A'..='Z' | '_' => Ok(Token::Var(self.read_identifier(ch))),
            _ => Err(ParseError::Syntax {
                position: pos,
                message: format!("Unexpected character: '{}'", ch),
            }),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::from(first);
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self, pos: usize, first: char) -> ParseResult<Token> {
        let mut digits = String::from(first);
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        digits.parse().map(Token::Int).map_err(|_| ParseError::Syntax {
            position: pos,
            message: format!("Integer out of range: {}", digits),
        })
    }

    fn read_quoted(&mut self, start: usize, quote: char) -> ParseResult<String> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(s),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, '\\')) => s.push('\\'),
                    Some((_, c)) if c == quote => s.push(c),
                    Some((pos, c)) => {
                        return Err(ParseError::Syntax {
                            position: pos,
                            message: format!("Unknown escape sequence: \\{}", c),
                        })
                    }
                    None => break,
                },
                Some((_, c)) => s.push(c),
                None => break,
            }
        }
        Err(ParseError::Syntax {
            position: start,
            message: "Unterminated quoted text".to_string(),
        })
    }
}

struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut tokenizer = Tokenizer::new(input);
        let current = tokenizer.next_token()?;
        Ok(Self { tokenizer, current })
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current = self.tokenizer.next_token()?;
        Ok(())
    }

    fn error<T>(&self, message: &str) -> ParseResult<T> {
        Err(ParseError::Syntax {
            position: self.tokenizer.current_pos,
            message: message.to_string(),
        })
    }

    fn parse_term(&mut self) -> ParseResult<Term> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance()?;
        match token {
            Token::Var(name) => Ok(Term::Var(name)),
            Token::Int(n) => Ok(Term::Int(n)),
            Token::Str(s) => Ok(Term::Str(s)),
            Token::Atom(name) => {
                if self.current != Token::LParen {
                    return Ok(Term::Atom(name));
                }
                self.advance()?;
                let args = self.parse_sequence()?;
                if self.current != Token::RParen {
                    return self.error("Expected ')'");
                }
                self.advance()?;
                if args.is_empty() {
                    return self.error("Compound term needs at least one argument");
                }
                Ok(Term::compound(&name, args))
            }
            Token::Eof => Err(ParseError::Empty),
            other => self.error(&format!("Unexpected token {:?}", other)),
        }
    }

    fn parse_sequence(&mut self) -> ParseResult<Vec<Term>> {
        let mut terms = Vec::new();
        if matches!(self.current, Token::RParen | Token::Eof) {
            return Ok(terms);
        }
        loop {
            terms.push(self.parse_term()?);
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                return Ok(terms);
            }
        }
    }

    fn expect_eof(&self) -> ParseResult<()> {
        if self.current == Token::Eof {
            Ok(())
        } else {
            self.error(&format!("Trailing input {:?}", self.current))
        }
    }
}

/// Parse a single term.
pub fn parse_term(input: &str) -> ParseResult<Term> {
    let mut parser = Parser::new(input)?;
    let term = parser.parse_term()?;
    parser.expect_eof()?;
    Ok(term)
}

/// Parse a comma-separated sequence of terms; empty input yields no terms.
pub fn parse_terms(input: &str) -> ParseResult<Vec<Term>> {
    let mut parser = Parser::new(input)?;
    let terms = parser.parse_sequence()?;
    parser.expect_eof()?;
    Ok(terms)
}
