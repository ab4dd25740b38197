//! Lexer for the embedded module language
//!
//! Line-oriented: a newline ends a statement unless it occurs inside
//! parentheses or square brackets. Comments run from `#` to end of line.

use crate::{Error, Result};

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords
    Fn,
    Class,
    Return,
    If,
    Else,
    While,
    Import,
    From,
    True,
    False,
    Nil,
    And,
    Or,
    Not,

    // Punctuation and operators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Newline,
    Eof,
}

impl TokenKind {
    /// Short human-readable description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Int(v) => format!("integer {}", v),
            TokenKind::Float(v) => format!("float {}", v),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::Fn => "fn",
            TokenKind::Class => "class",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Import => "import",
            TokenKind::From => "from",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Nil => "nil",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            _ => "",
        }
    }
}

/// A token with its 1-indexed source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "fn" => Some(TokenKind::Fn),
        "class" => Some(TokenKind::Class),
        "return" => Some(TokenKind::Return),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "import" => Some(TokenKind::Import),
        "from" => Some(TokenKind::From),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "nil" => Some(TokenKind::Nil),
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        _ => None,
    }
}

/// Tokenize module source, ending with a single `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line: u32 = 1;
    // Newlines are insignificant inside ( ) and [ ]
    let mut group_depth = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            ' ' | '\t' | '\r' => {
                pos += 1;
            }
            '\n' => {
                if group_depth == 0 {
                    if !matches!(
                        tokens.last(),
                        None | Some(Token {
                            kind: TokenKind::Newline,
                            ..
                        })
                    ) {
                        tokens.push(Token {
                            kind: TokenKind::Newline,
                            line,
                        });
                    }
                }
                line += 1;
                pos += 1;
            }
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '(' => {
                group_depth += 1;
                tokens.push(Token {
                    kind: TokenKind::LParen,
                    line,
                });
                pos += 1;
            }
            ')' => {
                group_depth = group_depth.saturating_sub(1);
                tokens.push(Token {
                    kind: TokenKind::RParen,
                    line,
                });
                pos += 1;
            }
            '[' => {
                group_depth += 1;
                tokens.push(Token {
                    kind: TokenKind::LBracket,
                    line,
                });
                pos += 1;
            }
            ']' => {
                group_depth = group_depth.saturating_sub(1);
                tokens.push(Token {
                    kind: TokenKind::RBracket,
                    line,
                });
                pos += 1;
            }
            '{' => {
                tokens.push(Token {
                    kind: TokenKind::LBrace,
                    line,
                });
                pos += 1;
            }
            '}' => {
                tokens.push(Token {
                    kind: TokenKind::RBrace,
                    line,
                });
                pos += 1;
            }
            ',' => {
                tokens.push(Token {
                    kind: TokenKind::Comma,
                    line,
                });
                pos += 1;
            }
            ':' => {
                tokens.push(Token {
                    kind: TokenKind::Colon,
                    line,
                });
                pos += 1;
            }
            '.' => {
                tokens.push(Token {
                    kind: TokenKind::Dot,
                    line,
                });
                pos += 1;
            }
            '+' => {
                tokens.push(Token {
                    kind: TokenKind::Plus,
                    line,
                });
                pos += 1;
            }
            '-' => {
                tokens.push(Token {
                    kind: TokenKind::Minus,
                    line,
                });
                pos += 1;
            }
            '*' => {
                tokens.push(Token {
                    kind: TokenKind::Star,
                    line,
                });
                pos += 1;
            }
            '/' => {
                tokens.push(Token {
                    kind: TokenKind::Slash,
                    line,
                });
                pos += 1;
            }
            '%' => {
                tokens.push(Token {
                    kind: TokenKind::Percent,
                    line,
                });
                pos += 1;
            }
            '=' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token {
                        kind: TokenKind::EqEq,
                        line,
                    });
                    pos += 2;
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Assign,
                        line,
                    });
                    pos += 1;
                }
            }
            '!' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token {
                        kind: TokenKind::NotEq,
                        line,
                    });
                    pos += 2;
                } else {
                    return Err(Error::Parse {
                        line,
                        message: "unexpected character '!'".to_string(),
                    });
                }
            }
            '<' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token {
                        kind: TokenKind::Le,
                        line,
                    });
                    pos += 2;
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Lt,
                        line,
                    });
                    pos += 1;
                }
            }
            '>' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token {
                        kind: TokenKind::Ge,
                        line,
                    });
                    pos += 2;
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Gt,
                        line,
                    });
                    pos += 1;
                }
            }
            '"' | '\'' => {
                let (value, next) = lex_string(&chars, pos, line)?;
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    line,
                });
                pos = next;
            }
            c if c.is_ascii_digit() => {
                let (kind, next) = lex_number(&chars, pos, line)?;
                tokens.push(Token { kind, line });
                pos = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                }
                let ident: String = chars[start..pos].iter().collect();
                let kind = keyword(&ident).unwrap_or(TokenKind::Ident(ident));
                tokens.push(Token { kind, line });
            }
            other => {
                return Err(Error::Parse {
                    line,
                    message: format!("unexpected character '{}'", other),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize, line: u32) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut value = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars.get(pos + 1).ok_or(Error::Parse {
                    line,
                    message: "unterminated string".to_string(),
                })?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => {
                        return Err(Error::Parse {
                            line,
                            message: format!("unknown escape '\\{}'", other),
                        });
                    }
                });
                pos += 2;
            }
            '\n' => {
                return Err(Error::Parse {
                    line,
                    message: "unterminated string".to_string(),
                });
            }
            c if c == quote => return Ok((value, pos + 1)),
            c => {
                value.push(c);
                pos += 1;
            }
        }
    }
    Err(Error::Parse {
        line,
        message: "unterminated string".to_string(),
    })
}

fn lex_number(chars: &[char], start: usize, line: u32) -> Result<(TokenKind, usize)> {
    let mut pos = start;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    // A dot only continues the number when a digit follows, so `x.1`-style
    // attribute chains never swallow the dot.
    let is_float = chars.get(pos) == Some(&'.')
        && chars.get(pos + 1).map(|c| c.is_ascii_digit()).unwrap_or(false);
    if is_float {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
        let text: String = chars[start..pos].iter().collect();
        let value = text.parse::<f64>().map_err(|_| Error::Parse {
            line,
            message: format!("invalid float literal '{}'", text),
        })?;
        Ok((TokenKind::Float(value), pos))
    } else {
        let text: String = chars[start..pos].iter().collect();
        let value = text.parse::<i64>().map_err(|_| Error::Parse {
            line,
            message: format!("invalid integer literal '{}'", text),
        })?;
        Ok((TokenKind::Int(value), pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_assignment() {
        assert_eq!(
            kinds("k = 10"),
            vec![
                TokenKind::Ident("k".to_string()),
                TokenKind::Assign,
                TokenKind::Int(10),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_keywords_and_operators() {
        assert_eq!(
            kinds("fn f(n = 1) { return n <= 2 }"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident("f".to_string()),
                TokenKind::LParen,
                TokenKind::Ident("n".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Ident("n".to_string()),
                TokenKind::Le,
                TokenKind::Int(2),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_suppressed_in_groups() {
        let toks = kinds("xs = [1,\n 2,\n 3]");
        assert!(!toks.contains(&TokenKind::Newline));
    }

    #[test]
    fn test_line_tracking() {
        let tokens = lex("a = 1\n\nb = 2\n").unwrap();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("b".to_string()))
            .unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"s = "a\nb""#),
            vec![
                TokenKind::Ident("s".to_string()),
                TokenKind::Assign,
                TokenKind::Str("a\nb".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_float_vs_attribute_dot() {
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(
            kinds("util.helper")[1],
            TokenKind::Dot,
        );
    }

    #[test]
    fn test_comments_ignored() {
        let toks = kinds("a = 1 # trailing\n# full line\nb = 2");
        assert!(toks.contains(&TokenKind::Ident("b".to_string())));
        assert!(!toks.iter().any(|t| matches!(t, TokenKind::Str(_))));
    }

    #[test]
    fn test_unterminated_string_errors() {
        assert!(lex("s = \"oops").is_err());
    }
}
