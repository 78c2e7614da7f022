//! Indentation-aware lexer.
//!
//! A logos scanner produces raw tokens; a layout pass then rewrites
//! line breaks into `NEWLINE`/`INDENT`/`DEDENT`, the offside rule the
//! grammar consumes. Blank and comment-only lines never affect layout.

use logos::Logos;

use super::token::Token;
use super::ParseError;

/// Scanner-level token enum, converted to [`Token`] after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
enum RawToken {
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("fn")]
    Fn,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("nil")]
    Nil,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Real(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    Int(i32),
    #[regex(r#"'(?:[^'\\\n]|\\.)*'"#, |lex| unescape(lex.slice()))]
    #[regex(r#""(?:[^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,
    #[token("->")]
    Arrow,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// Line break plus the next line's leading whitespace.
    #[regex(r"\n[ \t]*", |lex| lex.slice().len() - 1)]
    Line(usize),
}

/// Strip the quotes from `quoted` and resolve its escapes.
fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut digits = String::new();
                loop {
                    let c = chars.next()?;
                    if c == '}' {
                        break;
                    }
                    digits.push(c);
                }
                let code = u32::from_str_radix(&digits, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

impl RawToken {
    fn into_token(self) -> Option<Token> {
        Some(match self {
            RawToken::Let => Token::Let,
            RawToken::If => Token::If,
            RawToken::Else => Token::Else,
            RawToken::While => Token::While,
            RawToken::Return => Token::Return,
            RawToken::Fn => Token::Fn,
            RawToken::And => Token::And,
            RawToken::Or => Token::Or,
            RawToken::Not => Token::Not,
            RawToken::Nil => Token::Nil,
            RawToken::True => Token::True,
            RawToken::False => Token::False,
            RawToken::Real(x) => Token::Real(x),
            RawToken::Int(i) => Token::Int(i),
            RawToken::Str(s) => Token::Str(s),
            RawToken::Ident(name) => Token::Ident(name),
            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Caret => Token::Caret,
            RawToken::EqEq => Token::EqEq,
            RawToken::BangEq => Token::BangEq,
            RawToken::Le => Token::Le,
            RawToken::Ge => Token::Ge,
            RawToken::Lt => Token::Lt,
            RawToken::Gt => Token::Gt,
            RawToken::Eq => Token::Eq,
            RawToken::Arrow => Token::Arrow,
            RawToken::Comma => Token::Comma,
            RawToken::Colon => Token::Colon,
            RawToken::Semicolon => Token::Semicolon,
            RawToken::Dot => Token::Dot,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::Line(_) => return None,
        })
    }
}

/// Tokenize `source`, resolving indentation. The stream always ends
/// with enough `Dedent`s to close open blocks, a final `Newline`, and
/// `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut raw = Vec::new();
    let mut lexer = RawToken::lexer(source);
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => raw.push(token),
            Err(()) => return Err(ParseError::InvalidToken(lexer.slice().to_owned())),
        }
    }
    resolve_layout(raw)
}

fn resolve_layout(raw: Vec<RawToken>) -> Result<Vec<Token>, ParseError> {
    let mut out = Vec::new();
    let mut levels: Vec<usize> = vec![0];
    let mut index = 0;
    while index < raw.len() {
        match raw[index] {
            RawToken::Line(first) => {
                // Collapse a run of line breaks; only the last one's
                // indentation counts.
                let mut indent = first;
                while let Some(RawToken::Line(next)) = raw.get(index + 1) {
                    indent = *next;
                    index += 1;
                }
                if index + 1 == raw.len() {
                    break; // trailing blank lines
                }
                let current = *levels.last().unwrap_or(&0);
                if indent > current {
                    levels.push(indent);
                    out.push(Token::Indent);
                } else if indent == current {
                    out.push(Token::Newline);
                } else {
                    while levels.last().is_some_and(|&top| top > indent) {
                        levels.pop();
                        out.push(Token::Dedent);
                    }
                    if levels.last() != Some(&indent) {
                        return Err(ParseError::BadIndent);
                    }
                    out.push(Token::Newline);
                }
            }
            ref token => {
                if let Some(token) = token.clone().into_token() {
                    out.push(token);
                }
            }
        }
        index += 1;
    }
    while levels.len() > 1 {
        levels.pop();
        out.push(Token::Dedent);
    }
    out.push(Token::Newline);
    out.push(Token::Eof);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_win_over_identifiers() {
        let tokens = tokenize("let letter").expect("tokenize");
        assert_eq!(tokens[0], Token::Let);
        assert_eq!(tokens[1], Token::Ident("letter".to_owned()));
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 1.5").expect("tokenize");
        assert_eq!(tokens[0], Token::Int(42));
        assert_eq!(tokens[1], Token::Real(1.5));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r"'a\nb'").expect("tokenize");
        assert_eq!(tokens[0], Token::Str("a\nb".to_owned()));
        let tokens = tokenize(r#""quote \" here""#).expect("tokenize");
        assert_eq!(tokens[0], Token::Str("quote \" here".to_owned()));
        let tokens = tokenize(r"'\u{e9}'").expect("tokenize");
        assert_eq!(tokens[0], Token::Str("é".to_owned()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("1 # the rest is noise").expect("tokenize");
        assert_eq!(
            tokens,
            vec![Token::Int(1), Token::Newline, Token::Eof]
        );
    }

    #[test]
    fn test_compound_operators() {
        let tokens = tokenize("<= >= == != ->").expect("tokenize");
        assert_eq!(
            &tokens[..5],
            &[Token::Le, Token::Ge, Token::EqEq, Token::BangEq, Token::Arrow]
        );
    }

    #[test]
    fn test_flat_lines() {
        let tokens = tokenize("a\nb").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_owned()),
                Token::Newline,
                Token::Ident("b".to_owned()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_dedent_pairing() {
        let tokens = tokenize("a:\n  b\nc").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_owned()),
                Token::Colon,
                Token::Indent,
                Token::Ident("b".to_owned()),
                Token::Dedent,
                Token::Newline,
                Token::Ident("c".to_owned()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_nested_blocks_close_together() {
        let tokens = tokenize("a:\n  b:\n    c").expect("tokenize");
        let trailing = &tokens[tokens.len() - 4..];
        assert_eq!(
            trailing,
            &[Token::Dedent, Token::Dedent, Token::Newline, Token::Eof]
        );
    }

    #[test]
    fn test_blank_lines_do_not_close_blocks() {
        let tokens = tokenize("a:\n  b\n\n  c").expect("tokenize");
        let body = &tokens[..tokens.len() - 3];
        assert!(
            !body.contains(&Token::Dedent),
            "blank line must not dedent: {tokens:?}"
        );
    }

    #[test]
    fn test_inconsistent_indent_is_rejected() {
        assert_eq!(tokenize("a:\n    b\n  c"), Err(ParseError::BadIndent));
    }

    #[test]
    fn test_invalid_character() {
        assert!(matches!(
            tokenize("let x = @"),
            Err(ParseError::InvalidToken(_))
        ));
    }
}
