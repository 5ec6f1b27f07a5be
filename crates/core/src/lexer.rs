use crate::error::ParseError;
use crate::tags::TagValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `[name]` or `[Owner::name]` -- leading identity check
    Identity(String),
    /// Identifiers and keywords, optionally `Owner::name` qualified
    Word(String),
    /// `branch:target`
    Branch(String, String),
    /// `#name`, `#name=` or `#name=value`
    Tag(String, TagValue),
    /// `>`
    Goto,
    /// `>|`
    Join,
    /// `+>`
    IfTrue,
    /// `->`
    IfFalse,
    /// `N>`
    IntArm(u64),
    /// `name>`
    NameArm(String),
    /// `|`
    Pipe,
    // End of input
    Eof,
}

impl Token {
    /// Source-like rendering used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Identity(s) => format!("[{}]", s),
            Token::Word(w) => w.clone(),
            Token::Branch(b, t) => format!("{}:{}", b, t),
            Token::Tag(n, TagValue::Wildcard) => format!("#{}", n),
            Token::Tag(n, v) => format!("#{}={}", n, v),
            Token::Goto => ">".to_string(),
            Token::Join => ">|".to_string(),
            Token::IfTrue => "+>".to_string(),
            Token::IfFalse => "->".to_string(),
            Token::IntArm(n) => format!("{}>", n),
            Token::NameArm(n) => format!("{}>", n),
            Token::Pipe => "|".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\\' || c == '.'
}

/// Tokenize an action expression. Whitespace and `*` are insignificant so the
/// expression can live inside a doc-comment block.
pub fn lex(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let at = |pos: usize| chars.get(pos).map(|&(_, c)| c);
    let offset_of = |pos: usize| chars.get(pos).map_or(src.len(), |&(o, _)| o);
    let mut pos = 0usize;

    // Reads `name` or `Owner::name` starting at `pos`; returns the end position.
    let read_ident = |mut pos: usize| -> usize {
        loop {
            while at(pos).is_some_and(is_ident_char) {
                pos += 1;
            }
            if at(pos) == Some(':') && at(pos + 1) == Some(':') && at(pos + 2).is_some_and(is_ident_start) {
                pos += 2;
                continue;
            }
            return pos;
        }
    };

    while pos < chars.len() {
        let (offset, c) = chars[pos];

        if c.is_whitespace() || c == '*' {
            pos += 1;
            continue;
        }

        match c {
            '[' => {
                let start = pos + 1;
                let mut end = start;
                while at(end).is_some_and(|c| c != ']') {
                    end += 1;
                }
                if at(end).is_none() {
                    return Err(ParseError::new(src, offset, "unterminated action identity"));
                }
                let ident = src[offset_of(start)..offset_of(end)].trim().to_string();
                tokens.push(Spanned {
                    token: Token::Identity(ident),
                    offset,
                });
                pos = end + 1;
                continue;
            }
            '>' => {
                if at(pos + 1) == Some('|') {
                    tokens.push(Spanned {
                        token: Token::Join,
                        offset,
                    });
                    pos += 2;
                } else {
                    tokens.push(Spanned {
                        token: Token::Goto,
                        offset,
                    });
                    pos += 1;
                }
                continue;
            }
            '+' | '-' => {
                if at(pos + 1) != Some('>') {
                    return Err(ParseError::new(
                        src,
                        offset,
                        format!("expected '>' after '{}'", c),
                    ));
                }
                let token = if c == '+' {
                    Token::IfTrue
                } else {
                    Token::IfFalse
                };
                tokens.push(Spanned { token, offset });
                pos += 2;
                continue;
            }
            '|' => {
                tokens.push(Spanned {
                    token: Token::Pipe,
                    offset,
                });
                pos += 1;
                continue;
            }
            '#' => {
                let start = pos + 1;
                let mut end = start;
                while at(end).is_some_and(is_ident_char) {
                    end += 1;
                }
                if end == start {
                    return Err(ParseError::new(src, offset, "expected tag name after '#'"));
                }
                let name = src[offset_of(start)..offset_of(end)].to_string();
                let value = if at(end) == Some('=') {
                    let vstart = end + 1;
                    let mut vend = vstart;
                    while at(vend).is_some_and(|c| !c.is_whitespace()) {
                        vend += 1;
                    }
                    let value = TagValue::exact(&src[offset_of(vstart)..offset_of(vend)]);
                    end = vend;
                    value
                } else {
                    TagValue::Wildcard
                };
                tokens.push(Spanned {
                    token: Token::Tag(name, value),
                    offset,
                });
                pos = end;
                continue;
            }
            _ => {}
        }

        // Integer decision key
        if c.is_ascii_digit() {
            let start = pos;
            while at(pos).is_some_and(|c| c.is_ascii_digit()) {
                pos += 1;
            }
            let digits = &src[offset_of(start)..offset_of(pos)];
            if at(pos) != Some('>') {
                return Err(ParseError::new(
                    src,
                    offset_of(pos),
                    format!("expected '>' after decision key '{}'", digits),
                ));
            }
            let n: u64 = digits.parse().map_err(|_| {
                ParseError::new(src, offset, format!("invalid decision key '{}'", digits))
            })?;
            tokens.push(Spanned {
                token: Token::IntArm(n),
                offset,
            });
            pos += 1;
            continue;
        }

        // Identifier, keyword, named decision key or branch pair
        if is_ident_start(c) {
            let end = read_ident(pos);
            let word = src[offset..offset_of(end)].to_string();
            pos = end;
            if at(pos) == Some('>') && at(pos + 1) != Some('|') {
                tokens.push(Spanned {
                    token: Token::NameArm(word),
                    offset,
                });
                pos += 1;
            } else if at(pos) == Some(':') {
                let tstart = pos + 1;
                let tend = if at(tstart).is_some_and(is_ident_start) {
                    read_ident(tstart)
                } else {
                    tstart
                };
                if tend == tstart {
                    return Err(ParseError::new(
                        src,
                        offset_of(tstart),
                        format!("expected target action for branch '{}'", word),
                    ));
                }
                let target = src[offset_of(tstart)..offset_of(tend)].to_string();
                tokens.push(Spanned {
                    token: Token::Branch(word, target),
                    offset,
                });
                pos = tend;
            } else {
                tokens.push(Spanned {
                    token: Token::Word(word),
                    offset,
                });
            }
            continue;
        }

        return Err(ParseError::new(
            src,
            offset,
            format!("unexpected character '{}'", c),
        ));
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}
