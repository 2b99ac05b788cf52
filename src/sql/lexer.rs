//! SQL tokenizer shared by dump reflection and statement validation.
//!
//! Comments, whitespace and operator characters produce no tokens. Quoted
//! identifiers (`"x"`, `` `x` ``, `[x]`) come back as [`Token::Ident`], so a
//! quoted keyword is never mistaken for the keyword itself.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Create,
    Alter,
    Add,
    Table,
    Only,
    Primary,
    Key,
    Foreign,
    References,
    Not,
    Null,
    Unique,
    Default,
    On,
    Delete,
    Update,
    Cascade,
    Restrict,
    Constraint,
    Index,
    If,
    Exists,
    /// `AUTO` of MySQL's two-word `AUTO INCREMENT` spelling.
    Auto,
    Increment,
    /// `SERIAL` and its sized variants.
    Serial,
    Check,
    Insert,
    Into,
    Values,
    Select,
    From,
    Join,
    As,
    With,

    Ident(String),
    /// String literal with quotes removed and escapes resolved.
    Str(String),
    Num(String),

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "CREATE" => Token::Create,
        "ALTER" => Token::Alter,
        "ADD" => Token::Add,
        "TABLE" => Token::Table,
        "ONLY" => Token::Only,
        "PRIMARY" => Token::Primary,
        "KEY" => Token::Key,
        "FOREIGN" => Token::Foreign,
        "REFERENCES" => Token::References,
        "NOT" => Token::Not,
        "NULL" => Token::Null,
        "UNIQUE" => Token::Unique,
        "DEFAULT" => Token::Default,
        "ON" => Token::On,
        "DELETE" => Token::Delete,
        "UPDATE" => Token::Update,
        "CASCADE" => Token::Cascade,
        "RESTRICT" => Token::Restrict,
        "CONSTRAINT" => Token::Constraint,
        "INDEX" => Token::Index,
        "IF" => Token::If,
        "EXISTS" => Token::Exists,
        "AUTO" => Token::Auto,
        "INCREMENT" | "AUTO_INCREMENT" | "AUTOINCREMENT" => Token::Increment,
        "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => Token::Serial,
        "CHECK" => Token::Check,
        "INSERT" => Token::Insert,
        "INTO" => Token::Into,
        "VALUES" => Token::Values,
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "JOIN" => Token::Join,
        "AS" => Token::As,
        "WITH" => Token::With,
        _ => return None,
    };
    Some(token)
}

/// Cursor over the input, tracked as a byte offset.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    backslash_escapes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            backslash_escapes: false,
        }
    }

    /// Treat `\` inside string literals as an escape character (MySQL).
    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn first(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.first()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.first().is_some_and(&pred) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn skip_trivia(&mut self) {
        loop {
            self.eat_while(char::is_whitespace);
            let rest = self.rest();
            if rest.starts_with("--") || rest.starts_with('#') {
                self.eat_while(|c| c != '\n');
            } else if let Some(body) = rest.strip_prefix("/*") {
                self.pos = match body.find("*/") {
                    Some(end) => self.pos + 2 + end + 2,
                    None => self.input.len(),
                };
            } else {
                return;
            }
        }
    }

    /// Read a quoted run closed by `close`; a doubled `close` is literal.
    fn quoted(&mut self, close: char, escapes: bool) -> String {
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == close {
                if self.first() == Some(close) {
                    self.bump();
                    out.push(close);
                    continue;
                }
                break;
            }
            if escapes && c == '\\' {
                match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(other) => out.push(other),
                    None => break,
                }
                continue;
            }
            out.push(c);
        }
        out
    }

    /// `$tag$ ... $tag$` body, if a dollar quote opens here.
    fn dollar_quoted(&mut self) -> Option<String> {
        let rest = self.rest();
        let tag_len = rest[1..].find('$')?;
        let tag = &rest[1..1 + tag_len];
        if !tag.chars().all(|c| c.is_alphanumeric() || c == '_')
            || tag.starts_with(|c: char| c.is_ascii_digit())
        {
            return None;
        }
        let delimiter = &rest[..tag_len + 2];
        let body_start = delimiter.len();
        let body = match rest[body_start..].find(delimiter) {
            Some(end) => {
                self.pos += body_start + end + delimiter.len();
                &rest[body_start..body_start + end]
            }
            None => {
                self.pos = self.input.len();
                &rest[body_start..]
            }
        };
        Some(body.to_string())
    }

    fn number(&mut self) -> String {
        let start = self.pos;
        if self.first() == Some('-') {
            self.bump();
        }
        self.eat_while(|c| c.is_ascii_digit());
        if self.first() == Some('.') && self.second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.first(), Some('e' | 'E')) {
            let exponent = &self.rest()[1..];
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if digits.starts_with(|c: char| c.is_ascii_digit()) {
                self.pos += self.rest().len() - digits.len();
                self.eat_while(|c| c.is_ascii_digit());
            }
        }
        self.input[start..self.pos].to_string()
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();
            let Some(c) = self.first() else {
                return Token::Eof;
            };

            let simple = match c {
                '(' => Some(Token::LParen),
                ')' => Some(Token::RParen),
                ',' => Some(Token::Comma),
                ';' => Some(Token::Semicolon),
                '.' => Some(Token::Dot),
                _ => None,
            };
            if let Some(token) = simple {
                self.bump();
                return token;
            }

            match c {
                '\'' => return Token::Str(self.quoted('\'', self.backslash_escapes)),
                '"' | '`' => return Token::Ident(self.quoted(c, false)),
                '[' => return Token::Ident(self.quoted(']', false)),
                '$' => {
                    if let Some(body) = self.dollar_quoted() {
                        return Token::Str(body);
                    }
                    self.bump();
                }
                '-' if self.second().is_some_and(|d| d.is_ascii_digit()) => {
                    return Token::Num(self.number());
                }
                c if c.is_ascii_digit() => return Token::Num(self.number()),
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.eat_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
                    return keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()));
                }
                _ => {
                    // Operators and anything unrecognised
                    self.bump();
                }
            }
        }
    }

    /// All tokens, terminated by a single [`Token::Eof`].
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.by_ref().collect();
        tokens.push(Token::Eof);
        tokens
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_create_table() {
        let tokens = Lexer::new("CREATE TABLE users (id INT);").tokenize();
        assert_eq!(
            tokens,
            vec![
                Token::Create,
                Token::Table,
                ident("users"),
                Token::LParen,
                ident("id"),
                ident("INT"),
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = Lexer::new(r#"CREATE TABLE "User ""Table""" (`col name` INT, [dbo] INT);"#).tokenize();
        assert_eq!(tokens[2], ident("User \"Table\""));
        assert_eq!(tokens[4], ident("col name"));
        assert_eq!(tokens[7], ident("dbo"));
    }

    #[test]
    fn test_quoted_keyword_stays_identifier() {
        let tokens = Lexer::new(r#"SELECT * FROM "from""#).tokenize();
        assert_eq!(tokens, vec![Token::Select, Token::From, ident("from"), Token::Eof]);
    }

    #[test]
    fn test_select_keywords() {
        let sql = "select o.id from orders o join customers c on c.id = o.customer_id";
        let tokens = Lexer::new(sql).tokenize();
        assert_eq!(&tokens[..3], &[Token::Select, ident("o"), Token::Dot]);
        assert_eq!(tokens[4], Token::From);
        assert_eq!(tokens[7], Token::Join);
        assert_eq!(tokens[10], Token::On);
    }

    #[test]
    fn test_strings_and_numbers() {
        let tokens = Lexer::new("VALUES ('it''s', -4.5, 1e3, 2.5E-2, 7)").tokenize();
        assert_eq!(
            tokens[1..tokens.len() - 1],
            [
                Token::LParen,
                Token::Str("it's".to_string()),
                Token::Comma,
                Token::Num("-4.5".to_string()),
                Token::Comma,
                Token::Num("1e3".to_string()),
                Token::Comma,
                Token::Num("2.5E-2".to_string()),
                Token::Comma,
                Token::Num("7".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_backslash_escapes_are_opt_in() {
        let sql = r"'C:\new' 'don\'t'";
        let plain: Vec<Token> = Lexer::new(r"'C:\new'").collect();
        assert_eq!(plain, vec![Token::Str(r"C:\new".to_string())]);

        let mysql: Vec<Token> = Lexer::new(sql).with_backslash_escapes(true).collect();
        assert_eq!(
            mysql,
            vec![Token::Str("C:\new".to_string()), Token::Str("don't".to_string())]
        );
    }

    #[test]
    fn test_dollar_quoted_body_is_one_string() {
        let sql = "CREATE FUNCTION f() AS $fn$ SELECT 'x'; CREATE TABLE fake (a INT); $fn$; SELECT $1";
        let tokens = Lexer::new(sql).tokenize();
        assert_eq!(
            tokens[6],
            Token::Str(" SELECT 'x'; CREATE TABLE fake (a INT); ".to_string())
        );
        assert_eq!(&tokens[7..], &[Token::Semicolon, Token::Select, Token::Num("1".to_string()), Token::Eof]);
    }

    #[test]
    fn test_comments_are_skipped() {
        let sql = "-- header\n# mysql\nCREATE /* block */ TABLE /*!40101 x */ t";
        let tokens = Lexer::new(sql).tokenize();
        assert_eq!(tokens, vec![Token::Create, Token::Table, ident("t"), Token::Eof]);
    }

    #[test]
    fn test_auto_increment_spellings() {
        let tokens: Vec<Token> = Lexer::new("AUTO_INCREMENT autoincrement AUTO INCREMENT bigserial").collect();
        assert_eq!(
            tokens,
            vec![
                Token::Increment,
                Token::Increment,
                Token::Auto,
                Token::Increment,
                Token::Serial,
            ]
        );
    }
}
