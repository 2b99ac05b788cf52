//! SQL dump reflection: CREATE TABLE, CREATE INDEX, ALTER TABLE constraints
//! and INSERT rows.

use super::dialect::Dialect;
use super::lexer::{Lexer, Token};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlParseError {
    #[error("Unexpected token: {0:?}")]
    UnexpectedToken(Token),
    #[error("Unexpected end of input in table '{0}'")]
    UnexpectedEof(String),
}

/// Everything reflected from one dump.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedDump {
    pub dialect: Dialect,
    pub tables: Vec<ParsedTable>,
    pub inserts: Vec<ParsedInsert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub name: String,
    pub columns: Vec<ParsedColumn>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ParsedForeignKey>,
    pub indexes: Vec<ParsedIndex>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedColumn {
    pub name: String,
    pub raw_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub autoincrement: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedForeignKey {
    pub columns: Vec<String>,
    pub target: String,
    /// Empty when the reference names no column.
    pub target_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIndex {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsert {
    pub table: String,
    /// Empty when the statement lists no columns.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Literal>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(String),
    Null,
    /// Bare words and expressions, kept as written.
    Word(String),
}

/// Constraint declared outside the CREATE TABLE body, applied once all
/// tables are known.
enum DeferredAction {
    ForeignKey(ParsedForeignKey),
    PrimaryKey(Vec<String>),
    Index(ParsedIndex),
}

/// Reflect a SQL dump.
pub fn parse_sql(input: &str, dialect: Dialect) -> Result<ParsedDump, SqlParseError> {
    let dialect = dialect.resolve(input);
    let tokens = Lexer::new(input)
        .with_backslash_escapes(dialect == Dialect::MySQL)
        .tokenize();
    let mut parser = Parser::new(tokens);
    let (tables, inserts) = parser.parse()?;
    Ok(ParsedDump {
        dialect,
        tables,
        inserts,
    })
}

fn is_word(token: &Token, word: &str) -> bool {
    matches!(token, Token::Ident(s) if s.eq_ignore_ascii_case(word))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn parse(&mut self) -> Result<(Vec<ParsedTable>, Vec<ParsedInsert>), SqlParseError> {
        let mut tables: Vec<ParsedTable> = Vec::new();
        let mut inserts = Vec::new();
        let mut deferred: Vec<(String, DeferredAction)> = Vec::new();

        while self.current() != &Token::Eof {
            match self.current() {
                Token::Create => {
                    self.advance();

                    // Skip OR REPLACE / TEMPORARY and similar prefixes
                    while matches!(self.current(), Token::Ident(_)) {
                        self.advance();
                    }

                    match self.current() {
                        Token::Table => {
                            self.advance();
                            self.skip_if_not_exists();
                            if let Some(table) = self.parse_create_table()? {
                                tables.push(table);
                            }
                        }
                        Token::Unique | Token::Index => {
                            if let Some((table_name, index)) = self.parse_create_index() {
                                deferred.push((table_name, DeferredAction::Index(index)));
                            }
                        }
                        _ => {
                            // Skip other CREATE statements (VIEW, SEQUENCE, etc.)
                            self.skip_statement();
                        }
                    }
                }
                Token::Alter => {
                    deferred.extend(self.parse_alter_table()?);
                }
                Token::Insert => {
                    if let Some(insert) = self.parse_insert() {
                        inserts.push(insert);
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }

        for (table_name, action) in deferred {
            let Some(table) = tables.iter_mut().find(|t| t.name == table_name) else {
                continue;
            };
            match action {
                DeferredAction::ForeignKey(fk) => table.foreign_keys.push(fk),
                DeferredAction::PrimaryKey(cols) => apply_primary_key(table, &cols),
                DeferredAction::Index(index) => table.indexes.push(index),
            }
        }

        Ok((tables, inserts))
    }

    fn skip_if_not_exists(&mut self) {
        if self.current() == &Token::If {
            self.advance(); // IF
            if self.current() == &Token::Not {
                self.advance(); // NOT
            }
            if self.current() == &Token::Exists {
                self.advance(); // EXISTS
            }
        }
    }

    /// Read `name` or `schema.name`, keeping the last part.
    fn parse_qualified_name(&mut self) -> Option<String> {
        let mut name = match self.current() {
            Token::Ident(name) => name.clone(),
            _ => return None,
        };
        self.advance();

        while self.current() == &Token::Dot {
            self.advance();
            match self.current() {
                Token::Ident(part) => {
                    name = part.clone();
                    self.advance();
                }
                _ => return None,
            }
        }
        Some(name)
    }

    fn parse_create_table(&mut self) -> Result<Option<ParsedTable>, SqlParseError> {
        let Some(table_name) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        if self.current() != &Token::LParen {
            // CREATE TABLE ... AS SELECT and friends carry no column list
            self.skip_statement();
            return Ok(None);
        }
        self.advance();

        let mut table = ParsedTable {
            name: table_name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        };
        let mut pk_columns: Vec<String> = Vec::new();
        let mut constraint_name: Option<String> = None;

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                    constraint_name = None;
                }
                Token::Primary => {
                    // PRIMARY KEY (col1, col2, ...)
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                        pk_columns.extend(self.parse_column_list());
                    }
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Foreign => {
                    // FOREIGN KEY (col) REFERENCES table(col)
                    if let Some(fk) = self.parse_foreign_key_constraint()? {
                        table.foreign_keys.push(fk);
                    }
                }
                Token::Unique => {
                    // UNIQUE [KEY|INDEX] [name] (col1, col2, ...)
                    self.advance();
                    if matches!(self.current(), Token::Key | Token::Index) {
                        self.advance();
                    }
                    let mut name = constraint_name.take();
                    if let Token::Ident(n) = self.current() {
                        name = Some(n.clone());
                        self.advance();
                    }
                    let columns = self.parse_column_list();
                    if !columns.is_empty() {
                        table.indexes.push(ParsedIndex {
                            name,
                            columns,
                            unique: true,
                        });
                    }
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Constraint => {
                    // Named constraint, the type follows the name
                    self.advance();
                    if let Token::Ident(name) = self.current() {
                        constraint_name = Some(name.clone());
                        self.advance();
                    }
                }
                Token::Index | Token::Key => {
                    // MySQL inline INDEX/KEY [name] (cols)
                    self.advance();
                    let mut name = None;
                    if let Token::Ident(n) = self.current() {
                        name = Some(n.clone());
                        self.advance();
                    }
                    let columns = self.parse_column_list();
                    if !columns.is_empty() {
                        table.indexes.push(ParsedIndex {
                            name,
                            columns,
                            unique: false,
                        });
                    }
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::Ident(_) => {
                    if let Some((column, fk)) = self.parse_column()? {
                        if let Some(fk) = fk {
                            table.foreign_keys.push(fk);
                        }
                        table.columns.push(column);
                    }
                }
                Token::Eof => return Err(SqlParseError::UnexpectedEof(table.name)),
                _ => {
                    self.advance();
                }
            }
        }

        // Skip table options (ENGINE=, etc.)
        self.skip_statement();

        for column in table.columns.iter().filter(|c| c.primary_key) {
            if !pk_columns.contains(&column.name) {
                pk_columns.push(column.name.clone());
            }
        }
        apply_primary_key(&mut table, &pk_columns);

        Ok(Some(table))
    }

    fn parse_column(&mut self) -> Result<Option<(ParsedColumn, Option<ParsedForeignKey>)>, SqlParseError> {
        let name = match self.current() {
            Token::Ident(n) => n.clone(),
            _ => return Ok(None),
        };
        self.advance();

        // Type
        let mut raw_type = String::new();
        let mut paren_depth = 0;
        let mut autoincrement = false;

        loop {
            let part = match self.current() {
                Token::Ident(t) if paren_depth == 0 && is_type_terminator(t, self.peek()) => break,
                Token::Ident(t) => t.clone(),
                Token::Serial => {
                    autoincrement = true;
                    "SERIAL".to_string()
                }
                Token::With if paren_depth == 0 => "WITH".to_string(),
                Token::LParen => {
                    paren_depth += 1;
                    "(".to_string()
                }
                Token::RParen if paren_depth > 0 => {
                    paren_depth -= 1;
                    ")".to_string()
                }
                Token::Num(n) => n.clone(),
                Token::Comma if paren_depth > 0 => ",".to_string(),
                _ => break,
            };
            push_type_part(&mut raw_type, &part);
            self.advance();
        }

        if raw_type.is_empty() {
            return Ok(None);
        }

        let mut column = ParsedColumn {
            name: name.clone(),
            raw_type,
            autoincrement,
            ..Default::default()
        };
        let mut fk = None;

        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    column.primary_key = true;
                }
                Token::Not => {
                    self.advance();
                    if self.current() == &Token::Null {
                        self.advance();
                        column.not_null = true;
                    }
                }
                Token::Null => {
                    self.advance();
                }
                Token::Unique => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    column.unique = true;
                }
                Token::Default => {
                    self.advance();
                    let value = self.parse_default_value();
                    if !value.is_empty() {
                        column.default = Some(value);
                    }
                }
                Token::References => {
                    // Inline FK reference
                    self.advance();
                    let (target, target_column) = self.parse_reference()?;
                    fk = Some(ParsedForeignKey {
                        columns: vec![name.clone()],
                        target,
                        target_columns: target_column.into_iter().collect(),
                    });
                    self.skip_on_actions();
                }
                Token::Increment | Token::Auto => {
                    self.advance();
                    if self.current() == &Token::Increment {
                        self.advance();
                    }
                    column.autoincrement = true;
                }
                Token::Serial => {
                    self.advance();
                    column.autoincrement = true;
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("GENERATED") => {
                    // GENERATED { ALWAYS | BY DEFAULT } AS IDENTITY
                    while !matches!(self.current(), Token::Comma | Token::RParen | Token::Eof) {
                        if is_word(self.current(), "IDENTITY") {
                            column.autoincrement = true;
                        }
                        if self.current() == &Token::LParen {
                            self.skip_parenthesized();
                        } else {
                            self.advance();
                        }
                    }
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("IDENTITY") => {
                    // SQL Server IDENTITY(1,1)
                    self.advance();
                    if self.current() == &Token::LParen {
                        self.skip_parenthesized();
                    }
                    column.autoincrement = true;
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::Comma | Token::RParen | Token::Eof => break,
                Token::Constraint => {
                    // Inline constraint
                    self.advance();
                    if let Token::Ident(_) = self.current() {
                        self.advance();
                    }
                }
                Token::On => {
                    // ON UPDATE CURRENT_TIMESTAMP and similar
                    self.skip_on_actions();
                }
                Token::LParen => {
                    self.skip_parenthesized();
                }
                _ => {
                    self.advance();
                }
            }
        }

        if column.primary_key {
            column.not_null = true;
        }

        Ok(Some((column, fk)))
    }

    fn parse_default_value(&mut self) -> String {
        match self.current() {
            Token::Str(s) => {
                let val = format!("'{}'", s);
                self.advance();
                val
            }
            Token::Num(n) => {
                let val = n.clone();
                self.advance();
                val
            }
            Token::Null => {
                self.advance();
                "NULL".to_string()
            }
            Token::Ident(s) => {
                let mut val = s.clone();
                self.advance();
                // Handle function calls like NOW()
                if self.current() == &Token::LParen {
                    self.advance();
                    val.push('(');
                    val.push_str(&self.collect_until_paren());
                    val.push(')');
                }
                val
            }
            Token::LParen => {
                // Expression in parentheses
                self.advance();
                format!("({})", self.collect_until_paren())
            }
            _ => String::new(),
        }
    }

    /// Collect the remaining tokens of a parenthesized group as text.
    /// The opening parenthesis has already been consumed.
    fn collect_until_paren(&mut self) -> String {
        let mut parts = Vec::new();
        let mut depth = 1;

        loop {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    parts.push("(".to_string());
                    self.advance();
                }
                Token::RParen => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    parts.push(")".to_string());
                }
                Token::Ident(s) => {
                    parts.push(s.clone());
                    self.advance();
                }
                Token::Num(n) => {
                    parts.push(n.clone());
                    self.advance();
                }
                Token::Str(s) => {
                    parts.push(format!("'{}'", s));
                    self.advance();
                }
                Token::Comma => {
                    parts.push(",".to_string());
                    self.advance();
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        parts.join(" ")
    }

    fn parse_reference(&mut self) -> Result<(String, Option<String>), SqlParseError> {
        let Some(target) = self.parse_qualified_name() else {
            return Err(SqlParseError::UnexpectedToken(self.current().clone()));
        };

        let column = self.parse_column_list().into_iter().next();
        Ok((target, column))
    }

    fn parse_foreign_key_constraint(&mut self) -> Result<Option<ParsedForeignKey>, SqlParseError> {
        self.advance(); // FOREIGN
        if self.current() != &Token::Key {
            return Ok(None);
        }
        self.advance(); // KEY

        // MySQL allows an index name before the column list
        if let Token::Ident(_) = self.current() {
            self.advance();
        }
        let columns = self.parse_column_list();

        if self.current() != &Token::References {
            return Ok(None);
        }
        self.advance();

        let target = match self.parse_qualified_name() {
            Some(t) => t,
            None => return Err(SqlParseError::UnexpectedToken(self.current().clone())),
        };
        let target_columns = self.parse_column_list();

        // ON DELETE/UPDATE
        self.skip_on_actions();

        Ok(Some(ParsedForeignKey {
            columns,
            target,
            target_columns,
        }))
    }

    /// Parse `(a, b DESC, name(10))`, one column per element. Elements that
    /// are expressions contribute nothing.
    fn parse_column_list(&mut self) -> Vec<String> {
        let mut cols = Vec::new();

        if self.current() != &Token::LParen {
            return cols;
        }
        self.advance();

        let mut at_element_start = true;
        loop {
            match self.current() {
                Token::Ident(name) if at_element_start => {
                    let name = name.clone();
                    self.advance();
                    at_element_start = false;
                    if self.current() == &Token::LParen {
                        // name(10) is a prefix length, lower(name) an expression
                        let is_prefix = matches!(self.peek(), Token::Num(_));
                        self.skip_parenthesized();
                        if is_prefix {
                            cols.push(name);
                        }
                    } else {
                        cols.push(name);
                    }
                }
                Token::Comma => {
                    self.advance();
                    at_element_start = true;
                }
                Token::LParen => {
                    self.skip_parenthesized();
                    at_element_start = false;
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                    at_element_start = false;
                }
            }
        }

        cols
    }

    fn skip_on_actions(&mut self) {
        while self.current() == &Token::On {
            self.advance();
            // DELETE or UPDATE
            if matches!(self.current(), Token::Delete | Token::Update) {
                self.advance();
            }
            // Action: CASCADE, RESTRICT, SET NULL, SET DEFAULT, NO ACTION
            match self.current() {
                Token::Cascade | Token::Restrict => {
                    self.advance();
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("SET") => {
                    self.advance();
                    if matches!(self.current(), Token::Null | Token::Default) {
                        self.advance();
                    }
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("NO") => {
                    self.advance();
                    if is_word(self.current(), "ACTION") {
                        self.advance();
                    }
                }
                _ => {}
            }
        }
    }

    /// Skip a parenthesized group starting at the current `(`.
    fn skip_parenthesized(&mut self) {
        if self.current() != &Token::LParen {
            self.advance();
            return;
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    self.advance();
                }
                Token::RParen => {
                    depth -= 1;
                    self.advance();
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_statement(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            self.advance();
        }
        if self.current() == &Token::Semicolon {
            self.advance();
        }
    }

    fn skip_until(&mut self, tokens: &[Token]) {
        while !tokens.contains(self.current()) && self.current() != &Token::Eof {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }

    /// CREATE [UNIQUE] INDEX [IF NOT EXISTS] [name] ON [ONLY] table [USING m] (cols)
    fn parse_create_index(&mut self) -> Option<(String, ParsedIndex)> {
        let mut unique = false;
        if self.current() == &Token::Unique {
            unique = true;
            self.advance();
        }
        if self.current() != &Token::Index {
            self.skip_statement();
            return None;
        }
        self.advance();
        if is_word(self.current(), "CONCURRENTLY") {
            self.advance();
        }
        self.skip_if_not_exists();

        let name = if self.current() == &Token::On {
            None
        } else {
            self.parse_qualified_name()
        };
        if self.current() != &Token::On {
            self.skip_statement();
            return None;
        }
        self.advance();
        if self.current() == &Token::Only {
            self.advance();
        }

        let Some(table) = self.parse_qualified_name() else {
            self.skip_statement();
            return None;
        };
        // USING btree
        if is_word(self.current(), "USING") {
            self.advance();
            self.advance();
        }
        let columns = self.parse_column_list();
        self.skip_statement();

        if columns.is_empty() {
            return None;
        }
        Some((
            table,
            ParsedIndex {
                name,
                columns,
                unique,
            },
        ))
    }

    /// ALTER TABLE [ONLY] t ADD [CONSTRAINT name] {FOREIGN KEY | PRIMARY KEY | UNIQUE} ...
    /// Several comma-separated ADD clauses may follow one ALTER TABLE.
    fn parse_alter_table(&mut self) -> Result<Vec<(String, DeferredAction)>, SqlParseError> {
        self.advance(); // ALTER
        let mut actions = Vec::new();

        if self.current() != &Token::Table {
            self.skip_statement();
            return Ok(actions);
        }
        self.advance(); // TABLE
        self.skip_if_not_exists();
        if self.current() == &Token::Only {
            self.advance();
        }

        let Some(table_name) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(actions);
        };

        loop {
            if self.current() != &Token::Add {
                break;
            }
            self.advance(); // ADD

            let mut constraint_name = None;
            if self.current() == &Token::Constraint {
                self.advance();
                if let Token::Ident(name) = self.current() {
                    constraint_name = Some(name.clone());
                    self.advance();
                }
            }

            match self.current() {
                Token::Foreign => {
                    if let Some(fk) = self.parse_foreign_key_constraint()? {
                        actions.push((table_name.clone(), DeferredAction::ForeignKey(fk)));
                    }
                }
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    let cols = self.parse_column_list();
                    actions.push((table_name.clone(), DeferredAction::PrimaryKey(cols)));
                }
                Token::Unique => {
                    self.advance();
                    if matches!(self.current(), Token::Key | Token::Index) {
                        self.advance();
                    }
                    let columns = self.parse_column_list();
                    if !columns.is_empty() {
                        actions.push((
                            table_name.clone(),
                            DeferredAction::Index(ParsedIndex {
                                name: constraint_name,
                                columns,
                                unique: true,
                            }),
                        ));
                    }
                }
                _ => {}
            }

            // Move to the next ADD clause or the end of the statement
            while !matches!(
                self.current(),
                Token::Comma | Token::Semicolon | Token::Eof
            ) {
                if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                } else {
                    self.advance();
                }
            }
            if self.current() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        self.skip_statement();
        Ok(actions)
    }

    /// INSERT [IGNORE] INTO t [(cols)] VALUES (...), (...)
    fn parse_insert(&mut self) -> Option<ParsedInsert> {
        self.advance(); // INSERT
        while matches!(self.current(), Token::Ident(_)) {
            self.advance(); // IGNORE, OR REPLACE, ...
        }
        if self.current() != &Token::Into {
            self.skip_statement();
            return None;
        }
        self.advance();

        let Some(table) = self.parse_qualified_name() else {
            self.skip_statement();
            return None;
        };
        let columns = self.parse_column_list();

        if self.current() != &Token::Values {
            // INSERT ... SELECT carries no literal rows
            self.skip_statement();
            return None;
        }
        self.advance();

        let mut rows = Vec::new();
        while self.current() == &Token::LParen {
            self.advance();
            rows.push(self.parse_row());
            if self.current() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.skip_statement();

        Some(ParsedInsert {
            table,
            columns,
            rows,
        })
    }

    /// Parse one VALUES tuple. The opening parenthesis has been consumed.
    fn parse_row(&mut self) -> Vec<Literal> {
        let mut values = Vec::new();

        loop {
            let value = match self.current() {
                Token::Str(s) => Literal::Str(s.clone()),
                Token::Num(n) => Literal::Num(n.clone()),
                Token::Null => Literal::Null,
                Token::Ident(w) => {
                    let mut word = w.clone();
                    if self.peek() == &Token::LParen {
                        self.advance();
                        self.advance();
                        word.push('(');
                        word.push_str(&self.collect_until_paren());
                        word.push(')');
                        values.push(Literal::Word(word));
                        self.finish_value();
                        if !self.next_value() {
                            break;
                        }
                        continue;
                    }
                    Literal::Word(word)
                }
                Token::LParen => {
                    self.advance();
                    values.push(Literal::Word(format!("({})", self.collect_until_paren())));
                    self.finish_value();
                    if !self.next_value() {
                        break;
                    }
                    continue;
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                other => Literal::Word(format!("{other:?}")),
            };
            values.push(value);
            self.advance();
            self.finish_value();
            if !self.next_value() {
                break;
            }
        }

        values
    }

    /// Skip trailing tokens of the current value, such as `::text` casts.
    fn finish_value(&mut self) {
        while !matches!(self.current(), Token::Comma | Token::RParen | Token::Eof) {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }

    /// Consume the separator after a value. Returns false at the end of the tuple.
    fn next_value(&mut self) -> bool {
        match self.current() {
            Token::Comma => {
                self.advance();
                true
            }
            Token::RParen => {
                self.advance();
                false
            }
            _ => false,
        }
    }
}

/// Words that end a column type and start a column option.
fn is_type_terminator(word: &str, next: &Token) -> bool {
    let upper = word.to_ascii_uppercase();
    match upper.as_str() {
        "COLLATE" | "COMMENT" | "GENERATED" | "IDENTITY" => true,
        "CHARACTER" => is_word(next, "SET"),
        _ => false,
    }
}

fn push_type_part(raw_type: &mut String, part: &str) {
    let starts_word = part.starts_with(|c: char| c.is_alphabetic() || c == '_');
    let after_word = raw_type.ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == ')');
    if starts_word && after_word {
        raw_type.push(' ');
    }
    raw_type.push_str(part);
}

fn apply_primary_key(table: &mut ParsedTable, columns: &[String]) {
    for name in columns {
        if !table.primary_key.contains(name) {
            table.primary_key.push(name.clone());
        }
    }
    for column in &mut table.columns {
        if table.primary_key.contains(&column.name) {
            column.primary_key = true;
            column.not_null = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> ParsedDump {
        parse_sql(sql, Dialect::Generic).unwrap()
    }

    #[test]
    fn test_parse_simple_table() {
        let sql = r#"
            CREATE TABLE users (
                id INT PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE
            );
        "#;

        let dump = parse(sql);
        assert_eq!(dump.tables.len(), 1);

        let users = &dump.tables[0];
        assert_eq!(users.name, "users");
        assert_eq!(users.columns.len(), 2);
        assert_eq!(users.primary_key, vec!["id"]);

        assert_eq!(users.columns[0].name, "id");
        assert!(users.columns[0].primary_key);
        assert!(users.columns[0].not_null);

        assert_eq!(users.columns[1].name, "email");
        assert_eq!(users.columns[1].raw_type, "VARCHAR(255)");
        assert!(users.columns[1].not_null);
        assert!(users.columns[1].unique);
    }

    #[test]
    fn test_parse_with_foreign_key() {
        let sql = r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE orders (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users(id) ON DELETE CASCADE,
                note TEXT
            );
        "#;

        let dump = parse(sql);
        assert_eq!(dump.tables.len(), 2);

        let orders = &dump.tables[1];
        assert_eq!(orders.columns.len(), 3);
        assert_eq!(
            orders.foreign_keys,
            vec![ParsedForeignKey {
                columns: vec!["user_id".to_string()],
                target: "users".to_string(),
                target_columns: vec!["id".to_string()],
            }]
        );
    }

    #[test]
    fn test_parse_table_constraints() {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS public.enrollments (
                student_id INT NOT NULL,
                course_id INT NOT NULL,
                code VARCHAR(10),
                CONSTRAINT enrollments_pk PRIMARY KEY (student_id, course_id),
                CONSTRAINT code_key UNIQUE (code),
                FOREIGN KEY (course_id) REFERENCES courses (id)
            );
        "#;

        let dump = parse(sql);
        let t = &dump.tables[0];
        assert_eq!(t.name, "enrollments");
        assert_eq!(t.primary_key, vec!["student_id", "course_id"]);
        assert!(t.columns[0].primary_key && t.columns[1].primary_key);
        assert_eq!(
            t.indexes,
            vec![ParsedIndex {
                name: Some("code_key".to_string()),
                columns: vec!["code".to_string()],
                unique: true,
            }]
        );
        assert_eq!(t.foreign_keys[0].target, "courses");
    }

    #[test]
    fn test_parse_postgres_serial() {
        let sql = r#"
            CREATE TABLE users (
                id SERIAL PRIMARY KEY,
                name TEXT,
                created_at timestamp with time zone DEFAULT now()
            );
        "#;

        let dump = parse_sql(sql, Dialect::PostgreSQL).unwrap();
        let users = &dump.tables[0];

        assert_eq!(users.columns[0].raw_type, "SERIAL");
        assert!(users.columns[0].autoincrement);
        assert_eq!(users.columns[2].raw_type, "timestamp WITH time zone");
        assert_eq!(users.columns[2].default.as_deref(), Some("now()"));
    }

    #[test]
    fn test_parse_mysql_table() {
        let sql = r#"
            CREATE TABLE `users` (
                `id` INT(11) UNSIGNED NOT NULL AUTO_INCREMENT,
                `name` VARCHAR(255) CHARACTER SET utf8mb4 DEFAULT NULL,
                PRIMARY KEY (`id`),
                UNIQUE KEY `users_name` (`name`(20)),
                KEY `idx_name` (`name`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#;

        let dump = parse_sql(sql, Dialect::MySQL).unwrap();
        let users = &dump.tables[0];

        assert_eq!(users.columns[0].raw_type, "INT(11) UNSIGNED");
        assert!(users.columns[0].autoincrement);
        assert!(users.columns[0].primary_key);
        assert_eq!(users.columns[1].raw_type, "VARCHAR(255)");
        assert_eq!(users.columns[1].default.as_deref(), Some("NULL"));
        assert_eq!(users.indexes.len(), 2);
        assert!(users.indexes[0].unique);
        assert_eq!(users.indexes[0].columns, vec!["name"]);
        assert!(!users.indexes[1].unique);
    }

    #[test]
    fn test_parse_alter_table_constraints() {
        let sql = r#"
            CREATE TABLE public.customers (id integer NOT NULL, email text);
            CREATE TABLE public.orders (id integer NOT NULL, customer_id integer);
            ALTER TABLE ONLY public.customers ADD CONSTRAINT customers_pkey PRIMARY KEY (id);
            ALTER TABLE ONLY public.orders
                ADD CONSTRAINT orders_customer_fk FOREIGN KEY (customer_id) REFERENCES public.customers(id);
            CREATE UNIQUE INDEX customers_email_idx ON public.customers USING btree (email);
            CREATE INDEX orders_lower_idx ON orders (lower(customer_id));
        "#;

        let dump = parse(sql);
        let customers = &dump.tables[0];
        assert_eq!(customers.primary_key, vec!["id"]);
        assert!(customers.columns[0].primary_key);
        assert_eq!(customers.indexes[0].name.as_deref(), Some("customers_email_idx"));
        assert!(customers.indexes[0].unique);

        let orders = &dump.tables[1];
        assert_eq!(orders.foreign_keys[0].target, "customers");
        assert_eq!(orders.foreign_keys[0].columns, vec!["customer_id"]);
        // Expression index has no plain columns
        assert!(orders.indexes.is_empty());
    }

    #[test]
    fn test_parse_insert_rows() {
        let sql = r#"
            CREATE TABLE users (id INT, name TEXT, active BOOLEAN);
            INSERT INTO users (id, name, active) VALUES (1, 'Ana', TRUE), (2, NULL, false);
            INSERT INTO users VALUES (3, 'Luis'::text, now());
        "#;

        let dump = parse(sql);
        assert_eq!(dump.inserts.len(), 2);

        let first = &dump.inserts[0];
        assert_eq!(first.table, "users");
        assert_eq!(first.columns, vec!["id", "name", "active"]);
        assert_eq!(
            first.rows,
            vec![
                vec![
                    Literal::Num("1".to_string()),
                    Literal::Str("Ana".to_string()),
                    Literal::Word("TRUE".to_string()),
                ],
                vec![
                    Literal::Num("2".to_string()),
                    Literal::Null,
                    Literal::Word("false".to_string()),
                ],
            ]
        );

        let second = &dump.inserts[1];
        assert!(second.columns.is_empty());
        assert_eq!(
            second.rows[0],
            vec![
                Literal::Num("3".to_string()),
                Literal::Str("Luis".to_string()),
                Literal::Word("now()".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_table_is_an_error() {
        let err = parse_sql("CREATE TABLE broken (id INT", Dialect::Generic).unwrap_err();
        assert!(matches!(err, SqlParseError::UnexpectedEof(ref t) if t == "broken"));
    }

    #[test]
    fn test_skips_views_and_sequences() {
        let sql = r#"
            CREATE SEQUENCE users_id_seq;
            CREATE OR REPLACE VIEW active_users AS SELECT * FROM users;
            CREATE TABLE users (id INT);
        "#;
        let dump = parse(sql);
        assert_eq!(dump.tables.len(), 1);
        assert_eq!(dump.tables[0].name, "users");
    }
}
