//! SQL dump reflection and tokenization.

mod dialect;
pub mod lexer;
mod parser;
mod types;

pub use dialect::{Dialect, DumpInfo};
pub use parser::{
    parse_sql, Literal, ParsedColumn, ParsedDump, ParsedForeignKey, ParsedIndex, ParsedInsert,
    ParsedTable, SqlParseError,
};
pub use types::{classify, TypeFamily};
