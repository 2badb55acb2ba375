//! 記述論理の項 (term) 代数
//!
//! このクレートはテーブルロー推論器が扱う項を提供します:
//! - 概念・ロール・名前 (`Term`, `Role`, `Name`)
//! - 否定標準形 (NNF) への変換と簡約化
//! - リテラルとデータ範囲 (`Literal`, `DataRange`)

pub mod datatype;
pub mod model;
pub mod normalize;

pub use datatype::{DataRange, Datatype, Literal, LiteralValue};
pub use model::{Name, Role, Term};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermError {
    #[error("Unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    #[error("Malformed literal {lexical:?} for datatype {datatype}")]
    MalformedLiteral { lexical: String, datatype: String },
}
