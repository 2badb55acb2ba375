//! リテラルとデータ範囲

use crate::TermError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Supported XML Schema datatypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Datatype {
    String,
    Integer,
    Decimal,
    Boolean,
}

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

const DATATYPE_TABLE: &[(&str, Datatype)] = &[
    ("string", Datatype::String),
    ("integer", Datatype::Integer),
    ("int", Datatype::Integer),
    ("long", Datatype::Integer),
    ("decimal", Datatype::Decimal),
    ("double", Datatype::Decimal),
    ("float", Datatype::Decimal),
    ("boolean", Datatype::Boolean),
];

impl Datatype {
    /// Resolves `xsd:integer` or the full XML Schema IRI.
    pub fn from_iri(iri: &str) -> Result<Self, TermError> {
        let local = iri
            .strip_prefix(XSD)
            .or_else(|| iri.strip_prefix("xsd:"))
            .ok_or_else(|| TermError::UnsupportedDatatype(iri.to_string()))?;
        DATATYPE_TABLE
            .iter()
            .find(|(name, _)| *name == local)
            .map(|(_, datatype)| *datatype)
            .ok_or_else(|| TermError::UnsupportedDatatype(iri.to_string()))
    }

    pub fn iri(&self) -> &'static str {
        match self {
            Datatype::String => "xsd:string",
            Datatype::Integer => "xsd:integer",
            Datatype::Decimal => "xsd:decimal",
            Datatype::Boolean => "xsd:boolean",
        }
    }

    /// Integers are a subset of decimals.
    pub fn is_subtype_of(&self, other: &Datatype) -> bool {
        self == other || (*self == Datatype::Integer && *other == Datatype::Decimal)
    }

    /// Whether both value spaces share at least one value
    pub fn overlaps(&self, other: &Datatype) -> bool {
        self.is_subtype_of(other) || other.is_subtype_of(self)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iri())
    }
}

/// Typed literal in lexical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Datatype,
}

impl Literal {
    pub fn new(lexical: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            lexical: lexical.into(),
            datatype,
        }
    }

    /// Literal with a datatype given by IRI
    pub fn typed(lexical: impl Into<String>, datatype_iri: &str) -> Result<Self, TermError> {
        Ok(Self::new(lexical, Datatype::from_iri(datatype_iri)?))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value, Datatype::String)
    }

    pub fn integer(value: i64) -> Self {
        Self::new(value.to_string(), Datatype::Integer)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(value.to_string(), Datatype::Boolean)
    }

    /// Parses the lexical form into its value.
    pub fn value(&self) -> Result<LiteralValue, TermError> {
        let malformed = || TermError::MalformedLiteral {
            lexical: self.lexical.clone(),
            datatype: self.datatype.iri().to_string(),
        };
        let lexical = self.lexical.trim();
        match self.datatype {
            Datatype::String => Ok(LiteralValue::String(self.lexical.clone())),
            Datatype::Integer => lexical
                .parse::<i64>()
                .map(LiteralValue::Integer)
                .map_err(|_| malformed()),
            Datatype::Decimal => lexical
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(LiteralValue::Decimal)
                .ok_or_else(malformed),
            Datatype::Boolean => match lexical {
                "true" | "1" => Ok(LiteralValue::Boolean(true)),
                "false" | "0" => Ok(LiteralValue::Boolean(false)),
                _ => Err(malformed()),
            },
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}^^{}", self.lexical, self.datatype)
    }
}

/// Value of a literal in its datatype's value space
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
}

impl LiteralValue {
    pub fn datatype(&self) -> Datatype {
        match self {
            LiteralValue::String(_) => Datatype::String,
            LiteralValue::Integer(_) => Datatype::Integer,
            LiteralValue::Decimal(_) => Datatype::Decimal,
            LiteralValue::Boolean(_) => Datatype::Boolean,
        }
    }

    /// Value equality; integers and decimals compare numerically.
    pub fn same_value(&self, other: &LiteralValue) -> bool {
        match (self, other) {
            (LiteralValue::Integer(a), LiteralValue::Decimal(b))
            | (LiteralValue::Decimal(b), LiteralValue::Integer(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            LiteralValue::Integer(v) => Some(*v),
            LiteralValue::Decimal(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
}

/// Data range
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataRange {
    /// Whole value space of a datatype
    Datatype(Datatype),

    /// Enumeration of literals
    OneOf(BTreeSet<Literal>),

    /// Integers within inclusive bounds; `None` is unbounded
    IntegerRange { min: Option<i64>, max: Option<i64> },
}

impl DataRange {
    pub fn one_of(literals: impl IntoIterator<Item = Literal>) -> Self {
        DataRange::OneOf(literals.into_iter().collect())
    }

    pub fn integer_range(min: Option<i64>, max: Option<i64>) -> Self {
        DataRange::IntegerRange { min, max }
    }

    pub fn contains(&self, value: &LiteralValue) -> bool {
        match self {
            DataRange::Datatype(datatype) => value.datatype().is_subtype_of(datatype),
            DataRange::OneOf(literals) => literals
                .iter()
                .filter_map(|literal| literal.value().ok())
                .any(|candidate| candidate.same_value(value)),
            DataRange::IntegerRange { min, max } => match value.as_integer() {
                Some(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
                None => false,
            },
        }
    }

    /// Value space the range draws from
    pub fn base_datatype(&self) -> Option<Datatype> {
        match self {
            DataRange::Datatype(datatype) => Some(*datatype),
            DataRange::IntegerRange { .. } => Some(Datatype::Integer),
            DataRange::OneOf(_) => None,
        }
    }
}

impl fmt::Display for DataRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRange::Datatype(datatype) => write!(f, "{}", datatype),
            DataRange::OneOf(literals) => {
                write!(f, "(one-of-literals")?;
                for literal in literals {
                    write!(f, " {}", literal)?;
                }
                write!(f, ")")
            }
            DataRange::IntegerRange { min, max } => {
                let bound = |b: &Option<i64>| b.map_or_else(|| "*".to_string(), |v| v.to_string());
                write!(f, "(integer-range {} {})", bound(min), bound(max))
            }
        }
    }
}
