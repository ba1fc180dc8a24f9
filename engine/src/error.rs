//! Error taxonomy. `SheetError` covers structural failures that leave the
//! sheet unchanged; `FormulaError` covers evaluation failures, which are
//! *values* that flow through the formula language (see SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SheetError {
    #[error("invalid position")]
    InvalidPosition,

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("circular dependency")]
    CircularDependency,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaError {
    #[error("#REF!")]
    Ref,

    #[error("#VALUE!")]
    Value,

    #[error("#DIV/0!")]
    Div0,
}
