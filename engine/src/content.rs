//! The tagged union at the heart of a cell: `Empty`, `Text`, or `Formula`.

use std::cell::RefCell;

use crate::error::{FormulaError, SheetError};
use crate::formula::{self, Formula};
use crate::position::Position;
use crate::value::Value;

pub const FORMULA_SIGN: u8 = b'=';
pub const ESCAPE_SIGN: u8 = b'\'';

#[derive(Debug)]
pub enum CellContent {
    Empty,
    Text { raw: String },
    FormulaCell {
        formula: Box<dyn Formula>,
        cache: RefCell<Option<Value>>,
    },
}

impl CellContent {
    /// Parse `text` into the content variant it prospectively describes
    /// (SPEC_FULL.md §4.1 step 2). Does not consult or mutate any sheet state.
    pub fn parse(text: &str) -> Result<CellContent, SheetError> {
        if text.is_empty() {
            return Ok(CellContent::Empty);
        }
        if text.as_bytes()[0] == FORMULA_SIGN && text.len() >= 2 {
            let formula = formula::parse(&text[1..])?;
            return Ok(CellContent::FormulaCell {
                formula,
                cache: RefCell::new(None),
            });
        }
        Ok(CellContent::Text {
            raw: text.to_string(),
        })
    }

    /// Canonical stored text: the raw user text for Empty/Text, or
    /// `"=" + formula.expression()` for a formula (never the user's original
    /// bytes — this is what keeps `set_cell` idempotent on re-application).
    pub fn text(&self) -> String {
        match self {
            CellContent::Empty => String::new(),
            CellContent::Text { raw } => raw.clone(),
            CellContent::FormulaCell { formula, .. } => format!("={}", formula.expression()),
        }
    }

    pub fn referenced_positions(&self) -> &[Position] {
        match self {
            CellContent::FormulaCell { formula, .. } => formula.referenced_positions(),
            _ => &[],
        }
    }

    pub fn has_cache(&self) -> bool {
        matches!(self, CellContent::FormulaCell { cache, .. } if cache.borrow().is_some())
    }

    pub fn invalidate_cache(&self) {
        if let CellContent::FormulaCell { cache, .. } = self {
            cache.borrow_mut().take();
        }
    }

    /// The value as observed by a direct `get_value()` call. An `Empty` cell
    /// always reports `#VALUE!` here, even though the same cell evaluates to
    /// `0` when referenced from inside a formula (SPEC_FULL.md §4.2, §9).
    pub fn value(&self, lookup: &dyn Fn(Position) -> Result<Value, FormulaError>) -> Value {
        match self {
            CellContent::Empty => Value::Error(FormulaError::Value),
            CellContent::Text { raw } => {
                if raw.as_bytes().first() == Some(&ESCAPE_SIGN) {
                    Value::Text(raw[1..].to_string())
                } else {
                    Value::Text(raw.clone())
                }
            }
            CellContent::FormulaCell { formula, cache } => {
                if let Some(v) = cache.borrow().as_ref() {
                    return v.clone();
                }
                let value = match formula.evaluate(lookup) {
                    Ok(n) => Value::Number(n),
                    Err(e) => Value::Error(e),
                };
                *cache.borrow_mut() = Some(value.clone());
                value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_refs(_: Position) -> Result<Value, FormulaError> {
        unreachable!("no references expected")
    }

    #[test]
    fn empty_text_is_empty() {
        let c = CellContent::parse("").unwrap();
        assert_eq!(c.text(), "");
        assert_eq!(c.value(&no_refs), Value::Error(FormulaError::Value));
    }

    #[test]
    fn bare_equals_is_text_not_formula() {
        let c = CellContent::parse("=").unwrap();
        assert_eq!(c.text(), "=");
        assert_eq!(c.value(&no_refs), Value::Text("=".into()));
    }

    #[test]
    fn escape_sign_is_stripped_from_value_but_kept_in_text() {
        let c = CellContent::parse("'=hello").unwrap();
        assert_eq!(c.text(), "'=hello");
        assert_eq!(c.value(&no_refs), Value::Text("=hello".into()));
    }

    #[test]
    fn formula_text_is_canonical() {
        let c = CellContent::parse("=  1 + 2 ").unwrap();
        assert_eq!(c.text(), "=1+2");
    }

    #[test]
    fn formula_caches_after_first_read() {
        let c = CellContent::parse("=1+2").unwrap();
        assert!(!c.has_cache());
        assert_eq!(c.value(&no_refs), Value::Number(3.0));
        assert!(c.has_cache());
    }
}
