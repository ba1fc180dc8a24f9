//! Recursive evaluation of a parsed [`AstNode`] against a position lookup.

use crate::error::FormulaError;
use crate::position::Position;
use crate::value::Value;

use super::ast::{AstNode, BinaryOp, UnaryOp};

pub fn evaluate(
    node: &AstNode,
    lookup: &dyn Fn(Position) -> Result<Value, FormulaError>,
) -> Result<f64, FormulaError> {
    match node {
        AstNode::Number(n) => Ok(*n),
        AstNode::Reference(pos) => match lookup(*pos)? {
            Value::Number(n) => Ok(n),
            // A referenced text cell is coerced to a number here, at the
            // formula layer; `Cell::get_value()` never does this itself.
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| FormulaError::Value),
            Value::Error(e) => Err(e),
        },
        AstNode::Unary { op, operand } => {
            let v = evaluate(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => -v,
            })
        }
        AstNode::Binary { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        Err(FormulaError::Div0)
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
    }
}
