//! Parses formula bodies (the text after `=`) into an [`AstNode`] using the
//! grammar in `grammar.pest`.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::SheetError;
use crate::position::Position;

use super::ast::{AstNode, BinaryOp, UnaryOp};

#[derive(Parser)]
#[grammar = "formula/grammar.pest"]
struct FormulaGrammar;

pub fn parse(body: &str) -> Result<AstNode, SheetError> {
    let mut pairs = FormulaGrammar::parse(Rule::formula, body)
        .map_err(|e| SheetError::ParseError(e.to_string()))?;
    let formula = pairs.next().expect("formula rule always produces one pair");
    let expr = formula.into_inner().next().expect("formula := expr EOI");
    build_expr(expr)
}

fn build_expr(pair: Pair<Rule>) -> Result<AstNode, SheetError> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            let mut node = build_expr(inner.next().expect("expr has a leading term"))?;
            while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
                let op = match op.as_str() {
                    "+" => BinaryOp::Add,
                    "-" => BinaryOp::Sub,
                    other => unreachable!("unexpected add_op {other}"),
                };
                node = AstNode::Binary {
                    op,
                    left: Box::new(node),
                    right: Box::new(build_expr(rhs)?),
                };
            }
            Ok(node)
        }
        Rule::term => {
            let mut inner = pair.into_inner();
            let mut node = build_expr(inner.next().expect("term has a leading unary"))?;
            while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
                let op = match op.as_str() {
                    "*" => BinaryOp::Mul,
                    "/" => BinaryOp::Div,
                    other => unreachable!("unexpected mul_op {other}"),
                };
                node = AstNode::Binary {
                    op,
                    left: Box::new(node),
                    right: Box::new(build_expr(rhs)?),
                };
            }
            Ok(node)
        }
        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = inner.next().expect("unary has at least a primary");
            match first.as_rule() {
                Rule::sign => {
                    let op = match first.as_str() {
                        "+" => UnaryOp::Plus,
                        "-" => UnaryOp::Minus,
                        other => unreachable!("unexpected sign {other}"),
                    };
                    let operand = build_expr(inner.next().expect("sign is followed by primary"))?;
                    Ok(AstNode::Unary {
                        op,
                        operand: Box::new(operand),
                    })
                }
                _ => build_expr(first),
            }
        }
        Rule::primary => build_expr(pair.into_inner().next().expect("primary wraps one child")),
        Rule::number => {
            let n: f64 = pair
                .as_str()
                .parse()
                .map_err(|_| SheetError::ParseError(format!("bad number: {}", pair.as_str())))?;
            Ok(AstNode::Number(n))
        }
        Rule::cell_ref => {
            let pos = Position::from_a1(pair.as_str())?;
            Ok(AstNode::Reference(pos))
        }
        other => unreachable!("unexpected rule in formula grammar: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_references() {
        let ast = parse("A1+B2*2").unwrap();
        assert_eq!(ast.print(), "A1+B2*2");
    }

    #[test]
    fn parses_parens() {
        let ast = parse("(A1+A2)*3").unwrap();
        assert_eq!(ast.print(), "(A1+A2)*3");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("A1+").is_err());
        assert!(parse("").is_err());
        assert!(parse("@#$").is_err());
    }
}
