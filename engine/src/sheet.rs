//! The sheet: cell storage, row/col occupancy indexes, and the dependency
//! graph that backs cycle detection and cache invalidation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{self, Write};

use hashbrown::HashMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::content::CellContent;
use crate::error::{FormulaError, SheetError};
use crate::position::Position;
use crate::value::Value;

#[derive(Debug)]
struct Cell {
    content: CellContent,
}

/// Read-only view of a cell, borrowed from the owning sheet (§6.2).
#[derive(Debug)]
pub struct CellHandle<'a> {
    sheet: &'a Sheet,
    pos: Position,
}

impl<'a> CellHandle<'a> {
    fn cell(&self) -> &Cell {
        self.sheet
            .cells
            .get(&self.pos)
            .expect("handle only constructed for positions present in the sheet")
    }

    pub fn get_value(&self) -> Value {
        self.cell().content.value(&|p| self.sheet.lookup(p))
    }

    pub fn get_text(&self) -> String {
        self.cell().content.text()
    }

    pub fn get_referenced_positions(&self) -> &[Position] {
        self.cell().content.referenced_positions()
    }
}

/// Owns all cells, keyed by position; maintains row/col occupancy indexes and
/// the forward dependency graph (SPEC_FULL.md §3.4).
#[derive(Debug)]
pub struct Sheet {
    cells: HashMap<Position, Cell>,
    rows: BTreeMap<i32, BTreeSet<i32>>,
    cols: BTreeMap<i32, BTreeSet<i32>>,
    graph: DiGraphMap<Position, ()>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    pub fn new() -> Self {
        Sheet {
            cells: HashMap::new(),
            rows: BTreeMap::new(),
            cols: BTreeMap::new(),
            graph: DiGraphMap::new(),
        }
    }

    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        let existed_before = self.cells.contains_key(&pos);
        self.get_or_create(pos);
        log::trace!("set_cell({pos}, {text:?})");
        let result = self.transition(pos, text);
        // A placeholder this call materialized for the edited cell itself
        // (as opposed to one of its prospective references) should not
        // outlive the call if it's still Empty with no referrers — whether
        // because the edit was rejected, or because it was a no-op edit to
        // `""` on a position that had no prior cell (I4).
        if !existed_before
            && self.referrer_count(pos) == 0
            && matches!(self.cells[&pos].content, CellContent::Empty)
        {
            self.remove_cell_entirely(pos);
        }
        result
    }

    pub fn get_cell(&self, pos: Position) -> Result<Option<CellHandle<'_>>, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        Ok(self
            .cells
            .contains_key(&pos)
            .then_some(CellHandle { sheet: self, pos }))
    }

    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        if !self.cells.contains_key(&pos) {
            return Ok(());
        }
        log::trace!("clear_cell({pos})");
        self.transition(pos, "")?;
        if self.referrer_count(pos) == 0 {
            self.remove_cell_entirely(pos);
        }
        Ok(())
    }

    /// Validates and materializes an `Empty` placeholder at `pos` if absent,
    /// so formulas elsewhere can attach edges to it (§3.5, §4.1 step 3).
    fn get_or_create(&mut self, pos: Position) {
        if self.cells.contains_key(&pos) {
            return;
        }
        self.cells.insert(pos, Cell { content: CellContent::Empty });
        self.rows.entry(pos.row).or_default().insert(pos.col);
        self.cols.entry(pos.col).or_default().insert(pos.row);
        self.graph.add_node(pos);
    }

    /// Runs the content-transition edit protocol (§4.1) on an already-present
    /// cell. Callers (`set_cell`, `clear_cell`) are responsible for ensuring
    /// the cell exists first.
    fn transition(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        let current_text = self.cells[&pos].content.text();
        if text == current_text {
            return Ok(());
        }

        let prospective = CellContent::parse(text)?;

        if let CellContent::FormulaCell { formula, .. } = &prospective {
            for &referenced in formula.referenced_positions() {
                if referenced.is_valid() {
                    self.get_or_create(referenced);
                }
            }
            if self.reaches(formula.referenced_positions(), pos) {
                log::debug!("rejecting edit at {pos}: would introduce a cycle");
                return Err(SheetError::CircularDependency);
            }
        }

        self.invalidate_referrers(pos);

        let old_refs: Vec<Position> = self.cells[&pos].content.referenced_positions().to_vec();
        for referenced in old_refs {
            self.graph.remove_edge(pos, referenced);
        }

        let new_refs: Vec<Position> = match &prospective {
            CellContent::FormulaCell { formula, .. } => formula.referenced_positions().to_vec(),
            _ => Vec::new(),
        };
        self.cells.get_mut(&pos).unwrap().content = prospective;
        for referenced in new_refs {
            self.graph.add_edge(pos, referenced, ());
        }

        Ok(())
    }

    /// True iff `target` is reachable by following forward edges starting
    /// from any position in `starts` — i.e. adding edges `target -> starts`
    /// would close a cycle. A single visited set is shared across all
    /// `starts`, giving the O(V+E)-over-reachable-subgraph bound §4.3 asks
    /// for; the explicit `stack` plays the role of the spec's path stack.
    fn reaches(&self, starts: &[Position], target: Position) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<Position> = starts.to_vec();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if self.graph.contains_node(node) {
                for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    if !visited.contains(&next) {
                        stack.push(next);
                    }
                }
            }
        }
        false
    }

    /// Drops the cache of every cell transitively reaching `pos` via
    /// referrer (incoming) edges, unconditionally recursing per §4.4.
    fn invalidate_referrers(&self, pos: Position) {
        let mut visited = HashSet::new();
        visited.insert(pos);
        let mut stack: Vec<Position> = if self.graph.contains_node(pos) {
            self.graph.neighbors_directed(pos, Direction::Incoming).collect()
        } else {
            Vec::new()
        };
        let mut invalidated = 0u32;
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(cell) = self.cells.get(&node) {
                cell.content.invalidate_cache();
                invalidated += 1;
            }
            if self.graph.contains_node(node) {
                for referrer in self.graph.neighbors_directed(node, Direction::Incoming) {
                    if !visited.contains(&referrer) {
                        stack.push(referrer);
                    }
                }
            }
        }
        if invalidated > 0 {
            log::trace!("invalidated {invalidated} cached cell(s) downstream of {pos}");
        }
    }

    fn referrer_count(&self, pos: Position) -> usize {
        if self.graph.contains_node(pos) {
            self.graph.neighbors_directed(pos, Direction::Incoming).count()
        } else {
            0
        }
    }

    fn remove_cell_entirely(&mut self, pos: Position) {
        self.cells.remove(&pos);
        if let Some(cols) = self.rows.get_mut(&pos.row) {
            cols.remove(&pos.col);
            if cols.is_empty() {
                self.rows.remove(&pos.row);
            }
        }
        if let Some(rows) = self.cols.get_mut(&pos.col) {
            rows.remove(&pos.row);
            if rows.is_empty() {
                self.cols.remove(&pos.col);
            }
        }
        self.graph.remove_node(pos);
    }

    /// The value-lookup environment handed to formula evaluation (§4.5).
    /// Empty cells (materialized placeholder or altogether absent) evaluate
    /// to `0`; this is the blank-is-zero rule, distinct from the `#VALUE!`
    /// a direct `get_value()` reports for the same cell (§4.2, §9).
    pub fn lookup(&self, pos: Position) -> Result<Value, FormulaError> {
        if !pos.is_valid() {
            return Err(FormulaError::Ref);
        }
        match self.cells.get(&pos) {
            None => Ok(Value::Number(0.0)),
            Some(cell) => match &cell.content {
                CellContent::Empty => Ok(Value::Number(0.0)),
                _ => Ok(cell.content.value(&|p| self.lookup(p))),
            },
        }
    }

    /// Smallest rectangle anchored at `(0,0)` covering all populated
    /// positions (§4.5).
    pub fn printable_size(&self) -> (i32, i32) {
        let rows = self.rows.keys().next_back().map_or(0, |r| r + 1);
        let cols = self.cols.keys().next_back().map_or(0, |c| c + 1);
        (rows, cols)
    }

    pub fn print_values(&self, out: &mut dyn Write) -> io::Result<()> {
        self.print_with(out, |handle| handle.get_value().to_string())
    }

    pub fn print_texts(&self, out: &mut dyn Write) -> io::Result<()> {
        self.print_with(out, |handle| handle.get_text())
    }

    fn print_with(&self, out: &mut dyn Write, render: impl Fn(&CellHandle) -> String) -> io::Result<()> {
        let (rows, cols) = self.printable_size();
        for row in 0..rows {
            for col in 0..cols {
                if col > 0 {
                    write!(out, "\t")?;
                }
                let pos = Position::new(row, col);
                if self.cells.contains_key(&pos) {
                    let handle = CellHandle { sheet: self, pos };
                    write!(out, "{}", render(&handle))?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: i32, col: i32) -> Position {
        Position::new(row, col)
    }

    fn value_of(sheet: &Sheet, p: Position) -> Value {
        sheet.get_cell(p).unwrap().unwrap().get_value()
    }

    #[test]
    fn s1_basic_formula() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "2").unwrap();
        sheet.set_cell(pos(1, 0), "3").unwrap();
        sheet.set_cell(pos(2, 0), "=A1+A2").unwrap();
        assert_eq!(value_of(&sheet, pos(2, 0)), Value::Number(5.0));

        sheet.set_cell(pos(0, 0), "10").unwrap();
        assert_eq!(value_of(&sheet, pos(2, 0)), Value::Number(13.0));
    }

    #[test]
    fn s2_self_cycle_rejected() {
        let mut sheet = Sheet::new();
        let err = sheet.set_cell(pos(0, 0), "=A1").unwrap_err();
        assert_eq!(err, SheetError::CircularDependency);
        assert!(sheet.get_cell(pos(0, 0)).unwrap().is_none());
    }

    #[test]
    fn s3_indirect_cycle_rejected() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "=B1").unwrap(); // A1
        sheet.set_cell(pos(0, 1), "=C1").unwrap(); // B1
        assert_eq!(value_of(&sheet, pos(0, 0)), Value::Number(0.0));
        assert_eq!(value_of(&sheet, pos(0, 1)), Value::Number(0.0));

        let err = sheet.set_cell(pos(0, 2), "=A1").unwrap_err(); // C1
        assert_eq!(err, SheetError::CircularDependency);
    }

    #[test]
    fn s4_cache_invalidation_propagates() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "1").unwrap(); // A1
        sheet.set_cell(pos(1, 0), "=A1").unwrap(); // A2
        sheet.set_cell(pos(2, 0), "=A2*2").unwrap(); // A3
        assert_eq!(value_of(&sheet, pos(2, 0)), Value::Number(2.0));

        sheet.set_cell(pos(0, 0), "5").unwrap();
        assert_eq!(value_of(&sheet, pos(2, 0)), Value::Number(10.0));
    }

    #[test]
    fn s5_clear_with_referrers_keeps_placeholder() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "5").unwrap(); // A1
        sheet.set_cell(pos(1, 0), "=A1").unwrap(); // A2
        sheet.clear_cell(pos(0, 0)).unwrap();

        assert!(sheet.get_cell(pos(0, 0)).unwrap().is_some());
        assert_eq!(value_of(&sheet, pos(1, 0)), Value::Number(0.0));
    }

    #[test]
    fn s6_printable_size_shrinks_on_clear() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(1, 1), "x").unwrap(); // B2
        sheet.set_cell(pos(4, 3), "y").unwrap(); // D5
        assert_eq!(sheet.printable_size(), (5, 4));

        sheet.clear_cell(pos(4, 3)).unwrap();
        assert_eq!(sheet.printable_size(), (2, 2));
    }

    #[test]
    fn idempotent_set_is_a_no_op() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "1").unwrap();
        sheet.set_cell(pos(1, 0), "=A1").unwrap();
        sheet.get_cell(pos(1, 0)).unwrap().unwrap().get_value(); // populate cache

        let text = sheet.get_cell(pos(1, 0)).unwrap().unwrap().get_text();
        sheet.set_cell(pos(1, 0), &text).unwrap();
        // re-applying the same canonical text must not have dropped the cache
        assert_eq!(value_of(&sheet, pos(1, 0)), Value::Number(1.0));
    }

    #[test]
    fn invalid_position_is_rejected() {
        let mut sheet = Sheet::new();
        assert_eq!(
            sheet.set_cell(pos(-1, 0), "1").unwrap_err(),
            SheetError::InvalidPosition
        );
        assert_eq!(
            sheet.get_cell(pos(0, -1)).unwrap_err(),
            SheetError::InvalidPosition
        );
        assert_eq!(
            sheet.clear_cell(Position::new(100_000, 0)).unwrap_err(),
            SheetError::InvalidPosition
        );
    }

    #[test]
    fn out_of_bounds_reference_evaluates_to_ref_error() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "=ZZZZ99999999").unwrap();
        assert_eq!(
            value_of(&sheet, pos(0, 0)),
            Value::Error(FormulaError::Ref)
        );
    }

    #[test]
    fn clear_cell_without_referrers_removes_it() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "5").unwrap();
        sheet.clear_cell(pos(0, 0)).unwrap();
        assert!(sheet.get_cell(pos(0, 0)).unwrap().is_none());
    }

    #[test]
    fn setting_empty_text_on_a_never_seen_position_leaves_no_trace() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(5, 5), "").unwrap();
        assert!(sheet.get_cell(pos(5, 5)).unwrap().is_none());
        assert_eq!(sheet.printable_size(), (0, 0));
    }
}
