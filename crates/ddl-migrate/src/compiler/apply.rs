//! In-memory application of a plan.
//!
//! Mirrors what the rendered statements do to the live table, so the schema
//! cache can be updated after execution without re-introspecting.

use crate::core::schema::{ColumnSpec, TableSpec};

use super::DdlOp;

/// Apply `ops` to a copy of `table`.
///
/// Operations naming a column the table does not have are ignored.
/// Primary-key membership changes only through the key operations.
pub fn apply_plan(table: &TableSpec, ops: &[DdlOp]) -> TableSpec {
    let mut next = table.clone();
    for op in ops {
        apply_op(&mut next, op);
    }
    next
}

fn replace(table: &mut TableSpec, name: &str, column: &ColumnSpec) {
    if let Some(slot) = table.column_mut(name) {
        let primary_key = slot.primary_key;
        *slot = column.shape();
        slot.primary_key = primary_key;
    }
}

fn apply_op(table: &mut TableSpec, op: &DdlOp) {
    match op {
        DdlOp::AddColumn { column } => {
            let mut col = column.shape();
            col.primary_key = false;
            table.columns.push(col);
        }
        DdlOp::DropColumn { column } => {
            table.columns.retain(|c| c.name != column.name);
            table.primary_key_order.retain(|n| n != &column.name);
        }
        DdlOp::RenameColumn { from, column } => {
            replace(table, from, column);
            if let Some(pos) = table.primary_key_order.iter().position(|n| n == from) {
                table.primary_key_order[pos] = column.name.clone();
            }
        }
        DdlOp::AlterType { column }
        | DdlOp::AlterNullability { column, .. }
        | DdlOp::AlterIdentity { column }
        | DdlOp::SetDefault { column } => replace(table, &column.name, column),
        DdlOp::DropDefault { column, .. } => {
            if let Some(slot) = table.column_mut(column) {
                slot.default_expression = None;
                slot.default_constraint = None;
            }
        }
        DdlOp::AddUnique { column, constraint } => {
            if let Some(slot) = table.column_mut(column) {
                slot.unique = true;
                slot.unique_constraint = Some(constraint.clone());
            }
        }
        DdlOp::DropUnique { column, .. } => {
            if let Some(slot) = table.column_mut(column) {
                slot.unique = false;
                slot.unique_constraint = None;
            }
        }
        DdlOp::DropPrimaryKey { .. } => {
            table.set_primary_key(&[]);
            table.primary_key_constraint = None;
        }
        DdlOp::AddPrimaryKey {
            columns,
            constraint,
        }
        | DdlOp::ReplacePrimaryKey {
            columns,
            constraint,
            ..
        } => {
            table.set_primary_key(columns);
            table.primary_key_constraint = constraint.clone();
        }
    }
}
