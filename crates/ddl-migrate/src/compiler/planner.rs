//! Column-change to operation planning.
//!
//! The planner walks one table's changes in three phases (deletions,
//! alterations, additions) between a primary-key drop and a primary-key
//! add. Each alteration is planned against a running copy of the column so
//! every emitted operation carries the column as it stands after that step.

use std::collections::HashMap;

use crate::changes::{ColumnChange, PrimaryKeyChange};
use crate::core::schema::{ColumnSpec, TableRef, TableSpec};
use crate::error::{MigrateError, Result};

use super::{Compiler, DdlOp};

/// Placement of the primary-key statements within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyReplacement {
    /// Drop first, add last, as separate statements.
    Separate,
    /// One drop-and-add statement before the column alterations.
    First,
    /// One drop-and-add statement after the column alterations.
    Last,
}

fn phase(change: &ColumnChange) -> u8 {
    match change {
        ColumnChange::Deleted(_) => 0,
        ColumnChange::Renamed { .. } | ColumnChange::Modified { .. } => 1,
        ColumnChange::Added(_) => 2,
    }
}

impl<'d> Compiler<'d> {
    /// Plan the operations that turn `from` into `to`.
    ///
    /// `changes` may arrive in any order; they are planned by phase, keeping
    /// the caller's order within a phase. Every category is checked against
    /// the dialect before anything is planned.
    pub fn plan(
        &self,
        from: &TableSpec,
        to: &TableSpec,
        changes: &[ColumnChange],
        primary_key: Option<&PrimaryKeyChange>,
    ) -> Result<Vec<DdlOp>> {
        let table = target_ref(from, to);
        self.check_categories(&table, changes)?;

        let mut ordered: Vec<&ColumnChange> = changes.iter().collect();
        ordered.sort_by_key(|c| phase(c));

        let mut ops = Vec::new();
        let placement = match primary_key {
            Some(pk) => self.key_replacement(from, pk, changes),
            None => KeyReplacement::Separate,
        };
        let old_constraint = from
            .primary_key_constraint
            .clone()
            .or_else(|| self.dialect.primary_key_name(&table.name));
        let new_constraint = to
            .primary_key_constraint
            .clone()
            .or_else(|| self.dialect.primary_key_name(&table.name));
        let replace = |pk: &PrimaryKeyChange| DdlOp::ReplacePrimaryKey {
            old_columns: pk.old.clone(),
            old_constraint: old_constraint.clone(),
            columns: pk.new.clone(),
            constraint: new_constraint.clone(),
        };

        if let Some(pk) = primary_key {
            match placement {
                KeyReplacement::First => ops.push(replace(pk)),
                KeyReplacement::Separate if !pk.old.is_empty() => {
                    ops.push(DdlOp::DropPrimaryKey {
                        columns: pk.old.clone(),
                        constraint: old_constraint.clone(),
                    })
                }
                _ => {}
            }
        }

        for change in ordered {
            match change {
                ColumnChange::Added(col) => self.plan_add(&table, col, &mut ops),
                ColumnChange::Deleted(col) => self.plan_drop(&table, col, &mut ops),
                ColumnChange::Renamed { old, new } => {
                    self.plan_alter(&table, old, new, true, &mut ops)?
                }
                ColumnChange::Modified { old, new, renamed } => {
                    self.plan_alter(&table, old, new, *renamed, &mut ops)?
                }
            }
        }

        if let Some(pk) = primary_key {
            match placement {
                KeyReplacement::Last => ops.push(replace(pk)),
                KeyReplacement::Separate if !pk.new.is_empty() => {
                    ops.push(DdlOp::AddPrimaryKey {
                        columns: pk.new.clone(),
                        constraint: new_constraint.clone(),
                    })
                }
                _ => {}
            }
        }

        Ok(ops)
    }

    /// Primary-key transition the compiler must emit, if any.
    ///
    /// Renames alone never rebuild the key. A dialect whose key constraint
    /// blocks column alterations gets a drop/re-add of an unchanged key
    /// around a type or nullability change to one of its columns.
    pub fn primary_key_change(
        &self,
        old: &TableSpec,
        new: &TableSpec,
        changes: &[ColumnChange],
    ) -> Option<PrimaryKeyChange> {
        let old_pk = old.primary_key_columns();
        let new_pk = new.primary_key_columns();

        let renames: HashMap<&str, &str> = changes
            .iter()
            .filter_map(|c| Some((c.before()?.name.as_str(), c.after()?.name.as_str())))
            .collect();
        let carried: Vec<&str> = old_pk
            .iter()
            .map(|n| renames.get(n.as_str()).copied().unwrap_or(n.as_str()))
            .collect();

        if carried != new_pk.iter().map(String::as_str).collect::<Vec<_>>() {
            return Some(PrimaryKeyChange {
                old: old_pk,
                new: new_pk,
            });
        }
        if old_pk.is_empty() || !self.dialect.drops_constraints_before_column() {
            return None;
        }

        let blocked = changes.iter().any(|c| match c {
            ColumnChange::Modified { old: o, new: n, .. } => {
                old_pk.contains(&o.name) && (o.type_differs(n) || o.nullable != n.nullable)
            }
            _ => false,
        });
        blocked.then(|| PrimaryKeyChange {
            old: old_pk,
            new: new_pk,
        })
    }

    /// Where a single-statement key replacement goes.
    ///
    /// After the column alterations when every current key column survives
    /// them as NOT NULL. Otherwise before them, when every desired key
    /// column already exists under its final name.
    fn key_replacement(
        &self,
        from: &TableSpec,
        pk: &PrimaryKeyChange,
        changes: &[ColumnChange],
    ) -> KeyReplacement {
        if !self.dialect.replaces_primary_key_in_one_statement()
            || pk.old.is_empty()
            || pk.new.is_empty()
        {
            return KeyReplacement::Separate;
        }

        let old_key_survives = pk.old.iter().all(|name| {
            !changes.iter().any(|c| match c {
                ColumnChange::Deleted(col) => &col.name == name,
                ColumnChange::Modified { old, new, .. } => &old.name == name && new.nullable,
                _ => false,
            })
        });
        if old_key_survives {
            return KeyReplacement::Last;
        }

        let new_key_exists = pk.new.iter().all(|name| {
            from.column(name).is_some()
                && !changes.iter().any(|c| match (c.before(), c.after()) {
                    (Some(b), Some(a)) => b.name != a.name && (&b.name == name || &a.name == name),
                    (None, Some(a)) => &a.name == name,
                    _ => false,
                })
        });
        if new_key_exists {
            KeyReplacement::First
        } else {
            KeyReplacement::Separate
        }
    }

    fn check_categories(&self, table: &TableRef, changes: &[ColumnChange]) -> Result<()> {
        for col in changes.iter().filter_map(ColumnChange::after) {
            let category = col.category();
            if !self.dialect.supports_category(category) {
                return Err(MigrateError::UnmappedType {
                    dialect: self.dialect.name().to_string(),
                    table: table.name.clone(),
                    column: col.name.clone(),
                    category,
                });
            }
        }
        Ok(())
    }

    /// Name of the column's default constraint, if it has a default and the
    /// dialect names them.
    fn default_constraint(&self, table: &TableRef, col: &ColumnSpec) -> Option<String> {
        col.effective_default()?;
        col.default_constraint
            .clone()
            .or_else(|| self.dialect.default_constraint_name(&table.name, &col.name))
    }

    /// Name of the column's unique constraint: the introspected one when
    /// known, the dialect's deterministic name otherwise.
    fn unique_constraint(&self, table: &TableRef, col: &ColumnSpec) -> String {
        col.unique_constraint
            .clone()
            .unwrap_or_else(|| self.dialect.unique_constraint_name(&table.name, &col.name))
    }

    fn plan_add(&self, table: &TableRef, col: &ColumnSpec, ops: &mut Vec<DdlOp>) {
        ops.push(DdlOp::AddColumn {
            column: col.shape(),
        });
        if col.unique {
            ops.push(DdlOp::AddUnique {
                column: col.name.clone(),
                constraint: self.unique_constraint(table, col),
            });
        }
    }

    fn plan_drop(&self, table: &TableRef, col: &ColumnSpec, ops: &mut Vec<DdlOp>) {
        if self.dialect.drops_constraints_before_column() {
            if col.unique {
                ops.push(DdlOp::DropUnique {
                    column: col.name.clone(),
                    constraint: self.unique_constraint(table, col),
                });
            }
            if col.effective_default().is_some() {
                ops.push(DdlOp::DropDefault {
                    column: col.name.clone(),
                    constraint: self.default_constraint(table, col),
                });
            }
        }
        ops.push(DdlOp::DropColumn {
            column: col.shape(),
        });
    }

    fn plan_alter(
        &self,
        table: &TableRef,
        old: &ColumnSpec,
        new: &ColumnSpec,
        renamed: bool,
        ops: &mut Vec<DdlOp>,
    ) -> Result<()> {
        let dialect = self.dialect;

        if old.auto_increment != new.auto_increment && !dialect.supports_identity_change() {
            let action = if new.auto_increment { "add" } else { "remove" };
            return Err(MigrateError::Unsupported {
                dialect: dialect.name().to_string(),
                table: table.name.clone(),
                column: new.name.clone(),
                message: format!("{} identity on an existing column", action),
            });
        }

        let mut state = old.shape();
        state.default_constraint = self.default_constraint(table, &state);

        if renamed {
            let from = std::mem::replace(&mut state.name, new.name.clone());
            ops.push(DdlOp::RenameColumn {
                from,
                column: state.clone(),
            });
        }

        let type_changed = state.type_differs(new);
        let nullability_changed = state.nullable != new.nullable;
        let blocking = dialect.drops_constraints_before_column() && (type_changed || nullability_changed);

        // Unique constraint names derive from the column name.
        if state.unique && (!new.unique || renamed || blocking) {
            ops.push(DdlOp::DropUnique {
                column: state.name.clone(),
                constraint: self.unique_constraint(table, old),
            });
            state.unique = false;
            state.unique_constraint = None;
        }
        if blocking && state.effective_default().is_some() {
            drop_default(&mut state, ops);
        }

        if type_changed {
            state.native_type = new.native_type.clone();
            state.length = new.length;
            state.precision = new.precision;
            state.scale = new.scale;
            state.unsigned = new.unsigned;
            ops.push(DdlOp::AlterType {
                column: state.clone(),
            });
        }

        if state.auto_increment && !new.auto_increment {
            state.auto_increment = false;
            ops.push(DdlOp::AlterIdentity {
                column: state.clone(),
            });
        }

        if nullability_changed {
            let mut with_default = false;
            // Existing NULLs need the new default in the same statement.
            if !new.nullable && new.effective_default().is_some() && state.default_differs(new) {
                if state.effective_default().is_some() && dialect.default_requires_drop_before_replace() {
                    drop_default(&mut state, ops);
                }
                state.default_expression = new.effective_default().map(str::to_string);
                state.default_constraint = self.default_constraint(table, new);
                with_default = true;
            }
            state.nullable = new.nullable;
            ops.push(DdlOp::AlterNullability {
                column: state.clone(),
                with_default,
            });
        }

        let target_constraint = self.default_constraint(table, new);
        let constraint_moves =
            state.effective_default().is_some() && state.default_constraint != target_constraint;
        if state.default_differs(new) || constraint_moves {
            if state.effective_default().is_some()
                && (dialect.default_requires_drop_before_replace()
                    || new.effective_default().is_none()
                    || constraint_moves)
            {
                drop_default(&mut state, ops);
            }
            if new.effective_default().is_some() {
                state.default_expression = new.effective_default().map(str::to_string);
                state.default_constraint = target_constraint;
                ops.push(DdlOp::SetDefault {
                    column: state.clone(),
                });
            }
        }

        if !state.auto_increment && new.auto_increment {
            state.auto_increment = true;
            ops.push(DdlOp::AlterIdentity {
                column: state.clone(),
            });
        }

        if new.unique && !state.unique {
            ops.push(DdlOp::AddUnique {
                column: state.name.clone(),
                constraint: self.unique_constraint(table, new),
            });
        }

        Ok(())
    }
}

fn drop_default(state: &mut ColumnSpec, ops: &mut Vec<DdlOp>) {
    ops.push(DdlOp::DropDefault {
        column: state.name.clone(),
        constraint: state.default_constraint.take(),
    });
    state.default_expression = None;
}

/// Table the statements address: the desired name, falling back to the
/// current schema when the desired shape names none.
pub(crate) fn target_ref(from: &TableSpec, to: &TableSpec) -> TableRef {
    TableRef::new(to.schema.clone().or_else(|| from.schema.clone()), to.name.clone())
}
