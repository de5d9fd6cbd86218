//! Column-change model.
//!
//! [`diff`] pairs the columns of a current and a desired [`TableSpec`] and
//! classifies each pair as a [`ColumnChange`]. The primary key is compared
//! separately by [`diff_primary_key`] because key changes are emitted as
//! their own constraint statements, independent of column alterations.
//!
//! Columns are matched in this order:
//!
//! 1. stable `id`, when both sides carry one
//! 2. `rename_from` on the desired column
//! 3. name equality

mod flags;

pub use flags::ChangeFlags;

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnSpec, TableSpec};
use crate::error::{MigrateError, Result};

/// One column's transition between two table shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnChange {
    Added(ColumnSpec),
    Deleted(ColumnSpec),
    /// Name changed, nothing else.
    Renamed { old: ColumnSpec, new: ColumnSpec },
    /// At least one attribute changed; possibly renamed as well.
    Modified {
        old: ColumnSpec,
        new: ColumnSpec,
        renamed: bool,
    },
}

impl ColumnChange {
    /// Wire flags for this change.
    pub fn flags(&self) -> ChangeFlags {
        match self {
            ColumnChange::Added(_) => ChangeFlags::ADDED,
            ColumnChange::Deleted(_) => ChangeFlags::DELETED,
            ColumnChange::Renamed { .. } => ChangeFlags::RENAMED,
            ColumnChange::Modified { renamed: true, .. } => {
                ChangeFlags::MODIFIED | ChangeFlags::RENAMED
            }
            ColumnChange::Modified { renamed: false, .. } => ChangeFlags::MODIFIED,
        }
    }

    /// The column as it exists before the change, if it existed.
    pub fn before(&self) -> Option<&ColumnSpec> {
        match self {
            ColumnChange::Added(_) => None,
            ColumnChange::Deleted(col) => Some(col),
            ColumnChange::Renamed { old, .. } | ColumnChange::Modified { old, .. } => Some(old),
        }
    }

    /// The column as it exists after the change, if it survives.
    pub fn after(&self) -> Option<&ColumnSpec> {
        match self {
            ColumnChange::Added(col) => Some(col),
            ColumnChange::Deleted(_) => None,
            ColumnChange::Renamed { new, .. } | ColumnChange::Modified { new, .. } => Some(new),
        }
    }

    /// Name used in error messages and logs: the new name when there is one.
    pub fn column_name(&self) -> &str {
        self.after()
            .or_else(|| self.before())
            .map(|c| c.name.as_str())
            .unwrap_or_default()
    }

    /// The same transition run backwards.
    pub fn reversed(&self) -> ColumnChange {
        match self {
            ColumnChange::Added(col) => ColumnChange::Deleted(col.clone()),
            ColumnChange::Deleted(col) => ColumnChange::Added(col.clone()),
            ColumnChange::Renamed { old, new } => ColumnChange::Renamed {
                old: new.clone(),
                new: old.clone(),
            },
            ColumnChange::Modified { old, new, renamed } => ColumnChange::Modified {
                old: new.clone(),
                new: old.clone(),
                renamed: *renamed,
            },
        }
    }
}

/// Ordered primary-key transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyChange {
    pub old: Vec<String>,
    pub new: Vec<String>,
}

impl PrimaryKeyChange {
    pub fn reversed(&self) -> PrimaryKeyChange {
        PrimaryKeyChange {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Compare ordered primary keys. `None` when identical, including both empty.
pub fn diff_primary_key(old: Option<&TableSpec>, new: &TableSpec) -> Option<PrimaryKeyChange> {
    let old_pk = old.map(|t| t.primary_key_columns()).unwrap_or_default();
    let new_pk = new.primary_key_columns();
    if old_pk == new_pk {
        None
    } else {
        Some(PrimaryKeyChange {
            old: old_pk,
            new: new_pk,
        })
    }
}

fn find_match(old_cols: &[&ColumnSpec], used: &[bool], new_col: &ColumnSpec) -> Option<usize> {
    let available = |i: &usize| !used[*i];

    if let Some(id) = &new_col.id {
        if let Some(i) = (0..old_cols.len())
            .filter(available)
            .find(|&i| old_cols[i].id.as_ref() == Some(id))
        {
            return Some(i);
        }
    }

    if let Some(previous) = &new_col.rename_from {
        if let Some(i) = (0..old_cols.len())
            .filter(available)
            .find(|&i| &old_cols[i].name == previous)
        {
            return Some(i);
        }
    }

    (0..old_cols.len())
        .filter(available)
        .find(|&i| old_cols[i].name == new_col.name)
}

/// Desired column with constraint names learned from the current column.
fn carry_constraint_names(old: &ColumnSpec, new: &ColumnSpec) -> ColumnSpec {
    let mut next = new.shape();
    if next.default_constraint.is_none() && old.name == new.name && !old.default_differs(new) {
        next.default_constraint = old.default_constraint.clone();
    }
    if next.unique_constraint.is_none() && old.name == new.name && old.unique && new.unique {
        next.unique_constraint = old.unique_constraint.clone();
    }
    next
}

/// Pair the columns of `old` and `new` and classify each transition.
///
/// Deletions come first, then renames and modifications in desired-column
/// order, then additions. A desired column flagged `Deleted` deletes the
/// current column it matches. Unchanged columns produce nothing.
pub fn diff(old: Option<&TableSpec>, new: &TableSpec) -> Result<Vec<ColumnChange>> {
    let old_cols: Vec<&ColumnSpec> = old
        .map(|t| t.live_columns().collect())
        .unwrap_or_default();
    let mut used = vec![false; old_cols.len()];

    let mut deleted = Vec::new();
    let mut altered = Vec::new();
    let mut added = Vec::new();

    for new_col in &new.columns {
        new_col.change_flags.validate().map_err(|msg| {
            MigrateError::invalid_spec(&new.name, format!("column '{}': {}", new_col.name, msg))
        })?;

        let matched = find_match(&old_cols, &used, new_col);

        if new_col.is_marked_deleted() {
            if let Some(i) = matched {
                used[i] = true;
                deleted.push(ColumnChange::Deleted(old_cols[i].shape()));
            }
            continue;
        }

        let Some(i) = matched else {
            added.push(ColumnChange::Added(new_col.shape()));
            continue;
        };
        used[i] = true;

        let old_col = old_cols[i];
        let renamed = old_col.name != new_col.name;
        let modified = old_col.shape_differs(new_col);
        let next = carry_constraint_names(old_col, new_col);

        match (renamed, modified) {
            (false, false) => {}
            (true, false) => altered.push(ColumnChange::Renamed {
                old: old_col.shape(),
                new: next,
            }),
            (_, true) => altered.push(ColumnChange::Modified {
                old: old_col.shape(),
                new: next,
                renamed,
            }),
        }
    }

    for (i, col) in old_cols.iter().enumerate() {
        if !used[i] {
            deleted.push(ColumnChange::Deleted(col.shape()));
        }
    }

    check_rename_targets(old_cols.as_slice(), &deleted, &altered, &new.name)?;

    let mut changes = deleted;
    changes.extend(altered);
    changes.extend(added);
    Ok(changes)
}

/// A rename may not land on a name that another surviving column still
/// holds at that point; swapping two names needs an intermediate step.
fn check_rename_targets(
    old_cols: &[&ColumnSpec],
    deleted: &[ColumnChange],
    altered: &[ColumnChange],
    table: &str,
) -> Result<()> {
    let freed: Vec<&str> = deleted.iter().filter_map(|c| c.before()).map(|c| c.name.as_str()).collect();

    for change in altered {
        let (Some(old), Some(new)) = (change.before(), change.after()) else {
            continue;
        };
        if old.name == new.name {
            continue;
        }
        let clash = old_cols.iter().any(|c| {
            c.name.eq_ignore_ascii_case(&new.name)
                && c.name != old.name
                && !freed.contains(&c.name.as_str())
        });
        if clash {
            return Err(MigrateError::invalid_spec(
                table,
                format!(
                    "cannot rename '{}' to '{}': the name is still in use",
                    old.name, new.name
                ),
            ));
        }
    }
    Ok(())
}
