//! Reversible DDL compiler.
//!
//! Given a table's current shape and a desired shape, the compiler produces
//! the statements that move the table forward (up) and the statements that
//! restore it (down). Compilation is pure: no I/O, no logging.
//!
//! # Pipeline
//!
//! ```text
//! (old, new) ─► diff ─► plan (Vec<DdlOp>) ─► Dialect::render ─► Vec<Statement>
//! ```
//!
//! The down plan is never derived from the up SQL. It is planned from the
//! reversed changes, starting from the table as the up plan leaves it, so
//! both directions go through the same rules.

mod apply;
mod ops;
mod planner;

pub use apply::apply_plan;
pub use ops::DdlOp;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::changes::{diff, ColumnChange, PrimaryKeyChange};
use crate::core::schema::{TableRef, TableSpec};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// One executable DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Up and down statement sequences for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub up_statements: Vec<Statement>,
    pub down_statements: Vec<Statement>,

    /// Operations behind `up_statements`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub up_plan: Vec<DdlOp>,

    /// Operations behind `down_statements`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub down_plan: Vec<DdlOp>,
}

impl MigrationResult {
    /// Nothing to do in either direction.
    pub fn is_empty(&self) -> bool {
        self.up_statements.is_empty() && self.down_statements.is_empty()
    }

    pub fn up_sql(&self) -> Vec<&str> {
        self.up_statements.iter().map(|s| s.sql.as_str()).collect()
    }

    pub fn down_sql(&self) -> Vec<&str> {
        self.down_statements.iter().map(|s| s.sql.as_str()).collect()
    }
}

/// Dialect-agnostic compiler. Every syntax decision is delegated to the
/// injected [`Dialect`].
#[derive(Clone, Copy)]
pub struct Compiler<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> Compiler<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Diff `old` against `new` and compile both directions.
    pub fn compile(&self, old: &TableSpec, new: &TableSpec) -> Result<MigrationResult> {
        if !old.name.eq_ignore_ascii_case(&new.name) {
            return Err(MigrateError::invalid_spec(
                &new.name,
                format!("cannot rename table '{}'; only column changes are compiled", old.name),
            ));
        }
        let mut target = new.clone();
        if target.schema.is_none() {
            target.schema = old.schema.clone();
        }

        let changes = diff(Some(old), &target)?;
        let primary_key = self.primary_key_change(old, &target, &changes);
        self.compile_changes(old, &target, &changes, primary_key.as_ref())
    }

    /// Compile an already-classified change list.
    ///
    /// The down plan starts from `old` with the up plan applied, and runs
    /// the reversed changes back to `old`.
    pub fn compile_changes(
        &self,
        old: &TableSpec,
        new: &TableSpec,
        changes: &[ColumnChange],
        primary_key: Option<&PrimaryKeyChange>,
    ) -> Result<MigrationResult> {
        new.validate()?;
        self.dialect.validate_table(new)?;

        let up_plan = self.plan(old, new, changes, primary_key)?;
        let intermediate = apply_plan(old, &up_plan);

        let reversed: Vec<ColumnChange> = changes.iter().map(ColumnChange::reversed).collect();
        let down_key = primary_key.map(PrimaryKeyChange::reversed);
        let down_plan = self.plan(&intermediate, old, &reversed, down_key.as_ref())?;

        let table = planner::target_ref(old, new);
        Ok(MigrationResult {
            up_statements: self.render(&table, &up_plan)?,
            down_statements: self.render(&table, &down_plan)?,
            up_plan,
            down_plan,
        })
    }

    /// Render a plan, one statement per operation.
    pub fn render(&self, table: &TableRef, ops: &[DdlOp]) -> Result<Vec<Statement>> {
        ops.iter()
            .map(|op| self.dialect.render(table, op).map(Statement::new))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeFlags;
    use crate::core::schema::ColumnSpec;
    use crate::dialect::CanonicalCategory;
    use crate::drivers::DialectImpl;

    const DIALECTS: [&str; 3] = ["mysql", "mssql", "postgres"];

    fn dialect(name: &str) -> DialectImpl {
        DialectImpl::from_db_type(name).unwrap()
    }

    fn compile(name: &str, old: &TableSpec, new: &TableSpec) -> MigrationResult {
        let d = dialect(name);
        Compiler::new(&d).compile(old, new).unwrap()
    }

    fn table(columns: Vec<ColumnSpec>) -> TableSpec {
        TableSpec::new(None, "t").with_columns(columns)
    }

    fn base() -> TableSpec {
        table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("name", "varchar").with_length(50),
            ColumnSpec::new("age", "int"),
            ColumnSpec::new("created", "datetime")
                .not_null()
                .with_default("getdate()"),
            ColumnSpec::new("code", "varchar").with_length(10).unique(),
        ])
    }

    fn assert_round_trip(name: &str, old: &TableSpec, new: &TableSpec) {
        let result = compile(name, old, new);
        let forward = apply_plan(old, &result.up_plan);
        assert!(
            forward.same_shape(new),
            "{}: up plan did not reach the desired shape\n{:#?}",
            name,
            result.up_plan
        );
        let back = apply_plan(&forward, &result.down_plan);
        assert!(
            back.same_shape(old),
            "{}: down plan did not restore the original\n{:#?}",
            name,
            result.down_plan
        );
    }

    // =========================================================================
    // Nullability with default
    // =========================================================================

    fn age_not_null() -> (TableSpec, TableSpec) {
        let old = table(vec![ColumnSpec::new("age", "int")]);
        let new = table(vec![ColumnSpec::new("age", "int")
            .not_null()
            .with_default("0")
            .with_flags(ChangeFlags::MODIFIED)]);
        (old, new)
    }

    #[test]
    fn test_not_null_with_default_mysql() {
        let (old, new) = age_not_null();
        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE `t` MODIFY COLUMN `age` int NOT NULL DEFAULT 0"]
        );
        assert_eq!(
            result.down_sql(),
            vec![
                "ALTER TABLE `t` MODIFY COLUMN `age` int NULL DEFAULT 0",
                "ALTER TABLE `t` ALTER COLUMN `age` DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_not_null_with_default_mssql() {
        let (old, new) = age_not_null();
        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [DF_t_age] DEFAULT 0 FOR [age]; \
                 ALTER TABLE [dbo].[t] ALTER COLUMN [age] int NOT NULL"
            ]
        );
        assert_eq!(
            result.down_sql(),
            vec![
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [DF_t_age]",
                "ALTER TABLE [dbo].[t] ALTER COLUMN [age] int NULL",
            ]
        );
    }

    #[test]
    fn test_not_null_with_default_postgres() {
        let (old, new) = age_not_null();
        let result = compile("postgres", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE \"public\".\"t\" ALTER COLUMN \"age\" SET DEFAULT 0, \
                 ALTER COLUMN \"age\" SET NOT NULL"
            ]
        );
        assert_eq!(
            result.down_sql(),
            vec![
                "ALTER TABLE \"public\".\"t\" ALTER COLUMN \"age\" DROP NOT NULL",
                "ALTER TABLE \"public\".\"t\" ALTER COLUMN \"age\" DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_not_null_without_default_has_no_default_clause() {
        let old = table(vec![ColumnSpec::new("age", "int")]);
        let new = table(vec![ColumnSpec::new("age", "int").not_null()]);
        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE [dbo].[t] ALTER COLUMN [age] int NOT NULL"]
        );
    }

    // =========================================================================
    // Renames
    // =========================================================================

    fn rename_name() -> (TableSpec, TableSpec) {
        let old = table(vec![ColumnSpec::new("name", "varchar").with_length(50)]);
        let new = table(vec![ColumnSpec::new("full_name", "varchar")
            .with_length(50)
            .renamed_from("name")
            .with_flags(ChangeFlags::RENAMED)]);
        (old, new)
    }

    #[test]
    fn test_rename_only_is_one_statement_each_way() {
        let (old, new) = rename_name();
        for name in DIALECTS {
            let result = compile(name, &old, &new);
            assert_eq!(result.up_statements.len(), 1, "{}", name);
            assert_eq!(result.down_statements.len(), 1, "{}", name);
        }
    }

    #[test]
    fn test_rename_statements() {
        let (old, new) = rename_name();

        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["EXEC sp_rename '[dbo].[t].[name]', 'full_name', 'COLUMN'"]
        );
        assert_eq!(
            result.down_sql(),
            vec!["EXEC sp_rename '[dbo].[t].[full_name]', 'name', 'COLUMN'"]
        );

        let result = compile("postgres", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE \"public\".\"t\" RENAME COLUMN \"name\" TO \"full_name\""]
        );
        assert!(!result.up_sql()[0].contains("NULL"));
        assert!(!result.up_sql()[0].contains("TYPE"));

        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE `t` CHANGE COLUMN `name` `full_name` varchar(50) NULL"]
        );
        assert_eq!(
            result.down_sql(),
            vec!["ALTER TABLE `t` CHANGE COLUMN `full_name` `name` varchar(50) NULL"]
        );
    }

    #[test]
    fn test_rename_precedes_other_alterations() {
        let old = base();
        let mut new = base();
        new.columns[1] = ColumnSpec::new("full_name", "varchar")
            .with_length(100)
            .not_null()
            .with_default("anon")
            .renamed_from("name");

        for name in DIALECTS {
            let result = compile(name, &old, &new);
            for plan in [&result.up_plan, &result.down_plan] {
                assert!(
                    matches!(plan.first(), Some(DdlOp::RenameColumn { .. })),
                    "{}: {:#?}",
                    name,
                    plan
                );
                assert!(plan.len() > 1);
            }
        }
    }

    #[test]
    fn test_rename_recreates_named_default_on_mssql() {
        let old = table(vec![ColumnSpec::new("name", "varchar")
            .with_length(50)
            .with_default("x")]);
        let new = table(vec![ColumnSpec::new("full_name", "varchar")
            .with_length(50)
            .with_default("x")
            .renamed_from("name")]);

        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "EXEC sp_rename '[dbo].[t].[name]', 'full_name', 'COLUMN'",
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [DF_t_name]",
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [DF_t_full_name] DEFAULT 'x' FOR [full_name]",
            ]
        );

        // MySQL keeps the default through CHANGE COLUMN.
        let result = compile("mysql", &old, &new);
        assert_eq!(result.up_statements.len(), 1);
    }

    #[test]
    fn test_rename_recreates_unique_under_new_name() {
        let old = table(vec![ColumnSpec::new("code", "varchar").with_length(10).unique()]);
        let new = table(vec![ColumnSpec::new("sku", "varchar")
            .with_length(10)
            .unique()
            .renamed_from("code")]);

        let result = compile("postgres", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"code\" TO \"sku\"",
                "ALTER TABLE \"public\".\"t\" DROP CONSTRAINT \"UQ_t_code\"",
                "ALTER TABLE \"public\".\"t\" ADD CONSTRAINT \"UQ_t_sku\" UNIQUE (\"sku\")",
            ]
        );
    }

    // =========================================================================
    // Primary key
    // =========================================================================

    fn keyed(order: &[&str]) -> TableSpec {
        let mut t = table(vec![
            ColumnSpec::new("a", "int").primary(),
            ColumnSpec::new("b", "int").primary(),
        ]);
        t.primary_key_order = order.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn test_primary_key_reorder_is_structural() {
        for name in DIALECTS {
            let result = compile(name, &keyed(&["a", "b"]), &keyed(&["b", "a"]));
            assert!(!result.up_statements.is_empty(), "{}", name);
            assert!(!result.down_statements.is_empty(), "{}", name);
            assert!(matches!(
                result.up_plan.last(),
                Some(DdlOp::AddPrimaryKey { columns, .. })
                    | Some(DdlOp::ReplacePrimaryKey { columns, .. }) if columns == &["b", "a"]
            ));
        }
    }

    #[test]
    fn test_identical_primary_key_is_empty() {
        for name in DIALECTS {
            let result = compile(name, &keyed(&["a", "b"]), &keyed(&["a", "b"]));
            assert!(result.is_empty(), "{}", name);
        }
    }

    #[test]
    fn test_primary_key_statements_mssql() {
        let result = compile("mssql", &keyed(&["a", "b"]), &keyed(&["b", "a"]));
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [PK_t]",
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [PK_t] PRIMARY KEY ([b], [a])",
            ]
        );
    }

    #[test]
    fn test_introspected_primary_key_name_is_dropped() {
        let mut old = keyed(&["a", "b"]);
        old.primary_key_constraint = Some("PK__t__3BD0198E".into());
        let result = compile("mssql", &old, &keyed(&["b", "a"]));
        assert_eq!(
            result.up_sql()[0],
            "ALTER TABLE [dbo].[t] DROP CONSTRAINT [PK__t__3BD0198E]"
        );
        // The down sequence restores the original constraint name.
        assert_eq!(
            result.down_sql()[1],
            "ALTER TABLE [dbo].[t] ADD CONSTRAINT [PK__t__3BD0198E] PRIMARY KEY ([a], [b])"
        );
    }

    #[test]
    fn test_renaming_key_column_keeps_key() {
        let old = keyed(&["a", "b"]);
        let mut new = keyed(&["a", "b"]);
        new.columns[1] = ColumnSpec::new("bee", "int").primary().renamed_from("b");
        new.primary_key_order = vec!["a".into(), "bee".into()];

        for name in DIALECTS {
            let result = compile(name, &old, &new);
            assert_eq!(result.up_statements.len(), 1, "{}", name);
            assert_round_trip(name, &old, &new);
        }
    }

    #[test]
    fn test_mysql_replaces_key_of_auto_increment_table_in_one_statement() {
        let old = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("tenant", "int").not_null(),
        ]);
        let new = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("tenant", "int").primary(),
        ]);

        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`, `tenant`)"]
        );
        assert_eq!(
            result.down_sql(),
            vec!["ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`)"]
        );
        assert_round_trip("mysql", &old, &new);

        // Dialects with named key constraints keep separate statements.
        let result = compile("postgres", &old, &new);
        assert_eq!(result.up_statements.len(), 2);
    }

    #[test]
    fn test_mysql_key_replacement_runs_first_when_key_column_becomes_nullable() {
        let old = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("code", "varchar").with_length(10).primary(),
        ]);
        let new = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("code", "varchar").with_length(10),
        ]);

        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`)",
                "ALTER TABLE `t` MODIFY COLUMN `code` varchar(10) NULL",
            ]
        );
        assert_eq!(
            result.down_sql(),
            vec![
                "ALTER TABLE `t` MODIFY COLUMN `code` varchar(10) NOT NULL",
                "ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`, `code`)",
            ]
        );
        assert_round_trip("mysql", &old, &new);
    }

    #[test]
    fn test_mysql_key_replacement_runs_first_when_key_column_is_dropped() {
        let old = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("tenant", "int").primary(),
        ]);
        let new = table(vec![ColumnSpec::new("id", "int").primary().identity()]);

        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE `t` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`)",
                "ALTER TABLE `t` DROP COLUMN `tenant`",
            ]
        );
        assert_round_trip("mysql", &old, &new);
    }

    #[test]
    fn test_mssql_recreates_introspected_unique_name_around_type_change() {
        let mut old = table(vec![ColumnSpec::new("code", "varchar").with_length(10).unique()]);
        old.columns[0].unique_constraint = Some("UQ__t__357D4CF9".into());
        let new = table(vec![ColumnSpec::new("code", "varchar").with_length(20).unique()]);

        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [UQ__t__357D4CF9]",
                "ALTER TABLE [dbo].[t] ALTER COLUMN [code] varchar(20) NULL",
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [UQ__t__357D4CF9] UNIQUE ([code])",
            ]
        );
        assert_eq!(
            result.down_sql()[2],
            "ALTER TABLE [dbo].[t] ADD CONSTRAINT [UQ__t__357D4CF9] UNIQUE ([code])"
        );
    }

    #[test]
    fn test_mssql_rebuilds_key_around_key_column_type_change() {
        let old = keyed(&["a", "b"]);
        let mut new = keyed(&["a", "b"]);
        new.columns[1] = ColumnSpec::new("b", "bigint").primary();

        let result = compile("mssql", &old, &new);
        assert!(matches!(result.up_plan.first(), Some(DdlOp::DropPrimaryKey { .. })));
        assert!(matches!(result.up_plan.last(), Some(DdlOp::AddPrimaryKey { .. })));

        let result = compile("postgres", &old, &new);
        assert_eq!(result.up_statements.len(), 1);
    }

    // =========================================================================
    // Deletions and additions
    // =========================================================================

    #[test]
    fn test_mssql_drops_constraints_before_column() {
        let mut new = base();
        new.columns.retain(|c| c.name != "created" && c.name != "code");

        let result = compile("mssql", &base(), &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [DF_t_created]",
                "ALTER TABLE [dbo].[t] DROP COLUMN [created]",
                "ALTER TABLE [dbo].[t] DROP CONSTRAINT [UQ_t_code]",
                "ALTER TABLE [dbo].[t] DROP COLUMN [code]",
            ]
        );
        assert_eq!(
            result.down_sql(),
            vec![
                "ALTER TABLE [dbo].[t] ADD [created] datetime NOT NULL CONSTRAINT [DF_t_created] DEFAULT getdate()",
                "ALTER TABLE [dbo].[t] ADD [code] varchar(10) NULL",
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [UQ_t_code] UNIQUE ([code])",
            ]
        );
    }

    #[test]
    fn test_mysql_drops_column_directly() {
        let mut new = base();
        new.columns.retain(|c| c.name != "created");
        let result = compile("mysql", &base(), &new);
        assert_eq!(result.up_sql(), vec!["ALTER TABLE `t` DROP COLUMN `created`"]);
    }

    #[test]
    fn test_introspected_default_constraint_is_dropped_by_name() {
        let mut old = base();
        old.columns[3].default_constraint = Some("DF__t__created__5EBF139D".into());
        let mut new = base();
        new.columns.remove(3);

        let result = compile("mssql", &old, &new);
        assert_eq!(
            result.up_sql()[0],
            "ALTER TABLE [dbo].[t] DROP CONSTRAINT [DF__t__created__5EBF139D]"
        );
        assert!(result.down_sql()[0].contains("CONSTRAINT [DF__t__created__5EBF139D]"));
    }

    #[test]
    fn test_deleted_flag_in_desired_columns() {
        let mut new = base();
        new.columns[2] = new.columns[2].clone().with_flags(ChangeFlags::DELETED);
        let result = compile("postgres", &base(), &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE \"public\".\"t\" DROP COLUMN \"age\""]
        );
        assert_eq!(
            result.down_sql(),
            vec!["ALTER TABLE \"public\".\"t\" ADD COLUMN \"age\" int NULL"]
        );
    }

    #[test]
    fn test_added_column_with_default_and_unique() {
        let mut new = base();
        new.columns
            .push(ColumnSpec::new("score", "int").not_null().with_default("0").unique());

        let result = compile("mssql", &base(), &new);
        assert_eq!(
            result.up_sql(),
            vec![
                "ALTER TABLE [dbo].[t] ADD [score] int NOT NULL CONSTRAINT [DF_t_score] DEFAULT 0",
                "ALTER TABLE [dbo].[t] ADD CONSTRAINT [UQ_t_score] UNIQUE ([score])",
            ]
        );

        let result = compile("mysql", &base(), &new);
        assert_eq!(
            result.up_sql()[0],
            "ALTER TABLE `t` ADD COLUMN `score` int NOT NULL DEFAULT 0"
        );
    }

    // =========================================================================
    // Defaults and type suffixes
    // =========================================================================

    #[test]
    fn test_default_literal_quoting() {
        for name in DIALECTS {
            let d = dialect(name);
            let text = ColumnSpec::new("greeting", "text").with_default("hello");
            assert_eq!(d.format_default(&text).unwrap().as_deref(), Some("'hello'"), "{}", name);

            let int = ColumnSpec::new("n", "int").with_default("0");
            assert_eq!(d.format_default(&int).unwrap().as_deref(), Some("0"), "{}", name);

            let blank = ColumnSpec::new("n", "int").with_default("");
            assert_eq!(d.format_default(&blank).unwrap().as_deref(), Some("NULL"), "{}", name);
        }
    }

    #[test]
    fn test_date_defaults() {
        let d = dialect("mssql");
        let expr = ColumnSpec::new("at", "datetime2").with_default("(getdate())");
        assert_eq!(d.format_default(&expr).unwrap().as_deref(), Some("(getdate())"));
        let value = ColumnSpec::new("at", "date").with_default("2024-01-01");
        assert_eq!(d.format_default(&value).unwrap().as_deref(), Some("'2024-01-01'"));
    }

    #[test]
    fn test_fallback_quoting_differs_by_dialect() {
        let col = ColumnSpec::new("doc", "json").with_default("{}");
        assert_eq!(
            dialect("mysql").format_default(&col).unwrap().as_deref(),
            Some("\"{}\"")
        );
        assert_eq!(
            dialect("postgres").format_default(&col).unwrap().as_deref(),
            Some("'{}'")
        );
    }

    #[test]
    fn test_length_eligibility() {
        for name in DIALECTS {
            let d = dialect(name);
            let big = ColumnSpec::new("n", "bigint").with_precision(19, None);
            assert_eq!(d.column_type(&big).unwrap(), "bigint", "{}", name);

            let varchar = ColumnSpec::new("s", "varchar").with_precision(50, None);
            assert_eq!(d.column_type(&varchar).unwrap(), "varchar(50)", "{}", name);
        }
    }

    #[test]
    fn test_default_injection_rejected() {
        let mut new = base();
        new.columns[2] = ColumnSpec::new("age", "int").with_default("0; DROP TABLE t");
        let d = dialect("mysql");
        let err = Compiler::new(&d).compile(&base(), &new).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidIdentifier(_)));
    }

    // =========================================================================
    // Validation and errors
    // =========================================================================

    #[test]
    fn test_unmapped_category_fails_before_synthesis() {
        let mut new = base();
        new.columns
            .push(ColumnSpec::new("mood", "enum('happy','sad')"));
        let d = dialect("mssql");
        let err = Compiler::new(&d).compile(&base(), &new).unwrap_err();
        match err {
            MigrateError::UnmappedType {
                dialect,
                table,
                column,
                category,
            } => {
                assert_eq!(dialect, "mssql");
                assert_eq!(table, "t");
                assert_eq!(column, "mood");
                assert_eq!(category, CanonicalCategory::Enum);
            }
            other => panic!("unexpected error: {other}"),
        }

        // MySQL maps every category.
        assert!(Compiler::new(&dialect("mysql")).compile(&base(), &new).is_ok());
    }

    #[test]
    fn test_identity_toggle_unsupported_on_mssql() {
        let old = table(vec![ColumnSpec::new("id", "int").primary()]);
        let new = table(vec![ColumnSpec::new("id", "int").primary().identity()]);
        let d = dialect("mssql");
        let err = Compiler::new(&d).compile(&old, &new).unwrap_err();
        assert!(matches!(err, MigrateError::Unsupported { .. }));
        assert!(err.to_string().contains("t.id"));
    }

    #[test]
    fn test_identity_toggle_mysql_and_postgres() {
        let old = table(vec![ColumnSpec::new("id", "int").primary()]);
        let new = table(vec![ColumnSpec::new("id", "int").primary().identity()]);

        let result = compile("postgres", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE \"public\".\"t\" ALTER COLUMN \"id\" ADD GENERATED BY DEFAULT AS IDENTITY"]
        );
        assert_eq!(
            result.down_sql(),
            vec!["ALTER TABLE \"public\".\"t\" ALTER COLUMN \"id\" DROP IDENTITY"]
        );

        let result = compile("mysql", &old, &new);
        assert_eq!(
            result.up_sql(),
            vec!["ALTER TABLE `t` MODIFY COLUMN `id` int NOT NULL AUTO_INCREMENT"]
        );
    }

    #[test]
    fn test_second_identity_rejected() {
        let mut new = base();
        new.columns[2] = ColumnSpec::new("age", "int").identity().unique();
        let d = dialect("postgres");
        let err = Compiler::new(&d).compile(&base(), &new).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidSpec { .. }));
    }

    #[test]
    fn test_table_rename_rejected() {
        let new = TableSpec::new(None, "other").with_columns(base().columns);
        let d = dialect("mysql");
        assert!(Compiler::new(&d).compile(&base(), &new).is_err());
    }

    #[test]
    fn test_schema_falls_back_to_current() {
        let mut old = base();
        old.schema = Some("sales".into());
        let mut new = base();
        new.columns.retain(|c| c.name != "age");
        let result = compile("mssql", &old, &new);
        assert_eq!(result.up_sql(), vec!["ALTER TABLE [sales].[t] DROP COLUMN [age]"]);
    }

    // =========================================================================
    // Round trips
    // =========================================================================

    fn scenarios() -> Vec<(&'static str, TableSpec)> {
        let mut added = base();
        added
            .columns
            .push(ColumnSpec::new("score", "int").not_null().with_default("0").unique());

        let mut deleted = base();
        deleted.columns.retain(|c| c.name != "created");

        let mut renamed = base();
        renamed.columns[1] = ColumnSpec::new("full_name", "varchar")
            .with_length(50)
            .renamed_from("name");

        let mut retyped = base();
        retyped.columns[2] = ColumnSpec::new("age", "bigint");

        let mut not_null = base();
        not_null.columns[2] = ColumnSpec::new("age", "int").not_null().with_default("0");

        let mut combined = base();
        combined.columns[1] = ColumnSpec::new("full_name", "nvarchar")
            .with_length(100)
            .not_null()
            .with_default("anon")
            .renamed_from("name");

        let mut new_default = base();
        new_default.columns[3] = ColumnSpec::new("created", "datetime")
            .not_null()
            .with_default("2000-01-01");

        let mut key_grows = base();
        key_grows.columns[4] = ColumnSpec::new("code", "varchar").with_length(10).unique().primary();

        let mut unique_flip = base();
        unique_flip.columns[4] = ColumnSpec::new("code", "varchar").with_length(10);
        unique_flip.columns[2] = ColumnSpec::new("age", "int").unique();

        vec![
            ("added", added),
            ("deleted", deleted),
            ("renamed", renamed),
            ("retyped", retyped),
            ("not_null", not_null),
            ("combined", combined),
            ("new_default", new_default),
            ("key_grows", key_grows),
            ("unique_flip", unique_flip),
        ]
    }

    #[test]
    fn test_round_trip_all_dialects() {
        for (label, new) in scenarios() {
            for name in DIALECTS {
                let old = base();
                let result = compile(name, &old, &new);
                assert!(!result.up_statements.is_empty(), "{label}/{name}");
                assert_round_trip(name, &old, &new);
            }
        }
    }

    #[test]
    fn test_round_trip_identity_flip() {
        let old = table(vec![
            ColumnSpec::new("id", "int").primary(),
            ColumnSpec::new("n", "int"),
        ]);
        let new = table(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("n", "int"),
        ]);
        for name in ["mysql", "postgres"] {
            assert_round_trip(name, &old, &new);
            assert_round_trip(name, &new, &old);
        }
    }

    #[test]
    fn test_unchanged_table_compiles_to_nothing() {
        for name in DIALECTS {
            assert!(compile(name, &base(), &base()).is_empty(), "{}", name);
        }
    }

    #[test]
    fn test_result_serializes_statements() {
        let (old, new) = age_not_null();
        let result = compile("mysql", &old, &new);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json["up_statements"][0]["sql"],
            "ALTER TABLE `t` MODIFY COLUMN `age` int NOT NULL DEFAULT 0"
        );
        assert_eq!(json["up_plan"][0]["op"], "alter_nullability");
    }
}
