//! Validation of `db_query` before it reaches the server.
//!
//! The inventory only ever reads. A query must be non-empty, start with
//! `SELECT`, and parse (MySQL dialect) as exactly one read-only query.
//! Write, DDL, transaction and administrative statements are rejected with
//! their operation name, including when appended after a `;`.

use crate::error::{InventoryError, InventoryResult};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

pub const EMPTY_QUERY: &str = "Query must be a non-empty string";
pub const NOT_A_SELECT: &str = "Database query must be a valid SELECT statement";

/// Type of SQL statement detected by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementType {
    Select,
    DmlWrite,
    Ddl,
    Transaction,
    ProcedureCall,
    Administrative,
    Unknown,
}

impl SqlStatementType {
    fn rejection_reason(self) -> &'static str {
        match self {
            Self::Select => "",
            Self::DmlWrite => "inventory queries must not modify data",
            Self::Ddl => "inventory queries must not modify the schema",
            Self::Transaction => "transaction control is not allowed",
            Self::ProcedureCall => "procedure calls cannot be verified as read-only",
            Self::Administrative => "administrative statements are not allowed",
            Self::Unknown => "only SELECT queries are allowed",
        }
    }
}

/// Check `sql` and return it trimmed, ready to execute.
pub fn validate_query(sql: &str) -> InventoryResult<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(InventoryError::invalid_query(EMPTY_QUERY));
    }

    if !starts_with_select(trimmed) {
        return Err(InventoryError::invalid_query(NOT_A_SELECT));
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, trimmed)
        .map_err(|e| InventoryError::invalid_query(format!("{}: {}", NOT_A_SELECT, e)))?;

    let mut statements = statements.iter();
    let first = statements
        .next()
        .ok_or_else(|| InventoryError::invalid_query(EMPTY_QUERY))?;
    validate_statement(first)?;

    if let Some(extra) = statements.next() {
        let (stmt_type, operation) = classify_statement(extra);
        let reason = match stmt_type {
            SqlStatementType::Select => "only a single statement is allowed",
            other => other.rejection_reason(),
        };
        return Err(InventoryError::query_rejected(operation, reason));
    }

    Ok(trimmed)
}

fn starts_with_select(sql: &str) -> bool {
    sql.get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn validate_statement(stmt: &Statement) -> InventoryResult<()> {
    let (stmt_type, operation) = classify_statement(stmt);
    match stmt_type {
        SqlStatementType::Select => Ok(()),
        other => Err(InventoryError::query_rejected(
            operation,
            other.rejection_reason(),
        )),
    }
}

/// Classify a parsed statement into a statement type.
fn classify_statement(stmt: &Statement) -> (SqlStatementType, &'static str) {
    match stmt {
        // SELECT ... INTO OUTFILE/DUMPFILE writes on the server
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) if select.into.is_some() => {
                (SqlStatementType::DmlWrite, "SELECT INTO")
            }
            _ => (SqlStatementType::Select, "SELECT"),
        },

        Statement::Insert(_) => (SqlStatementType::DmlWrite, "INSERT"),
        Statement::Update { .. } => (SqlStatementType::DmlWrite, "UPDATE"),
        Statement::Delete(_) => (SqlStatementType::DmlWrite, "DELETE"),
        Statement::Merge { .. } => (SqlStatementType::DmlWrite, "MERGE"),

        Statement::CreateTable { .. } => (SqlStatementType::Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (SqlStatementType::Ddl, "CREATE VIEW"),
        Statement::CreateIndex(_) => (SqlStatementType::Ddl, "CREATE INDEX"),
        Statement::CreateDatabase { .. } => (SqlStatementType::Ddl, "CREATE DATABASE"),
        Statement::CreateFunction { .. } => (SqlStatementType::Ddl, "CREATE FUNCTION"),
        Statement::CreateProcedure { .. } => (SqlStatementType::Ddl, "CREATE PROCEDURE"),
        Statement::CreateTrigger { .. } => (SqlStatementType::Ddl, "CREATE TRIGGER"),
        Statement::AlterTable { .. } => (SqlStatementType::Ddl, "ALTER TABLE"),
        Statement::AlterView { .. } => (SqlStatementType::Ddl, "ALTER VIEW"),
        Statement::Drop { .. } => (SqlStatementType::Ddl, "DROP"),
        Statement::DropFunction { .. } => (SqlStatementType::Ddl, "DROP FUNCTION"),
        Statement::DropProcedure { .. } => (SqlStatementType::Ddl, "DROP PROCEDURE"),
        Statement::DropTrigger { .. } => (SqlStatementType::Ddl, "DROP TRIGGER"),
        Statement::Truncate { .. } => (SqlStatementType::Ddl, "TRUNCATE"),

        Statement::StartTransaction { .. } => (SqlStatementType::Transaction, "BEGIN"),
        Statement::Commit { .. } => (SqlStatementType::Transaction, "COMMIT"),
        Statement::Rollback { .. } => (SqlStatementType::Transaction, "ROLLBACK"),
        Statement::Savepoint { .. } => (SqlStatementType::Transaction, "SAVEPOINT"),

        Statement::Call { .. } => (SqlStatementType::ProcedureCall, "CALL"),
        Statement::Execute { .. } => (SqlStatementType::ProcedureCall, "EXECUTE"),
        Statement::Prepare { .. } => (SqlStatementType::ProcedureCall, "PREPARE"),

        Statement::Grant { .. } => (SqlStatementType::Administrative, "GRANT"),
        Statement::Revoke { .. } => (SqlStatementType::Administrative, "REVOKE"),
        Statement::Set(_) => (SqlStatementType::Administrative, "SET"),
        Statement::Use(_) => (SqlStatementType::Administrative, "USE"),
        Statement::Kill { .. } => (SqlStatementType::Administrative, "KILL"),
        Statement::LockTables { .. } => (SqlStatementType::Administrative, "LOCK"),
        Statement::UnlockTables => (SqlStatementType::Administrative, "UNLOCK"),
        Statement::Flush { .. } => (SqlStatementType::Administrative, "FLUSH"),
        Statement::OptimizeTable { .. } => (SqlStatementType::Administrative, "OPTIMIZE"),

        _ => (SqlStatementType::Unknown, "Unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_ok() {
        assert_eq!(
            validate_query("  SELECT * FROM hosts  ").unwrap(),
            "SELECT * FROM hosts"
        );
    }

    #[test]
    fn test_trailing_semicolon_ok() {
        assert!(validate_query("SELECT * FROM mydb;\n").is_ok());
    }

    #[test]
    fn test_lowercase_select_ok() {
        assert!(validate_query("select hostname, env from servers").is_ok());
    }

    #[test]
    fn test_empty_query() {
        for sql in ["", "   ", "\n\t"] {
            let err = validate_query(sql).unwrap_err();
            assert_eq!(err.to_string(), EMPTY_QUERY);
        }
    }

    #[test]
    fn test_non_select_prefix() {
        for sql in ["SHOW TABLES", "WITH x AS (SELECT 1) SELECT * FROM x", "DELETE FROM hosts"] {
            let err = validate_query(sql).unwrap_err();
            assert_eq!(err.to_string(), NOT_A_SELECT);
        }
    }

    #[test]
    fn test_select_prefix_on_other_word_rejected() {
        assert!(validate_query("SELECTED").is_err());
    }

    #[test]
    fn test_second_statement_rejected_with_operation() {
        let err = validate_query("SELECT 1; DROP TABLE hosts").unwrap_err();
        match err {
            InventoryError::QueryRejected { operation, .. } => assert_eq!(operation, "DROP"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_two_selects_rejected() {
        let err = validate_query("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("single statement"));
    }

    #[test]
    fn test_select_into_outfile_rejected() {
        let err = validate_query("SELECT * INTO OUTFILE '/tmp/x' FROM hosts");
        assert!(err.is_err());
    }

    #[test]
    fn test_complex_select_with_subquery() {
        let sql = r#"
            SELECT h.hostname, (SELECT COUNT(*) FROM services s WHERE s.host_id = h.id) AS svc
            FROM hosts h
            WHERE h.env IN (SELECT env FROM active_envs)
        "#;
        assert!(validate_query(sql).is_ok());
    }

    #[test]
    fn test_union_ok() {
        assert!(validate_query("SELECT a FROM t1 UNION ALL SELECT b FROM t2").is_ok());
    }

    #[test]
    fn test_unparseable_select_rejected() {
        let err = validate_query("SELECT * FROM (").unwrap_err();
        assert!(err.to_string().starts_with(NOT_A_SELECT));
    }
}
