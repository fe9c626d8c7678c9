//! Schema migrations.
//!
//! SQL is embedded at compile time and executed when a database is opened.

use rusqlite::Connection;

use crate::error::Result;

/// Inventory tables SQL (001)
pub const INVENTORY_TABLES_SQL: &str = include_str!("001_inventory_tables.sql");

/// GitHub layer SQL (002)
pub const GITHUB_SQL: &str = include_str!("002_github.sql");

/// Run all migrations in order. Every statement is idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INVENTORY_TABLES_SQL)?;
    conn.execute_batch(GITHUB_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('project', 'project_scan', 'project_derived', 'project_enrichment',
                              'project_override', 'project_metadata', 'project_github', 'activity')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 8);
    }
}
