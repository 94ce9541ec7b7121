//! Table definitions for the supported database backends.

use super::errors::DbError;

/// SQL flavour behind an `Any` connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, DbError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(DbError::Connection {
                message: format!("unsupported database scheme '{scheme}'"),
            })
        }
    }

    /// `CREATE TABLE` statements, parents before children.
    pub fn create_statements(&self) -> &'static [&'static str] {
        match self {
            Dialect::Postgres => POSTGRES_TABLES,
            Dialect::Sqlite => SQLITE_TABLES,
        }
    }

    /// `DROP TABLE` statements, children before parents.
    pub fn drop_statements(&self) -> &'static [&'static str] {
        DROP_TABLES
    }
}

const POSTGRES_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS role (
        id BIGSERIAL PRIMARY KEY,
        role_name VARCHAR(100) NOT NULL UNIQUE,
        description VARCHAR(500),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        update_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS permission (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(200) NOT NULL UNIQUE,
        description VARCHAR(500),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        update_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        login VARCHAR(150) NOT NULL UNIQUE,
        password_hash VARCHAR(200) NOT NULL,
        role_id BIGINT NOT NULL REFERENCES role(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        update_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS role_permission (
        id BIGSERIAL PRIMARY KEY,
        role_id BIGINT NOT NULL REFERENCES role(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permission(id) ON DELETE CASCADE,
        granted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (role_id, permission_id)
    )"#,
];

const SQLITE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS role (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        role_name VARCHAR(100) NOT NULL UNIQUE,
        description VARCHAR(500),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        update_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS permission (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name VARCHAR(200) NOT NULL UNIQUE,
        description VARCHAR(500),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        update_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        login VARCHAR(150) NOT NULL UNIQUE,
        password_hash VARCHAR(200) NOT NULL,
        role_id INTEGER NOT NULL REFERENCES role(id),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        update_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS role_permission (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        role_id INTEGER NOT NULL REFERENCES role(id) ON DELETE CASCADE,
        permission_id INTEGER NOT NULL REFERENCES permission(id) ON DELETE CASCADE,
        granted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (role_id, permission_id)
    )"#,
];

const DROP_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS role_permission",
    "DROP TABLE IF EXISTS users",
    "DROP TABLE IF EXISTS permission",
    "DROP TABLE IF EXISTS role",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("postgres://localhost/panel").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_url("postgresql://u:p@db:5432/panel").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("sqlite://panel.db?mode=rwc").unwrap(), Dialect::Sqlite);

        let err = Dialect::from_url("mysql://localhost/panel").unwrap_err();
        assert!(err.to_string().contains("mysql"));
    }

    #[test]
    fn test_tables_created_parents_first_and_dropped_children_first() {
        for dialect in [Dialect::Postgres, Dialect::Sqlite] {
            let create = dialect.create_statements();
            assert!(create[0].contains("TABLE IF NOT EXISTS role ("));
            assert!(create[3].contains("role_permission"));
        }
        assert!(Dialect::Sqlite.drop_statements()[0].ends_with("role_permission"));
        assert!(Dialect::Sqlite.drop_statements()[3].ends_with("role"));
    }
}
