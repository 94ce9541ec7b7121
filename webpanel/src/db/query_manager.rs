//! Named SQL statements loaded from YAML.
//!
//! The file maps a category to a mapping of query name to SQL:
//!
//! ```yaml
//! users:
//!   get_user_by_login: |
//!     SELECT u.id AS user_id, u.login FROM users u WHERE u.login = :login
//! ```
//!
//! Categories only exist to keep the file readable; names are global, so the same name in two
//! categories is rejected. Parameters are written as `:name` and compiled to positional `$n`
//! placeholders once, at load time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query file {} not found", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to read query file {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse query YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid query YAML format: expected a mapping of categories")]
    NotAMapping,

    #[error("Category '{category}' must contain a mapping of queries")]
    InvalidCategory { category: String },

    #[error("Query '{name}' in category '{category}' must be a string")]
    InvalidQuery { category: String, name: String },

    #[error("Query with name '{name}' is already registered")]
    Duplicate { name: String },

    #[error("Query with name '{name}' not found")]
    NotFound { name: String },
}

/// A statement with its `:name` parameters rewritten to `$1..$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    /// Parameter names in placeholder order; `params[0]` binds to `$1`.
    pub params: Vec<String>,
}

#[derive(Debug, Clone)]
struct RegisteredQuery {
    raw: String,
    compiled: CompiledQuery,
}

#[derive(Debug, Clone, Default)]
pub struct QueryManager {
    queries: HashMap<String, RegisteredQuery>,
}

impl QueryManager {
    /// Load and register every query in the YAML file at `path`.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), "Failed to read query file: {}", e);
            match e.kind() {
                std::io::ErrorKind::NotFound => QueryError::FileNotFound { path: path.to_path_buf() },
                _ => QueryError::Io {
                    path: path.to_path_buf(),
                    source: e,
                },
            }
        })?;

        let manager = Self::from_yaml_str(&source).inspect_err(|e| {
            error!(path = %path.display(), "Failed to register queries: {}", e);
        })?;
        debug!(path = %path.display(), count = manager.queries.len(), "Registered SQL queries");
        Ok(manager)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, QueryError> {
        let data: Value = serde_yaml::from_str(source)?;
        let mut manager = Self::default();
        manager.register_queries(data)?;
        Ok(manager)
    }

    fn register_queries(&mut self, data: Value) -> Result<(), QueryError> {
        let Value::Mapping(categories) = data else {
            return Err(QueryError::NotAMapping);
        };

        for (category, queries) in categories {
            let category = key_to_string(&category);
            let Value::Mapping(queries) = queries else {
                return Err(QueryError::InvalidCategory { category });
            };

            for (name, query) in queries {
                let name = key_to_string(&name);
                let Value::String(raw) = query else {
                    return Err(QueryError::InvalidQuery { category, name });
                };
                if self.queries.contains_key(&name) {
                    return Err(QueryError::Duplicate { name });
                }

                let compiled = compile_named_params(&raw);
                debug!(query = %name, %category, "Query registered");
                self.queries.insert(name, RegisteredQuery { raw, compiled });
            }
        }

        Ok(())
    }

    /// The SQL exactly as written in the file.
    pub fn get_query(&self, name: &str) -> Result<&str, QueryError> {
        self.lookup(name).map(|q| q.raw.as_str())
    }

    /// The statement ready for binding.
    pub fn get_compiled(&self, name: &str) -> Result<&CompiledQuery, QueryError> {
        self.lookup(name).map(|q| &q.compiled)
    }

    /// Every registered query, name to raw SQL.
    pub fn list_queries(&self) -> HashMap<&str, &str> {
        self.queries.iter().map(|(name, q)| (name.as_str(), q.raw.as_str())).collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<&RegisteredQuery, QueryError> {
        self.queries.get(name).ok_or_else(|| {
            error!(query = %name, "Query not found");
            QueryError::NotFound { name: name.to_string() }
        })
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).map(|s| s.trim_end().to_string()).unwrap_or_default(),
    }
}

/// Rewrite `:name` placeholders to `$n`.
///
/// Quoted literals, quoted identifiers, `--` comments and `::type` casts are copied untouched.
/// A name used twice shares one placeholder.
pub fn compile_named_params(sql: &str) -> CompiledQuery {
    let mut out = String::with_capacity(sql.len());
    let mut params: Vec<String> = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            ':' => match chars.peek() {
                Some((_, ':')) => {
                    out.push_str("::");
                    chars.next();
                }
                Some((start, next)) if next.is_ascii_alphabetic() || *next == '_' => {
                    let start = *start;
                    let mut end = start;
                    while let Some((i, ch)) = chars.peek() {
                        if ch.is_ascii_alphanumeric() || *ch == '_' {
                            end = i + ch.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    let position = match params.iter().position(|p| p == name) {
                        Some(i) => i + 1,
                        None => {
                            params.push(name.to_string());
                            params.len()
                        }
                    };
                    out.push('$');
                    out.push_str(&position.to_string());
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    CompiledQuery { sql: out, params }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const QUERIES: &str = r#"
users:
  get_all_users: "SELECT * FROM users"
  get_user_by_login: "SELECT id FROM users WHERE login = :login"
roles:
  get_all_roles: "SELECT * FROM role"
  get_role_by_name: "SELECT id FROM role WHERE role_name = :role_name"
permissions:
  get_all_permissions: "SELECT * FROM permission"
"#;

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(QUERIES.as_bytes()).unwrap();

        let manager = QueryManager::from_yaml(file.path()).unwrap();
        assert_eq!(manager.len(), 5);
        assert_eq!(manager.get_query("get_all_users").unwrap(), "SELECT * FROM users");
    }

    #[test]
    fn test_missing_file() {
        let err = QueryManager::from_yaml("/definitely/not/here/queries.yaml").unwrap_err();
        assert!(matches!(err, QueryError::FileNotFound { .. }));
    }

    #[test]
    fn test_empty_file_is_not_a_mapping() {
        let err = QueryManager::from_yaml_str("").unwrap_err();
        assert!(matches!(err, QueryError::NotAMapping));
    }

    #[test]
    fn test_top_level_list_rejected() {
        let err = QueryManager::from_yaml_str("- SELECT 1\n- SELECT 2\n").unwrap_err();
        assert!(matches!(err, QueryError::NotAMapping));
    }

    #[test]
    fn test_category_must_be_mapping() {
        let err = QueryManager::from_yaml_str("users: SELECT 1\n").unwrap_err();
        match err {
            QueryError::InvalidCategory { category } => assert_eq!(category, "users"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_query_must_be_string() {
        let err = QueryManager::from_yaml_str("users:\n  broken:\n    - SELECT 1\n").unwrap_err();
        match err {
            QueryError::InvalidQuery { category, name } => {
                assert_eq!(category, "users");
                assert_eq!(name, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_across_categories() {
        let source = "users:\n  get_one: SELECT 1\nroles:\n  get_one: SELECT 2\n";
        let err = QueryManager::from_yaml_str(source).unwrap_err();
        assert!(matches!(err, QueryError::Duplicate { name } if name == "get_one"));
    }

    #[test]
    fn test_get_query_not_found() {
        let manager = QueryManager::from_yaml_str(QUERIES).unwrap();
        let err = manager.get_query("non_existent_query").unwrap_err();
        assert_eq!(err.to_string(), "Query with name 'non_existent_query' not found");
    }

    #[test]
    fn test_list_queries() {
        let manager = QueryManager::from_yaml_str(QUERIES).unwrap();
        let all = manager.list_queries();
        assert_eq!(all.len(), 5);
        assert_eq!(all.get("get_all_roles"), Some(&"SELECT * FROM role"));
    }

    #[test]
    fn test_compiled_lookup() {
        let manager = QueryManager::from_yaml_str(QUERIES).unwrap();
        let compiled = manager.get_compiled("get_role_by_name").unwrap();
        assert_eq!(compiled.sql, "SELECT id FROM role WHERE role_name = $1");
        assert_eq!(compiled.params, vec!["role_name".to_string()]);
    }

    #[test]
    fn test_compile_repeated_and_multiple_params() {
        let compiled = compile_named_params("SELECT * FROM users WHERE login = :login OR id = :id OR login = :login");
        assert_eq!(compiled.sql, "SELECT * FROM users WHERE login = $1 OR id = $2 OR login = $1");
        assert_eq!(compiled.params, vec!["login".to_string(), "id".to_string()]);
    }

    #[test]
    fn test_compile_leaves_casts_literals_and_comments() {
        let sql = "SELECT created_at::text, ':not_a_param' AS lit -- :nor_this\nFROM users WHERE login = :login";
        let compiled = compile_named_params(sql);
        assert_eq!(
            compiled.sql,
            "SELECT created_at::text, ':not_a_param' AS lit -- :nor_this\nFROM users WHERE login = $1"
        );
        assert_eq!(compiled.params, vec!["login".to_string()]);
    }

    #[test]
    fn test_compile_without_params() {
        let compiled = compile_named_params("SELECT 1");
        assert_eq!(compiled.sql, "SELECT 1");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_shipped_queries_file() {
        let manager = QueryManager::from_yaml("config/queries.yaml").unwrap();
        let compiled = manager.get_compiled("get_user_by_login").unwrap();
        assert_eq!(compiled.params, vec!["login"]);
        assert!(manager.get_query("get_role_permissions").is_ok());

        let mut names: Vec<&str> = manager.list_queries().into_keys().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["get_role_permissions", "get_user_by_login"]);
    }
}
