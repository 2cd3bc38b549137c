//! Extension columns
//!
//! Administratively registered filters applied after the core groups. The
//! persisted catalog stores `{name, display_name, kind, parameters}`; the
//! `kind` selects an implementation from an `ExtensionRegistry` populated at
//! startup. Every extension contributes a predicate that is conjoined onto
//! the plan, so it can only narrow the result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::plan::{Predicate, Relation};

pub const USER_FIELD_PRESENT: &str = "user_field_present";
pub const USER_FIELD_EQUALS: &str = "user_field_equals";
pub const HAS_PHONE: &str = "has_phone";

/// Persisted extension column descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct SearchColumn {
    pub id: i64,
    /// Name requested through the `column` parameter
    pub name: String,
    pub display_name: String,
    pub kind: String,
    #[serde(default)]
    pub parameters: String,
}

impl SearchColumn {
    pub fn new(id: i64, name: &str, display_name: &str, kind: &str, parameters: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            kind: kind.to_string(),
            parameters: parameters.to_string(),
        }
    }
}

/// Filter contributed by an extension column
pub trait ExtensionColumn: Send + Sync {
    /// Condition conjoined onto the plan
    fn filter(&self) -> Predicate;

    /// Phrase appended to the human description
    fn describe(&self) -> String;
}

type Factory = Arc<dyn Fn(&SearchColumn) -> Result<Box<dyn ExtensionColumn>, ValidationError> + Send + Sync>;

/// Extension implementations keyed by kind
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    kinds: HashMap<String, Factory>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(USER_FIELD_PRESENT, |column| {
            let field = required_parameter(column)?;
            Ok(Box::new(UserFieldPresent {
                field: field.to_string(),
                display_name: column.display_name.clone(),
            }))
        });
        registry.register(USER_FIELD_EQUALS, |column| {
            let (field, value) = required_parameter(column)?
                .split_once('=')
                .map(|(f, v)| (f.trim(), v.trim()))
                .filter(|(f, _)| !f.is_empty())
                .ok_or_else(|| invalid_parameters(column))?;
            Ok(Box::new(UserFieldEquals {
                field: field.to_string(),
                value: value.to_string(),
                display_name: column.display_name.clone(),
            }))
        });
        registry.register(HAS_PHONE, |column| {
            Ok(Box::new(HasPhone {
                display_name: column.display_name.clone(),
            }))
        });
        registry
    }

    /// Add or replace the implementation for `kind`
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&SearchColumn) -> Result<Box<dyn ExtensionColumn>, ValidationError> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.to_string(), Arc::new(factory));
    }

    /// Instantiate the extension described by `column`
    pub fn load(&self, column: &SearchColumn) -> Result<Box<dyn ExtensionColumn>, ValidationError> {
        let factory = self
            .kinds
            .get(&column.kind)
            .ok_or_else(|| ValidationError::UnknownColumnKind {
                column: column.name.clone(),
                kind: column.kind.clone(),
            })?;
        factory(column)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn required_parameter(column: &SearchColumn) -> Result<&str, ValidationError> {
    let parameters = column.parameters.trim();
    if parameters.is_empty() {
        return Err(invalid_parameters(column));
    }
    Ok(parameters)
}

fn invalid_parameters(column: &SearchColumn) -> ValidationError {
    ValidationError::InvalidColumnParameters {
        column: column.name.clone(),
        parameters: column.parameters.clone(),
    }
}

struct UserFieldPresent {
    field: String,
    display_name: String,
}

impl ExtensionColumn for UserFieldPresent {
    fn filter(&self) -> Predicate {
        Predicate::Related {
            relation: Relation::UserField(self.field.clone()),
            values: None,
        }
    }

    fn describe(&self) -> String {
        self.display_name.clone()
    }
}

struct UserFieldEquals {
    field: String,
    value: String,
    display_name: String,
}

impl ExtensionColumn for UserFieldEquals {
    fn filter(&self) -> Predicate {
        Predicate::Related {
            relation: Relation::UserField(self.field.clone()),
            values: Some(vec![self.value.clone()]),
        }
    }

    fn describe(&self) -> String {
        self.display_name.clone()
    }
}

struct HasPhone {
    display_name: String,
}

impl ExtensionColumn for HasPhone {
    fn filter(&self) -> Predicate {
        Predicate::Related {
            relation: Relation::Phone,
            values: None,
        }
    }

    fn describe(&self) -> String {
        self.display_name.clone()
    }
}

/// Persisted extension column catalog
#[async_trait]
pub trait SearchColumnStore: Send + Sync {
    /// Columns with the given names, in catalog order. Unknown names are absent.
    async fn load_columns(&self, names: &[String]) -> anyhow::Result<Vec<SearchColumn>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySearchColumnStore {
    columns: Vec<SearchColumn>,
}

impl MemorySearchColumnStore {
    pub fn new(mut columns: Vec<SearchColumn>) -> Self {
        columns.sort_by_key(|c| c.id);
        Self { columns }
    }
}

#[async_trait]
impl SearchColumnStore for MemorySearchColumnStore {
    async fn load_columns(&self, names: &[String]) -> anyhow::Result<Vec<SearchColumn>> {
        Ok(self
            .columns
            .iter()
            .filter(|c| names.contains(&c.name))
            .cloned()
            .collect())
    }
}

#[cfg(feature = "database")]
pub use pg::PgSearchColumnStore;

#[cfg(feature = "database")]
mod pg {
    use anyhow::Context;
    use async_trait::async_trait;
    use sqlx::PgPool;

    use super::{SearchColumn, SearchColumnStore};

    /// Reads the `search_column` table
    pub struct PgSearchColumnStore {
        pool: PgPool,
    }

    impl PgSearchColumnStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl SearchColumnStore for PgSearchColumnStore {
        async fn load_columns(&self, names: &[String]) -> anyhow::Result<Vec<SearchColumn>> {
            if names.is_empty() {
                return Ok(Vec::new());
            }

            sqlx::query_as::<_, SearchColumn>(
                r#"
                SELECT id, name, display_name, kind, parameters
                FROM search_column
                WHERE name = ANY($1)
                ORDER BY id
                "#,
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load search columns")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_kinds() {
        let registry = ExtensionRegistry::standard();
        assert_eq!(registry.kinds(), vec![HAS_PHONE, USER_FIELD_EQUALS, USER_FIELD_PRESENT]);
    }

    #[test]
    fn test_user_field_equals() {
        let registry = ExtensionRegistry::standard();
        let column = SearchColumn::new(1, "volunteers", "is a volunteer", USER_FIELD_EQUALS, "volunteer = yes");
        let extension = registry.load(&column).unwrap();

        assert_eq!(extension.describe(), "is a volunteer");
        assert_eq!(
            extension.filter(),
            Predicate::Related {
                relation: Relation::UserField("volunteer".to_string()),
                values: Some(vec!["yes".to_string()]),
            }
        );
    }

    #[test]
    fn test_bad_parameters_and_unknown_kind() {
        let registry = ExtensionRegistry::standard();

        let missing = SearchColumn::new(1, "campus_set", "has a campus", USER_FIELD_PRESENT, " ");
        assert!(matches!(
            registry.load(&missing),
            Err(ValidationError::InvalidColumnParameters { .. })
        ));

        let no_pair = SearchColumn::new(2, "vol", "volunteer", USER_FIELD_EQUALS, "volunteer");
        assert!(matches!(
            registry.load(&no_pair),
            Err(ValidationError::InvalidColumnParameters { .. })
        ));

        let unknown = SearchColumn::new(3, "py", "python hook", "python_path", "a.b.c");
        assert_eq!(
            registry.load(&unknown).err(),
            Some(ValidationError::UnknownColumnKind {
                column: "py".to_string(),
                kind: "python_path".to_string(),
            })
        );
    }

    #[test]
    fn test_custom_kind_registration() {
        struct Everyone;
        impl ExtensionColumn for Everyone {
            fn filter(&self) -> Predicate {
                Predicate::All
            }
            fn describe(&self) -> String {
                "everyone".to_string()
            }
        }

        let mut registry = ExtensionRegistry::standard();
        registry.register("everyone", |_| Ok(Box::new(Everyone)));
        let column = SearchColumn::new(9, "all", "everyone", "everyone", "");
        assert_eq!(registry.load(&column).unwrap().filter(), Predicate::All);
    }

    #[tokio::test]
    async fn test_memory_store_catalog_order() {
        let store = MemorySearchColumnStore::new(vec![
            SearchColumn::new(2, "phone", "has a phone", HAS_PHONE, ""),
            SearchColumn::new(1, "campus_set", "has a campus", USER_FIELD_PRESENT, "campus"),
        ]);
        let columns = store
            .load_columns(&["phone".to_string(), "campus_set".to_string(), "nope".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["campus_set", "phone"]);
    }
}
