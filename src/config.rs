//! Mapping configuration
//!
//! Reads `colpersist.toml` and turns every `[[collection]]` entry into a
//! [`CollectionDescriptor`]. All structural validation happens in the core
//! builder, so a bad mapping fails at load time rather than at first flush.
//!
//! ## Environment Variables
//!
//! - `COLPERSIST_PARAMETER_STYLE` - placeholder syntax, `positional` (`?`) or `numbered` (`$n`)
//!
//! These can be set in a `.env` file next to the mapping file.
//!
//! ## Example
//!
//! ```toml
//! parameter_style = "positional"
//!
//! [[collection]]
//! role = "Order.lines"
//! classification = "list"
//! table = "order_lines"
//! key = [{ name = "order_id", type = "integer" }]
//! element = [{ name = "line", type = "text" }]
//! index = [{ name = "pos", type = "integer" }]
//! ```

use colpersist_core::{
    CollectionClassification, CollectionDescriptor, Column, IdentifierGenerator, Navigable,
    NavigablePart, NavigableRole, ParameterStyle, StatementCompiler, StorageStrategy, Table,
    ValueType,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MappingError, MappingResult};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "colpersist.toml";

/// Environment variable names
pub const ENV_PARAMETER_STYLE: &str = "COLPERSIST_PARAMETER_STYLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub parameter_style: ParameterStyle,
    #[serde(default, rename = "collection")]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Owner type and property, e.g. `Order.lines`
    pub role: String,
    pub classification: CollectionClassification,
    #[serde(default = "default_storage")]
    pub storage: StorageStrategy,
    pub table: String,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub base_index: i64,
    #[serde(default = "default_enabled")]
    pub row_insert_enabled: bool,
    #[serde(default = "default_enabled")]
    pub row_delete_enabled: bool,
    pub key: Vec<ColumnConfig>,
    pub element: Vec<ColumnConfig>,
    #[serde(default)]
    pub index: Option<Vec<ColumnConfig>>,
    #[serde(default)]
    pub identifier: Option<IdentifierConfig>,
}

fn default_storage() -> StorageStrategy {
    StorageStrategy::JoinTable
}

fn default_enabled() -> bool {
    true
}

/// One column of a key, element, index or identifier. Exactly one of `name`
/// and `formula` must be set; formulas are only accepted for index columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Location inside a composite value (`"address.city"`)
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Increment,
    Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierConfig {
    pub columns: Vec<ColumnConfig>,
    #[serde(default = "default_generator")]
    pub generator: GeneratorKind,
    /// First value handed out by the increment generator
    #[serde(default = "default_start")]
    pub start: i64,
}

fn default_generator() -> GeneratorKind {
    GeneratorKind::Increment
}

fn default_start() -> i64 {
    1
}

impl MappingConfig {
    /// Load the mapping from a directory
    ///
    /// This also loads any `.env` file in the directory and applies
    /// environment variable overrides.
    pub fn load(dir: &Path) -> MappingResult<Self> {
        Self::load_with_env(dir, ".env")
    }

    fn load_with_env(dir: &Path, env_file: &str) -> MappingResult<Self> {
        // Load env file if present (ignore errors)
        let env_path = dir.join(env_file);
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(MappingError::invalid(format!(
                "mapping file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        debug!(
            "Loaded {} collection mappings from {}",
            config.collections.len(),
            config_path.display()
        );
        Ok(config)
    }

    /// Parse mapping text without touching the environment.
    pub fn parse(content: &str) -> MappingResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored with a
    /// warning so the file setting stays in effect.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(style) = lookup(ENV_PARAMETER_STYLE) {
            if style.is_empty() {
                return;
            }
            match style.parse::<ParameterStyle>() {
                Ok(style) => self.parameter_style = style,
                Err(e) => warn!("Ignoring {}: {}", ENV_PARAMETER_STYLE, e),
            }
        }
    }

    pub fn compiler(&self) -> StatementCompiler {
        StatementCompiler::new(self.parameter_style)
    }

    /// Build every descriptor. Roles must be unique.
    pub fn descriptors(&self) -> MappingResult<Vec<CollectionDescriptor>> {
        let mut roles: Vec<&str> = Vec::with_capacity(self.collections.len());
        let mut descriptors = Vec::with_capacity(self.collections.len());
        for collection in &self.collections {
            if roles.contains(&collection.role.as_str()) {
                return Err(MappingError::invalid(format!(
                    "collection role '{}' is mapped twice",
                    collection.role
                )));
            }
            roles.push(&collection.role);
            descriptors.push(collection.descriptor()?);
        }
        Ok(descriptors)
    }
}

impl CollectionConfig {
    pub fn descriptor(&self) -> MappingResult<CollectionDescriptor> {
        let table = Table::new(self.table.as_str())?;
        let mut builder =
            CollectionDescriptor::builder(self.role.as_str(), self.classification, table.clone())
                .storage(self.storage)
                .inverse(self.inverse)
                .base_index(self.base_index)
                .row_insert_enabled(self.row_insert_enabled)
                .row_delete_enabled(self.row_delete_enabled)
                .key(self.navigable(&table, NavigableRole::Key, &self.key)?)
                .element(self.navigable(&table, NavigableRole::Element, &self.element)?);

        if let Some(index) = &self.index {
            builder = builder.index(self.navigable(&table, NavigableRole::Index, index)?);
        }
        if let Some(id) = &self.identifier {
            let generator = match id.generator {
                GeneratorKind::Increment => IdentifierGenerator::increment_from(id.start),
                GeneratorKind::Uuid => IdentifierGenerator::Uuid,
            };
            let navigable = self.navigable(&table, NavigableRole::Identifier, &id.columns)?;
            builder = builder.identifier(navigable, generator);
        }
        Ok(builder.build()?)
    }

    fn navigable(
        &self,
        table: &Table,
        role: NavigableRole,
        columns: &[ColumnConfig],
    ) -> MappingResult<Navigable> {
        let parts = columns
            .iter()
            .map(|column| column.part(table, &self.role, role))
            .collect::<MappingResult<Vec<_>>>()?;
        Ok(Navigable::new(role, parts)?)
    }
}

impl ColumnConfig {
    fn part(&self, table: &Table, owner: &str, role: NavigableRole) -> MappingResult<NavigablePart> {
        let column = match (&self.name, &self.formula) {
            (Some(name), None) => Column::physical(table, name.as_str())?,
            (None, Some(expression)) => Column::formula(table, expression.as_str())?,
            _ => {
                return Err(MappingError::invalid(format!(
                    "{}: every {} column needs exactly one of 'name' or 'formula'",
                    owner, role
                )))
            }
        };
        Ok(match &self.path {
            Some(path) => NavigablePart::at_path(column, self.value_type, path.as_str()),
            None => NavigablePart::new(column, self.value_type),
        })
    }
}
