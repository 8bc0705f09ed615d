//! Tenant catalogs: which databases to provision and which collections seed them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One tenant database and the collections created in it.
///
/// The first collection is the seed collection: the server does not materialize a
/// database until it holds something, so at least one is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSpec {
    pub database: String,
    pub collections: Vec<String>,
}

impl TenantSpec {
    #[must_use]
    pub fn new(database: impl Into<String>, seed_collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: vec![seed_collection.into()],
        }
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    #[must_use]
    pub fn seed_collection(&self) -> Option<&str> {
        self.collections.first().map(String::as_str)
    }
}

/// Built-in catalogs matching the known deployment flavors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogPreset {
    /// Shared replica-set deployment, one database per service.
    #[default]
    Shared,
    /// Single-node deployment used by the service compose files.
    Standalone,
    /// Leaner flavor with both timelines in one database.
    MergedTimelines,
}

impl CatalogPreset {
    #[must_use]
    pub fn tenants(self) -> Vec<TenantSpec> {
        match self {
            Self::Shared => vec![
                TenantSpec::new("users_db", "Users"),
                TenantSpec::new("posts_db", "Posts"),
                TenantSpec::new("social_db", "Relationships"),
                TenantSpec::new("user_timelines_db", "UserTimelines"),
                TenantSpec::new("home_timelines_db", "HomeTimelines"),
                TenantSpec::new("search_db", "SearchIndex"),
            ],
            Self::Standalone => vec![
                TenantSpec::new("users_db", "Users"),
                TenantSpec::new("posts_db", "RegisteredUsers").with_collection("Posts"),
                TenantSpec::new("user_timelines_db", "UserTimelines"),
                TenantSpec::new("home_timelines_db", "HomeTimelines"),
            ],
            Self::MergedTimelines => vec![
                TenantSpec::new("users_db", "Users"),
                TenantSpec::new("posts_db", "Posts"),
                TenantSpec::new("timelines_db", "UserTimelines").with_collection("HomeTimelines"),
            ],
        }
    }
}

impl fmt::Display for CatalogPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Standalone => "standalone",
            Self::MergedTimelines => "merged-timelines",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("tenant catalog is empty")]
    Empty,

    #[error("tenant #{index} has an empty database name")]
    EmptyDatabaseName { index: usize },

    #[error("tenant '{database}' has no seed collection")]
    NoCollections { database: String },

    #[error("tenant '{database}' has an empty collection name")]
    EmptyCollectionName { database: String },

    #[error("database '{database}' is listed more than once")]
    DuplicateDatabase { database: String },

    #[error("collection '{collection}' is listed more than once in '{database}'")]
    DuplicateCollection { database: String, collection: String },

    #[error("'{database}' is reserved and cannot be a tenant database")]
    ReservedDatabase { database: String },
}

/// Ordered, validated list of tenants. Provisioning follows this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantCatalog {
    tenants: Vec<TenantSpec>,
}

impl TenantCatalog {
    /// Validate and wrap a tenant list.
    ///
    /// Database and collection names are trimmed before validation and stored
    /// trimmed.
    ///
    /// # Errors
    /// Returns a [`CatalogError`] for an empty list, blank names, reserved databases,
    /// or duplicate databases/collections.
    pub fn new(mut tenants: Vec<TenantSpec>) -> Result<Self, CatalogError> {
        if tenants.is_empty() {
            return Err(CatalogError::Empty);
        }

        for tenant in &mut tenants {
            trim_in_place(&mut tenant.database);
            tenant.collections.iter_mut().for_each(trim_in_place);
        }

        let mut seen = HashSet::new();
        for (index, tenant) in tenants.iter().enumerate() {
            let database = tenant.database.as_str();
            if database.is_empty() {
                return Err(CatalogError::EmptyDatabaseName { index });
            }
            if matches!(database, "admin" | "local" | "config") {
                return Err(CatalogError::ReservedDatabase {
                    database: database.to_owned(),
                });
            }
            if !seen.insert(database) {
                return Err(CatalogError::DuplicateDatabase {
                    database: database.to_owned(),
                });
            }
            if tenant.collections.is_empty() {
                return Err(CatalogError::NoCollections {
                    database: database.to_owned(),
                });
            }

            let mut collections = HashSet::new();
            for collection in &tenant.collections {
                if collection.is_empty() {
                    return Err(CatalogError::EmptyCollectionName {
                        database: database.to_owned(),
                    });
                }
                if !collections.insert(collection.as_str()) {
                    return Err(CatalogError::DuplicateCollection {
                        database: database.to_owned(),
                        collection: collection.clone(),
                    });
                }
            }
        }

        Ok(Self { tenants })
    }

    /// Catalog for a built-in preset.
    #[must_use]
    pub fn preset(preset: CatalogPreset) -> Self {
        // Presets are static and valid by construction.
        Self {
            tenants: preset.tenants(),
        }
    }

    #[must_use]
    pub fn tenants(&self) -> &[TenantSpec] {
        &self.tenants
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

fn trim_in_place(name: &mut String) {
    let trimmed = name.trim();
    if trimmed.len() != name.len() {
        *name = trimmed.to_owned();
    }
}

impl Default for TenantCatalog {
    fn default() -> Self {
        Self::preset(CatalogPreset::default())
    }
}

impl<'a> IntoIterator for &'a TenantCatalog {
    type Item = &'a TenantSpec;
    type IntoIter = std::slice::Iter<'a, TenantSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.tenants.iter()
    }
}
