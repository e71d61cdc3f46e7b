//! Seed the product catalog from a YAML file.
//!
//! Each entry is matched to an existing product by slug (derived from the
//! name when omitted). Matches are updated in place, everything else is
//! inserted, so the command can be re-run after editing the file. Every
//! write goes through the table client, which means open storefronts pick
//! up the changes through their live mirror.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use timberline_admin::routes::slugify;
use timberline_core::{Price, Table};
use timberline_realtime::postgres::PgTableClient;
use timberline_realtime::{Query, TableClient};

use super::CliError;

/// One product as written in the catalog file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rating: Decimal,
    #[serde(default)]
    pub review_count: i32,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub bestseller: bool,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Serialize)]
struct ProductRow<'a> {
    name: &'a str,
    slug: String,
    category: &'a str,
    price: Price,
    compare_at_price: Option<Price>,
    description: &'a str,
    rating: Decimal,
    review_count: i32,
    stock: i32,
    image_url: Option<&'a str>,
    bestseller: bool,
    featured: bool,
}

impl CatalogEntry {
    fn slug(&self) -> String {
        self.slug.as_deref().map_or_else(|| slugify(&self.name), slugify)
    }

    /// Problems with this entry, empty when it is valid.
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let label = if self.name.trim().is_empty() {
            "(unnamed)"
        } else {
            self.name.as_str()
        };

        if self.name.trim().is_empty() {
            problems.push(format!("{label}: name is required"));
        }
        if self.slug().is_empty() {
            problems.push(format!("{label}: slug is empty"));
        }
        if self.category.trim().is_empty() {
            problems.push(format!("{label}: category is required"));
        }
        if self.price <= Decimal::ZERO {
            problems.push(format!("{label}: price must be greater than zero"));
        }
        if self.compare_at_price.is_some_and(|c| c <= self.price) {
            problems.push(format!("{label}: compare_at_price must exceed price"));
        }
        if self.rating < Decimal::ZERO || self.rating > Decimal::from(5) {
            problems.push(format!("{label}: rating must be between 0 and 5"));
        }
        if self.stock < 0 || self.review_count < 0 {
            problems.push(format!("{label}: stock and review_count cannot be negative"));
        }
        problems
    }

    fn row(&self) -> ProductRow<'_> {
        ProductRow {
            name: self.name.trim(),
            slug: self.slug(),
            category: self.category.trim(),
            price: Price::new(self.price.round_dp(2)),
            compare_at_price: self.compare_at_price.map(|c| Price::new(c.round_dp(2))),
            description: self.description.trim(),
            rating: self.rating.round_dp(1),
            review_count: self.review_count,
            stock: self.stock,
            image_url: self.image_url.as_deref(),
            bestseller: self.bestseller,
            featured: self.featured,
        }
    }
}

/// Counts from one seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: usize,
    pub updated: usize,
}

/// Parse and validate a catalog document.
///
/// # Errors
///
/// Returns `Yaml` for malformed input and `InvalidCatalog` listing every
/// problem found, including duplicate slugs.
pub fn parse_catalog(content: &str) -> Result<Vec<CatalogEntry>, CliError> {
    let entries: Vec<CatalogEntry> = serde_yaml::from_str(content)?;

    let mut problems: Vec<String> = entries.iter().flat_map(CatalogEntry::problems).collect();
    let mut seen = std::collections::HashSet::new();
    for entry in &entries {
        let slug = entry.slug();
        if !slug.is_empty() && !seen.insert(slug.clone()) {
            problems.push(format!("{}: duplicate slug {slug}", entry.name));
        }
    }

    if problems.is_empty() {
        Ok(entries)
    } else {
        Err(CliError::InvalidCatalog(problems))
    }
}

/// Insert or update every entry, matched by slug.
///
/// # Errors
///
/// Returns the first backend failure; entries before it stay written.
pub async fn seed_catalog(tables: &dyn TableClient, entries: &[CatalogEntry]) -> Result<SeedResult, CliError> {
    let mut result = SeedResult::default();

    for entry in entries {
        let row = serde_json::to_value(entry.row())?;
        let query = Query::new().eq("slug", row["slug"].clone()).limit(1);
        let existing = tables.select(Table::Products, &query).await?;

        match existing.first().and_then(|r| r.get("id")).and_then(Value::as_i64) {
            Some(id) => {
                tables.update(Table::Products, id, row).await?;
                result.updated += 1;
            }
            None => {
                tables.insert(Table::Products, row).await?;
                result.inserted += 1;
            }
        }
    }

    Ok(result)
}

/// Load `file_path` into the products table.
///
/// # Errors
///
/// Returns an error if the file cannot be read or validated, or a database
/// operation fails.
pub async fn catalog(path: &Path) -> Result<(), CliError> {
    tracing::info!(path = %path.display(), "loading catalog");

    // Validate before connecting to the database
    let content = tokio::fs::read_to_string(path).await.map_err(|source| CliError::Io {
        path: path.to_owned(),
        source,
    })?;
    let entries = match parse_catalog(&content) {
        Ok(entries) => entries,
        Err(CliError::InvalidCatalog(problems)) => {
            tracing::error!("Catalog validation failed:");
            for problem in &problems {
                tracing::error!("  - {problem}");
            }
            return Err(CliError::InvalidCatalog(problems));
        }
        Err(e) => return Err(e),
    };
    tracing::info!(products = entries.len(), "Catalog validated");

    let pool = super::connect().await?;
    let result = seed_catalog(&PgTableClient::new(pool), &entries).await?;

    tracing::info!(inserted = result.inserted, updated = result.updated, "catalog seeded");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use timberline_realtime::memory::MemoryBackend;

    use super::*;

    const CATALOG: &str = include_str!("../../../../data/catalog.yaml");

    #[test]
    fn test_bundled_catalog_is_valid() {
        let entries = parse_catalog(CATALOG).unwrap();
        assert_eq!(entries.len(), 12);
        assert_eq!(entries.iter().filter(|e| e.category == "Office").count(), 4);
        assert_eq!(entries[0].slug(), "walnut-writing-desk");
    }

    #[test]
    fn test_rejects_bad_entries() {
        let yaml = r"
- name: Free Chair
  category: Office
  price: 0
- name: Odd Lamp
  category: ''
  price: 10
  rating: 7
- name: Twin
  category: Office
  price: 5
- name: twin
  category: Office
  price: 6
";
        let Err(CliError::InvalidCatalog(problems)) = parse_catalog(yaml) else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("duplicate slug twin")));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let yaml = "- name: Desk\n  category: Office\n  price: 10\n  colour: red\n";
        assert!(matches!(parse_catalog(yaml), Err(CliError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_seeding_twice_updates_in_place() {
        let backend = MemoryBackend::new();
        let mut entries = parse_catalog(CATALOG).unwrap();

        let first = seed_catalog(&backend, &entries).await.unwrap();
        assert_eq!(first, SeedResult { inserted: 12, updated: 0 });

        entries[0].stock = 99;
        let second = seed_catalog(&backend, &entries).await.unwrap();
        assert_eq!(second, SeedResult { inserted: 0, updated: 12 });

        let rows = backend.rows(Table::Products);
        assert_eq!(rows.len(), 12);
        let desk = rows.iter().find(|r| r["slug"] == "walnut-writing-desk").unwrap();
        assert_eq!(desk["stock"], 99);
    }
}
