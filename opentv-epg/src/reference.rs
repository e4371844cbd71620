//! Category, rating and custom-category lookup tables.
//!
//! ```toml
//! [categories]
//! "37" = "Drama"
//!
//! [ratings]
//! "4" = "15"
//!
//! [[custom_categories]]
//! phrase = "News"
//! category = "News"
//! match_in = "title"
//! ```

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::error::{EpgError, Result};

/// Read-only reference data consumed by synthesis.
pub trait ReferenceTables: Send + Sync {
    /// Name of a numeric category id.
    fn category(&self, id: u8) -> Option<&str>;

    /// Label of a parental rating nibble.
    fn rating(&self, nibble: u8) -> Option<&str>;

    /// First custom category whose phrase matches the title or description.
    fn custom_category(&self, title: &str, description: &str) -> Option<&str>;
}

/// Which text a custom phrase is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchIn {
    Title,
    Description,
    #[default]
    Any,
}

#[derive(Debug, Deserialize)]
struct CustomCategoryEntry {
    phrase: String,
    category: String,
    #[serde(default)]
    match_in: MatchIn,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TablesFile {
    categories: HashMap<String, String>,
    ratings: HashMap<String, String>,
    custom_categories: Vec<CustomCategoryEntry>,
}

#[derive(Debug)]
struct CustomCategory {
    pattern: Regex,
    category: String,
    match_in: MatchIn,
}

/// TOML-backed [`ReferenceTables`].
#[derive(Debug, Default)]
pub struct StaticReferenceTables {
    categories: HashMap<u8, String>,
    ratings: HashMap<u8, String>,
    custom: Vec<CustomCategory>,
}

fn parse_key(table: &str, key: &str) -> Result<u8> {
    key.trim()
        .parse()
        .map_err(|_| EpgError::Config(format!("{}: key \"{}\" is not a number 0-255", table, key)))
}

impl StaticReferenceTables {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EpgError::Config(format!("{}: {}", path.display(), e)))?;
        let tables = Self::from_toml(&contents)?;
        debug!(
            "[Reference] Loaded {} categories, {} ratings, {} custom categories from {:?}",
            tables.categories.len(),
            tables.ratings.len(),
            tables.custom.len(),
            path
        );
        Ok(tables)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: TablesFile =
            toml::from_str(contents).map_err(|e| EpgError::Config(e.to_string()))?;

        let mut tables = Self::default();
        for (key, name) in file.categories {
            tables.categories.insert(parse_key("categories", &key)?, name);
        }
        for (key, label) in file.ratings {
            tables.ratings.insert(parse_key("ratings", &key)?, label);
        }
        for entry in file.custom_categories {
            tables.add_custom_category(&entry.phrase, &entry.category, entry.match_in)?;
        }
        Ok(tables)
    }

    pub fn add_category(&mut self, id: u8, name: impl Into<String>) {
        self.categories.insert(id, name.into());
    }

    pub fn add_rating(&mut self, nibble: u8, label: impl Into<String>) {
        self.ratings.insert(nibble, label.into());
    }

    /// Add a phrase, matched case-insensitively as whole words. Earlier
    /// phrases win.
    pub fn add_custom_category(&mut self, phrase: &str, category: &str, match_in: MatchIn) -> Result<()> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(EpgError::Config(format!(
                "custom category \"{}\" has an empty phrase",
                category
            )));
        }
        let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase)))
            .map_err(|e| EpgError::Config(e.to_string()))?;
        self.custom.push(CustomCategory {
            pattern,
            category: category.to_string(),
            match_in,
        });
        Ok(())
    }
}

impl ReferenceTables for StaticReferenceTables {
    fn category(&self, id: u8) -> Option<&str> {
        self.categories.get(&id).map(String::as_str)
    }

    fn rating(&self, nibble: u8) -> Option<&str> {
        self.ratings.get(&nibble).map(String::as_str)
    }

    fn custom_category(&self, title: &str, description: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|c| match c.match_in {
                MatchIn::Title => c.pattern.is_match(title),
                MatchIn::Description => c.pattern.is_match(description),
                MatchIn::Any => c.pattern.is_match(title) || c.pattern.is_match(description),
            })
            .map(|c| c.category.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLES: &str = r#"
        [categories]
        "37" = "Drama"
        "64" = "Sport"

        [ratings]
        "4" = "15"

        [[custom_categories]]
        phrase = "News"
        category = "News & Weather"
        match_in = "title"

        [[custom_categories]]
        phrase = "premier league"
        category = "Football"
    "#;

    #[test]
    fn test_lookup() {
        let tables = StaticReferenceTables::from_toml(TABLES).unwrap();
        assert_eq!(tables.category(37), Some("Drama"));
        assert_eq!(tables.category(38), None);
        assert_eq!(tables.rating(4), Some("15"));
        assert_eq!(tables.rating(0), None);
    }

    #[test]
    fn test_custom_category_whole_words() {
        let tables = StaticReferenceTables::from_toml(TABLES).unwrap();
        assert_eq!(tables.custom_category("BBC news at Six", ""), Some("News & Weather"));
        assert_eq!(tables.custom_category("Newsnight", ""), None);
        // Title-only phrase does not look at the description
        assert_eq!(tables.custom_category("Drama", "The news."), None);
        assert_eq!(
            tables.custom_category("Match of the Day", "All the Premier League goals."),
            Some("Football")
        );
    }

    #[test]
    fn test_bad_keys() {
        assert!(StaticReferenceTables::from_toml("[categories]\n\"x\" = \"Drama\"").is_err());
        assert!(StaticReferenceTables::from_toml("[ratings]\n\"300\" = \"18\"").is_err());
        assert!(StaticReferenceTables::from_toml(
            "[[custom_categories]]\nphrase = \" \"\ncategory = \"X\""
        )
        .is_err());
    }
}
