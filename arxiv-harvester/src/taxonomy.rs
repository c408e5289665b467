use crate::types::{HarvestError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

const BUILTIN_TAXONOMY: &str = include_str!("../data/taxonomy.toml");

/// Static mapping from category-group (OAI-PMH set) to its category tags.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    groups: BTreeMap<String, Vec<String>>,
    owners: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    groups: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// The taxonomy shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TAXONOMY)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let taxonomy = Self::from_toml_str(&content)?;
        info!("Loaded taxonomy from {:?} ({} groups)", path, taxonomy.groups.len());
        Ok(taxonomy)
    }

    /// Use `path` if given, otherwise the builtin taxonomy.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TaxonomyFile = toml::from_str(content)?;
        Self::from_groups(file.groups)
    }

    pub fn from_groups<I, G, C>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (G, C)>,
        G: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let groups: BTreeMap<String, Vec<String>> = groups
            .into_iter()
            .map(|(g, cats)| (g.into(), cats.into_iter().map(Into::into).collect()))
            .collect();

        let mut owners = HashMap::new();
        for (group, categories) in &groups {
            for category in categories {
                if let Some(previous) = owners.insert(category.to_ascii_lowercase(), group.clone()) {
                    return Err(HarvestError::Config(format!(
                        "category {} listed under both {} and {}",
                        category, previous, group
                    )));
                }
            }
        }

        Ok(Self { groups, owners })
    }

    pub fn is_valid_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn validate_group(&self, group: &str) -> Result<()> {
        if self.is_valid_group(group) {
            Ok(())
        } else {
            Err(HarvestError::UnknownCategoryGroup(group.to_string()))
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn categories_of(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Owning group of `category`, compared ASCII case-insensitively.
    pub fn group_of(&self, category: &str) -> Option<&str> {
        self.owners
            .get(&category.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Distinct owning groups of `categories`.
    pub fn resolve_groups<I, S>(&self, categories: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        categories
            .into_iter()
            .map(|c| {
                let c = c.as_ref();
                self.group_of(c)
                    .map(str::to_string)
                    .ok_or_else(|| HarvestError::UnknownCategory(c.to_string()))
            })
            .collect()
    }
}
