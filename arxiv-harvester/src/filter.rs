use crate::phrase::PhraseMatcher;
use crate::record_set::RecordSet;
use crate::taxonomy::Taxonomy;
use crate::types::{HarvestError, Record, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// How `FilterConfig::apply` combines its four dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    /// category AND (author OR title-keyword OR abstract-keyword)
    #[default]
    UnionAfterCategory,
    /// category AND author AND title-keyword AND abstract-keyword
    Conjunctive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

impl CaseSensitivity {
    fn is_insensitive(self) -> bool {
        self == CaseSensitivity::Insensitive
    }

    fn normalize(self, value: &str) -> String {
        if self.is_insensitive() {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }
}

/// Predicate over up to four record dimensions. An unset or empty
/// dimension accepts every record.
#[derive(Debug, Clone, Default)]
pub struct FilterExpression {
    categories: Option<HashSet<String>>,
    authors: Option<HashSet<String>>,
    title_phrases: Option<Vec<String>>,
    abstract_phrases: Option<Vec<String>>,
    case: CaseSensitivity,
}

impl FilterExpression {
    pub fn new(case: CaseSensitivity) -> Self {
        Self {
            case,
            ..Default::default()
        }
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories = self.normalized_set(categories);
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authors = self.normalized_set(authors);
        self
    }

    pub fn title_keywords<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.title_phrases = non_empty(phrases);
        self
    }

    pub fn abstract_keywords<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.abstract_phrases = non_empty(phrases);
        self
    }

    fn normalized_set<I, S>(&self, values: I) -> Option<HashSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = values
            .into_iter()
            .filter(|v| !v.as_ref().trim().is_empty())
            .map(|v| self.case.normalize(v.as_ref()))
            .collect();
        if set.is_empty() {
            None
        } else {
            Some(set)
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.categories.is_none()
            && self.authors.is_none()
            && self.title_phrases.is_none()
            && self.abstract_phrases.is_none()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.matches_categories(record)
            && self.matches_authors(record)
            && self.matches_title(record)
            && self.matches_abstract(record)
    }

    fn matches_categories(&self, record: &Record) -> bool {
        self.intersects(&self.categories, &record.categories)
    }

    fn matches_authors(&self, record: &Record) -> bool {
        self.intersects(&self.authors, &record.authors)
    }

    fn matches_title(&self, record: &Record) -> bool {
        self.contains_any(&self.title_phrases, &record.title)
    }

    fn matches_abstract(&self, record: &Record) -> bool {
        self.contains_any(&self.abstract_phrases, &record.abstract_text)
    }

    fn intersects(&self, wanted: &Option<HashSet<String>>, values: &[String]) -> bool {
        match wanted {
            None => true,
            Some(wanted) => values
                .iter()
                .any(|v| wanted.contains(&self.case.normalize(v))),
        }
    }

    fn contains_any(&self, phrases: &Option<Vec<String>>, text: &str) -> bool {
        match phrases {
            None => true,
            Some(phrases) => phrases
                .iter()
                .any(|p| PhraseMatcher::contains_phrase(text, p, self.case.is_insensitive())),
        }
    }

    pub fn apply(&self, set: &RecordSet) -> RecordSet {
        if self.is_unconstrained() {
            return set.clone();
        }
        set.retain(|r| self.matches(r))
    }
}

fn non_empty<I, S>(values: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .filter(|v| !v.trim().is_empty())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Raw, serializable form of a query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    #[serde(alias = "keywd_in_title")]
    pub keywords_in_title: Vec<String>,
    #[serde(alias = "keywd_in_abstract")]
    pub keywords_in_abstract: Vec<String>,
    pub composition: Composition,
    pub case_sensitivity: CaseSensitivity,
}

/// A reusable query filter: a category gate plus author/title/abstract
/// predicates, combined according to `Composition`.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    settings: FilterSettings,
    category_filter: FilterExpression,
    author_filter: FilterExpression,
    title_filter: FilterExpression,
    abstract_filter: FilterExpression,
}

impl FilterConfig {
    pub fn new(settings: FilterSettings) -> Self {
        let case = settings.case_sensitivity;
        Self {
            category_filter: FilterExpression::new(case).categories(&settings.categories),
            author_filter: FilterExpression::new(case).authors(&settings.authors),
            title_filter: FilterExpression::new(case).title_keywords(&settings.keywords_in_title),
            abstract_filter: FilterExpression::new(case)
                .abstract_keywords(&settings.keywords_in_abstract),
            settings,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: FilterSettings = toml::from_str(content)?;
        Ok(Self::new(settings))
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn categories(&self) -> &[String] {
        &self.settings.categories
    }

    pub fn composition(&self) -> Composition {
        self.settings.composition
    }

    /// Category-groups that must be harvested to answer this filter.
    pub fn target_groups(&self, taxonomy: &Taxonomy) -> Result<BTreeSet<String>> {
        if self.settings.categories.is_empty() {
            return Err(HarvestError::Config(
                "filter names no categories, cannot select a category group".to_string(),
            ));
        }
        taxonomy.resolve_groups(&self.settings.categories)
    }

    pub fn apply(&self, set: &RecordSet) -> RecordSet {
        let gated = self.category_filter.apply(set);
        match self.settings.composition {
            Composition::UnionAfterCategory => {
                let by_author = self.author_filter.apply(&gated);
                let by_title = self.title_filter.apply(&gated);
                let by_abstract = self.abstract_filter.apply(&gated);
                by_author.union(&by_title).union(&by_abstract)
            }
            Composition::Conjunctive => {
                let by_author = self.author_filter.apply(&gated);
                let by_title = self.title_filter.apply(&by_author);
                self.abstract_filter.apply(&by_title)
            }
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new(FilterSettings::default())
    }
}

impl From<FilterSettings> for FilterConfig {
    fn from(settings: FilterSettings) -> Self {
        Self::new(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unconstrained_expression_matches_everything() {
        let expr = FilterExpression::new(CaseSensitivity::Insensitive);
        assert!(expr.is_unconstrained());
        assert!(expr.matches(&Record::default()));
        assert!(expr.matches(&Record::new("x").with_categories(["math.AG"])));
    }

    #[test]
    fn test_empty_lists_are_unconstrained() {
        let expr = FilterExpression::new(CaseSensitivity::Insensitive)
            .categories(Vec::<String>::new())
            .title_keywords(["", "  "]);
        assert!(expr.is_unconstrained());
    }

    #[test]
    fn test_blank_members_are_ignored() {
        let expr = FilterExpression::new(CaseSensitivity::Insensitive)
            .categories(["", "  "])
            .authors([" "]);
        assert!(expr.is_unconstrained());

        let gated = FilterExpression::new(CaseSensitivity::Insensitive).categories(["", "cs.AI"]);
        assert!(gated.matches(&Record::new("1").with_categories(["cs.AI"])));
        assert!(!gated.matches(&Record::new("2").with_categories(["math.AG"])));

        let filter = FilterConfig::new(FilterSettings {
            categories: strings(&[""]),
            ..Default::default()
        });
        let set: RecordSet = vec![
            Record::new("1").with_categories(["cs.AI"]),
            Record::new("2"),
        ]
        .into();
        assert_eq!(filter.apply(&set).len(), 2);
    }

    #[test]
    fn test_category_and_author_membership() {
        let expr = FilterExpression::new(CaseSensitivity::Insensitive)
            .categories(["cs.ai"])
            .authors(["Ada Lovelace"]);
        let hit = Record::new("1")
            .with_categories(["cs.LG", "cs.AI"])
            .with_authors(["ada lovelace"]);
        let wrong_author = Record::new("2")
            .with_categories(["cs.AI"])
            .with_authors(["Alan Turing"]);
        assert!(expr.matches(&hit));
        assert!(!expr.matches(&wrong_author));
    }

    #[test]
    fn test_case_sensitive_membership() {
        let expr = FilterExpression::new(CaseSensitivity::Sensitive).categories(["cs.ai"]);
        assert!(!expr.matches(&Record::new("1").with_categories(["cs.AI"])));
        assert!(expr.matches(&Record::new("2").with_categories(["cs.ai"])));
    }

    #[test]
    fn test_keyword_any_phrase() {
        let expr = FilterExpression::new(CaseSensitivity::Insensitive)
            .abstract_keywords(["graph neural", "diffusion"]);
        assert!(expr.matches(&Record::new("1").with_abstract("A Diffusion model.")));
        assert!(expr.matches(&Record::new("2").with_abstract("graph neural networks")));
        assert!(!expr.matches(&Record::new("3").with_abstract("neural graph")));
    }

    #[test]
    fn test_settings_accept_legacy_keys() {
        let config = FilterConfig::from_toml_str(
            r#"
            categories = ["cs.AI"]
            keywd_in_title = ["transformer"]
            keywd_in_abstract = ["novel"]
            composition = "conjunctive"
            "#,
        )
        .unwrap();
        assert_eq!(config.settings().keywords_in_title, strings(&["transformer"]));
        assert_eq!(config.settings().keywords_in_abstract, strings(&["novel"]));
        assert_eq!(config.composition(), Composition::Conjunctive);
        assert_eq!(config.settings().case_sensitivity, CaseSensitivity::Insensitive);
    }

    #[test]
    fn test_target_groups() {
        let taxonomy = Taxonomy::builtin().unwrap();
        let config = FilterConfig::new(FilterSettings {
            categories: strings(&["cs.AI", "math.AG", "cs.CL"]),
            ..Default::default()
        });
        let groups: Vec<String> = config.target_groups(&taxonomy).unwrap().into_iter().collect();
        assert_eq!(groups, strings(&["cs", "math"]));

        assert!(matches!(
            FilterConfig::default().target_groups(&taxonomy),
            Err(HarvestError::Config(_))
        ));
    }
}
