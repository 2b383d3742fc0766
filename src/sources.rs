// src/sources.rs
//! Source registry: the configured feeds, each with a fetch location, a keyword
//! filter and a category tag. Loaded once per run and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use url::Url;

use crate::error::ConfigError;

/// Category tag of a source. Declaration order is the digest priority order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Funding,
    ChineseMedia,
    InternationalMedia,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Funding,
        Category::ChineseMedia,
        Category::InternationalMedia,
        Category::Other,
    ];

    /// Lower is placed earlier in the digest.
    pub fn priority(self) -> u8 {
        match self {
            Category::Funding => 0,
            Category::ChineseMedia => 1,
            Category::InternationalMedia => 2,
            Category::Other => 3,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Funding => "💰",
            Category::ChineseMedia => "🇨🇳",
            Category::InternationalMedia => "🌐",
            Category::Other => "📰",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Funding => "Funding",
            Category::ChineseMedia => "Chinese media",
            Category::InternationalMedia => "International media",
            Category::Other => "General",
        }
    }
}

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(alias = "location")]
    pub url: String,
    /// Empty set means every item from this source is relevant.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub category: Category,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            keywords: BTreeSet::new(),
            category,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Validated, immutable list of sources, unique by name, in configured order.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut names = HashSet::with_capacity(sources.len());
        let mut cleaned = Vec::with_capacity(sources.len());
        for mut s in sources {
            s.name = s.name.trim().to_string();
            s.url = s.url.trim().to_string();
            if s.name.is_empty() {
                return Err(ConfigError::EmptySourceName);
            }
            if !names.insert(s.name.clone()) {
                return Err(ConfigError::DuplicateSource(s.name));
            }
            let valid = Url::parse(&s.url)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidSourceUrl {
                    name: s.name,
                    url: s.url,
                });
            }
            s.keywords = s
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            cleaned.push(s);
        }

        Ok(Self { sources: cleaned })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
