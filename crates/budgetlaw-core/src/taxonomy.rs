//! The closed set of category labels a proposal may be filed under.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Built-in categories, one per reviewing body plus the cross-cutting ones.
pub const BUILTIN_CATEGORIES: &[&str] = &[
    "通案刪減",
    "內政部",
    "衛福部",
    "交通部",
    "經濟部",
    "國防部",
    "勞動部",
    "環境部",
    "教育部",
    "行政院",
    "NCC",
    "文化部",
    "原民會",
    "中研院",
    "中選會",
    "僑委會",
    "公平會",
    "前瞻計畫",
    "司法院",
    "國安局",
    "國發會",
    "國科會",
    "外交部",
    "客委會",
    "故宮",
    "數發部",
    "財政部",
    "核安會",
    "法務部",
    "海委會",
    "監察院",
    "立法院",
    "總統府",
    "考試院",
    "農業部",
    "退輔會",
    "金管會",
    "陸委會",
    "黨產會",
];

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("read taxonomy {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse taxonomy {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("taxonomy is empty")]
    Empty,
}

/// Ordered, duplicate-free list of category labels.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    names: Vec<String>,
    index: HashSet<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Taxonomy {
    pub fn builtin() -> Self {
        let names: Vec<String> = BUILTIN_CATEGORIES.iter().map(|s| s.to_string()).collect();
        let index = names.iter().cloned().collect();
        Self { names, index }
    }

    /// Build from labels, trimming each, dropping blanks and later duplicates.
    pub fn from_names<I, S>(names: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && index.insert(name.to_string()) {
                ordered.push(name.to_string());
            }
        }
        if ordered.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        Ok(Self {
            names: ordered,
            index,
        })
    }

    /// Load a JSON array of labels.
    pub fn from_json_file(path: &Path) -> Result<Self, TaxonomyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let names: Vec<String> =
            serde_json::from_str(&raw).map_err(|source| TaxonomyError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_names(names)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.index.contains(category.trim())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
