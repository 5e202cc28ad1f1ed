//! Rule set catalog and case-insensitive resolution.

use std::path::Path;

use walkdir::WalkDir;

use crate::config::ValigatorConfig;
use crate::error::ConfigError;

/// A rule set the engine can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    /// Identifier clients send in the `ruleset` query parameter.
    pub name: String,
    /// Value passed to `--ruleset`: a file path for discovered rule sets,
    /// the name itself for a fixed catalog.
    pub location: String,
    /// Alternate identifier (the full file name) accepted for discovered rule sets.
    file_name: Option<String>,
}

impl Ruleset {
    fn matches(&self, requested: &str) -> bool {
        self.name.eq_ignore_ascii_case(requested)
            || self
                .file_name
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case(requested))
    }
}

/// Known rule sets, read-only after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesetCatalog {
    rulesets: Vec<Ruleset>,
}

impl RulesetCatalog {
    /// Catalog of logical names handed to the engine verbatim.
    #[must_use]
    pub fn fixed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rulesets = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .map(|name| Ruleset {
                location: name.clone(),
                name,
                file_name: None,
            })
            .collect();
        Self { rulesets }
    }

    /// Catalog of the regular files directly inside `dir`, sorted by file name.
    ///
    /// Hidden files are skipped. Each rule set is named after its file stem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RulesetsDir`] if the directory cannot be read.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let mut rulesets = Vec::new();
        // Followed links keep mounted config volumes (symlinked files) visible.
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| ConfigError::RulesetsDir {
                dir: dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                tracing::warn!(path = %entry.path().display(), "Skipping rule set with non UTF-8 name");
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            let name = entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name)
                .to_owned();
            rulesets.push(Ruleset {
                name,
                location: entry.path().to_string_lossy().into_owned(),
                file_name: Some(file_name.to_owned()),
            });
        }
        Ok(Self { rulesets })
    }

    /// Build the catalog the configuration describes: the fixed `ruleSets`
    /// list when non-empty, otherwise the contents of `ruleSetsDir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule sets directory has to be read and cannot be.
    pub fn from_config(config: &ValigatorConfig) -> Result<Self, ConfigError> {
        if config.rule_sets.is_empty() {
            Self::discover(&config.rule_sets_dir)
        } else {
            Ok(Self::fixed(config.rule_sets.iter().cloned()))
        }
    }

    /// Look up a requested identifier, ignoring ASCII case and surrounding whitespace.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> Option<&Ruleset> {
        let requested = requested.trim();
        if requested.is_empty() {
            return None;
        }
        self.rulesets.iter().find(|r| r.matches(requested))
    }

    /// Rule set names in catalog order.
    #[must_use]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rulesets.iter().map(|r| r.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }
}
