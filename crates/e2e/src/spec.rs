//! Declarative scenario specification
//!
//! A scenario describes one form interaction: which page to open, which
//! fields to fill, what to click, where the result message appears and what
//! it must say. Suites of scenarios can be written in YAML or built in code
//! (see [`crate::scenarios`]).

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::identity::SessionIdentity;

/// Submit control shared by the auth pages
pub const DEFAULT_SUBMIT_SELECTOR: &str = "button.primary-btn";

/// A named, ordered collection of scenarios parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSuite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Scenarios in execution order
    pub scenarios: Vec<Scenario>,
}

/// One user interaction and its expected outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name within the suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Page path relative to the base URL
    pub target_path: String,

    /// Fields to fill, in order
    pub fields: Vec<FieldFill>,

    /// Control that submits the form
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,

    /// Element that shows the result message
    pub result_selector: String,

    /// Rule the stable result text must satisfy
    pub expect: TextPattern,

    /// Secondary observation of persisted browser state
    #[serde(default)]
    pub auxiliary: Option<AuxiliaryCheck>,

    /// Scenario whose generated data this one relies on
    #[serde(default)]
    pub depends_on: Option<String>,
}

fn default_submit_selector() -> String {
    DEFAULT_SUBMIT_SELECTOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFill {
    pub selector: String,
    pub value: String,
}

impl FieldFill {
    pub fn new(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            value: value.into(),
        }
    }
}

/// Text-matching rule for the result message
///
/// YAML accepts either a plain string, matched as a case-insensitive
/// substring, or `/body/flags` for a regular expression (`i`, `m`, `s`).
/// A leading backslash forces the substring reading, so `\/x/` matches the
/// literal text `/x/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextPattern {
    Contains(String),
    Regex { source: String, regex: Regex },
}

impl TextPattern {
    /// Case-insensitive substring rule
    pub fn contains(needle: impl Into<String>) -> Self {
        TextPattern::Contains(needle.into())
    }

    /// Regular expression rule with JavaScript-style flags
    pub fn regex(body: &str, flags: &str) -> E2eResult<Self> {
        let mut builder = RegexBuilder::new(body);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                other => {
                    return Err(E2eError::SpecParse(format!(
                        "unsupported regex flag '{}' in /{}/{}",
                        other, body, flags
                    )))
                }
            };
        }
        Ok(TextPattern::Regex {
            source: format!("/{}/{}", body, flags),
            regex: builder.build()?,
        })
    }

    /// Parse the YAML notation
    pub fn parse(input: &str) -> E2eResult<Self> {
        if input.trim().is_empty() {
            return Err(E2eError::SpecParse("empty text pattern".into()));
        }
        if let Some(literal) = input.strip_prefix('\\') {
            return Ok(Self::contains(literal));
        }
        if let Some(rest) = input.strip_prefix('/') {
            if let Some(end) = rest.rfind('/') {
                return Self::regex(&rest[..end], &rest[end + 1..]);
            }
        }
        Ok(Self::contains(input))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextPattern::Contains(needle) => text.to_lowercase().contains(&needle.to_lowercase()),
            TextPattern::Regex { regex, .. } => regex.is_match(text),
        }
    }

    /// The substring, or the `/body/flags` notation of a regex
    pub fn source(&self) -> &str {
        match self {
            TextPattern::Contains(needle) => needle,
            TextPattern::Regex { source, .. } => source,
        }
    }

    /// Notation that parses back to this pattern
    pub fn notation(&self) -> String {
        match self {
            TextPattern::Contains(needle) if needle.starts_with('/') || needle.starts_with('\\') => {
                format!("\\{}", needle)
            }
            other => other.source().to_string(),
        }
    }

    /// True when the rule accepts any text
    pub fn is_trivial(&self) -> bool {
        match self {
            TextPattern::Contains(needle) => needle.trim().is_empty(),
            TextPattern::Regex { source, .. } => source.starts_with("//"),
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextPattern::Contains(needle) => write!(f, "text containing {:?} (any case)", needle),
            TextPattern::Regex { source, .. } => write!(f, "text matching {}", source),
        }
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (TextPattern::Contains(_), TextPattern::Contains(_))
                | (TextPattern::Regex { .. }, TextPattern::Regex { .. })
        ) && self.source() == other.source()
    }
}

impl TryFrom<String> for TextPattern {
    type Error = E2eError;

    fn try_from(value: String) -> E2eResult<Self> {
        Self::parse(&value)
    }
}

impl From<TextPattern> for String {
    fn from(pattern: TextPattern) -> Self {
        pattern.notation()
    }
}

/// Secondary check on persisted browser state, evaluated after the result
/// text has settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuxiliaryCheck {
    /// `localStorage.getItem(key) !== null`
    LocalStorage {
        key: String,
        #[serde(default = "default_expect_present")]
        expect_present: bool,
    },
}

fn default_expect_present() -> bool {
    true
}

impl AuxiliaryCheck {
    pub fn local_storage(key: impl Into<String>, expect_present: bool) -> Self {
        AuxiliaryCheck::LocalStorage {
            key: key.into(),
            expect_present,
        }
    }

    pub fn expect_present(&self) -> bool {
        match self {
            AuxiliaryCheck::LocalStorage { expect_present, .. } => *expect_present,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AuxiliaryCheck::LocalStorage { key, .. } => format!("localStorage[{:?}]", key),
        }
    }
}

impl Scenario {
    /// Substitute the session token into every page-facing string
    ///
    /// Covers the path, selectors, field values, substring patterns and the
    /// storage key. Names and dependencies stay as declared. Regex patterns
    /// cannot carry the placeholder since `{` is regex syntax.
    pub fn bind(&self, identity: &SessionIdentity) -> Self {
        let mut bound = self.clone();
        bound.target_path = identity.expand(&self.target_path);
        for field in &mut bound.fields {
            field.selector = identity.expand(&field.selector);
            field.value = identity.expand(&field.value);
        }
        bound.submit_selector = identity.expand(&self.submit_selector);
        bound.result_selector = identity.expand(&self.result_selector);
        if let TextPattern::Contains(needle) = &self.expect {
            bound.expect = TextPattern::contains(identity.expand(needle));
        }
        if let Some(AuxiliaryCheck::LocalStorage { key, expect_present }) = &self.auxiliary {
            bound.auxiliary = Some(AuxiliaryCheck::local_storage(
                identity.expand(key),
                *expect_present,
            ));
        }
        bound
    }

    /// Check the per-scenario invariants
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name must not be empty".into()));
        }
        if self.fields.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "scenario '{}' declares no fields",
                self.name
            )));
        }
        let selectors = self
            .fields
            .iter()
            .map(|f| f.selector.as_str())
            .chain([self.submit_selector.as_str(), self.result_selector.as_str()]);
        for selector in selectors {
            if selector.trim().is_empty() {
                return Err(E2eError::SpecParse(format!(
                    "scenario '{}' has an empty selector",
                    self.name
                )));
            }
        }
        if self.expect.is_trivial() {
            return Err(E2eError::SpecParse(format!(
                "scenario '{}' has an empty expected pattern",
                self.name
            )));
        }
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl ScenarioSuite {
    pub fn new(name: impl Into<String>, scenarios: Vec<Scenario>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            scenarios,
        }
    }

    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::SpecParse(msg) => E2eError::SpecParse(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Load every suite from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Unique names, dependencies declared earlier in the suite
    pub fn validate(&self) -> E2eResult<()> {
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if let Some(dep) = &scenario.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(E2eError::SpecParse(format!(
                        "scenario '{}' depends on '{}', which is not declared before it",
                        scenario.name, dep
                    )));
                }
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
        }
        Ok(())
    }

    /// Bind every scenario to the session identity
    pub fn bind(&self, identity: &SessionIdentity) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            scenarios: self.scenarios.iter().map(|s| s.bind(identity)).collect(),
        }
    }

    /// Keep scenarios matching `keep` together with everything they depend on
    pub fn retain_with_dependencies<F>(&self, keep: F) -> Self
    where
        F: Fn(&Scenario) -> bool,
    {
        let mut wanted: HashSet<&str> = HashSet::new();
        for scenario in self.scenarios.iter().rev() {
            if keep(scenario) || wanted.contains(scenario.name.as_str()) {
                wanted.insert(scenario.name.as_str());
                if let Some(dep) = &scenario.depends_on {
                    wanted.insert(dep.as_str());
                }
            }
        }

        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            scenarios: self
                .scenarios
                .iter()
                .filter(|s| wanted.contains(s.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Filter by tag, keeping dependencies
    pub fn filter_by_tag(&self, tag: &str) -> Self {
        self.retain_with_dependencies(|s| s.has_tag(tag))
    }

    /// Merge suites into one, preserving order
    pub fn merge(name: impl Into<String>, suites: Vec<Self>) -> E2eResult<Self> {
        let merged = Self::new(name, suites.into_iter().flat_map(|s| s.scenarios).collect());
        merged.validate()?;
        Ok(merged)
    }
}
