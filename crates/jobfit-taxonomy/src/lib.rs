//! Rule-based taxonomy extraction: maps posting title and content text to canonical
//! keyword codes and stack ids.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use jobfit_core::{PostingContent, StackId};
use jobfit_storage::{JobpostStore, StoreError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobfit-taxonomy";

pub const KEYWORD_RULES_FILE: &str = "keywords.yaml";
pub const STACK_RULES_FILE: &str = "stacks.yaml";

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("invalid pattern {pattern:?} in rule {rule}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule {0} has no patterns")]
    EmptyRule(String),
    #[error("serializing structured content: {0}")]
    Content(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
struct KeywordRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct StackRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<StackRule>,
}

/// Keyword rule: any pattern (a case-insensitive regex) tags the posting with
/// `keyword_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword_code: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// Stack rule: any alias found as a whole word tags the posting with the stack whose
/// display name is the first alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRule {
    pub aliases: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl StackRule {
    pub fn canonical_alias(&self) -> Option<&str> {
        self.aliases.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonomyRules {
    pub keywords: Vec<KeywordRule>,
    pub stacks: Vec<StackRule>,
}

impl TaxonomyRules {
    pub fn from_dir(rules_dir: &Path) -> anyhow::Result<Self> {
        let keywords_path = rules_dir.join(KEYWORD_RULES_FILE);
        let stacks_path = rules_dir.join(STACK_RULES_FILE);
        let keywords = std::fs::read_to_string(&keywords_path)
            .with_context(|| format!("reading {}", keywords_path.display()))?;
        let stacks = std::fs::read_to_string(&stacks_path)
            .with_context(|| format!("reading {}", stacks_path.display()))?;
        Self::from_yaml(&keywords, &stacks)
    }

    pub fn from_yaml(keywords_yaml: &str, stacks_yaml: &str) -> anyhow::Result<Self> {
        let keywords: KeywordRulesFile =
            serde_yaml::from_str(keywords_yaml).context("parsing keyword rules")?;
        let stacks: StackRulesFile =
            serde_yaml::from_str(stacks_yaml).context("parsing stack rules")?;
        Ok(Self {
            keywords: keywords.rules,
            stacks: stacks.rules,
        })
    }
}

/// One compiled rule. Matching is a pure function of the input text: exclusions are
/// stripped from a private copy, so nothing carries over between rules.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    excludes: Vec<String>,
    patterns: Vec<Regex>,
}

impl CompiledRule {
    pub fn keyword(rule: &KeywordRule) -> Result<Self, TaxonomyError> {
        let patterns = rule
            .patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| compile(&rule.keyword_code, p, p))
            .collect::<Result<Vec<_>, _>>()?;
        Self::build(&rule.keyword_code, &rule.excludes, patterns)
    }

    pub fn stack(rule: &StackRule) -> Result<Self, TaxonomyError> {
        let name = rule.canonical_alias().unwrap_or_default().to_string();
        let patterns = rule
            .aliases
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| compile(&name, a, &word_bounded(a)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::build(&name, &rule.excludes, patterns)
    }

    fn build(
        name: &str,
        excludes: &[String],
        patterns: Vec<Regex>,
    ) -> Result<Self, TaxonomyError> {
        if patterns.is_empty() {
            return Err(TaxonomyError::EmptyRule(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            excludes: excludes.iter().filter(|e| !e.is_empty()).cloned().collect(),
            patterns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, text: &str) -> bool {
        let scan = strip_exclusions(text, &self.excludes);
        self.patterns.iter().any(|re| re.is_match(&scan))
    }
}

fn compile(rule: &str, pattern: &str, source: &str) -> Result<Regex, TaxonomyError> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|source| TaxonomyError::InvalidPattern {
            rule: rule.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Removes every occurrence of each exclusion, in order. Case-sensitive, literal.
pub fn strip_exclusions<'a>(text: &'a str, excludes: &[String]) -> Cow<'a, str> {
    let mut scan = Cow::Borrowed(text);
    for exclude in excludes {
        if scan.contains(exclude.as_str()) {
            scan = Cow::Owned(scan.replace(exclude.as_str(), ""));
        }
    }
    scan
}

/// Escaped alias wrapped in ASCII word-boundary assertions, so Hangul next to an
/// alias still counts as a boundary.
fn word_bounded(alias: &str) -> String {
    format!(r"(?-u:\b){}(?-u:\b)", regex::escape(alias))
}

#[derive(Debug, Clone)]
struct KeywordEntry {
    rule: CompiledRule,
    keyword_code: Option<String>,
}

#[derive(Debug, Clone)]
struct StackEntry {
    rule: CompiledRule,
    stack_id: Option<StackId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub keyword_codes: BTreeSet<String>,
    pub stack_ids: BTreeSet<StackId>,
}

/// Compiled rules with their canonical identities resolved. Read-only once built.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    keywords: Vec<KeywordEntry>,
    stacks: Vec<StackEntry>,
}

impl Taxonomy {
    /// Compiles every rule and resolves its canonical record through the store.
    /// Rules without a stored counterpart stay in place but never contribute.
    pub async fn resolve(
        rules: &TaxonomyRules,
        store: &dyn JobpostStore,
    ) -> Result<Self, TaxonomyError> {
        let mut keywords = Vec::with_capacity(rules.keywords.len());
        for rule in &rules.keywords {
            let compiled = CompiledRule::keyword(rule)?;
            let keyword_code = store
                .find_keyword_by_code(&rule.keyword_code)
                .await?
                .map(|k| k.keyword_code);
            if keyword_code.is_none() {
                warn!(keyword_code = %rule.keyword_code, "keyword rule does not resolve to a stored keyword");
            }
            keywords.push(KeywordEntry {
                rule: compiled,
                keyword_code,
            });
        }

        let mut stacks = Vec::with_capacity(rules.stacks.len());
        for rule in &rules.stacks {
            let compiled = CompiledRule::stack(rule)?;
            let stack_id = store
                .find_stack_by_canonical_alias(compiled.name())
                .await?
                .map(|s| s.stack_id);
            if stack_id.is_none() {
                warn!(stack = %compiled.name(), "stack rule does not resolve to a stored stack");
            }
            stacks.push(StackEntry {
                rule: compiled,
                stack_id,
            });
        }

        debug!(
            keyword_rules = keywords.len(),
            stack_rules = stacks.len(),
            "taxonomy resolved"
        );
        Ok(Self { keywords, stacks })
    }

    pub fn keyword_rule_count(&self) -> usize {
        self.keywords.len()
    }

    pub fn stack_rule_count(&self) -> usize {
        self.stacks.len()
    }

    pub fn extract(
        &self,
        title: &str,
        content: &PostingContent,
    ) -> Result<Extraction, TaxonomyError> {
        let content = content.to_text()?;
        Ok(self.extract_text(&format!("{title} {content}")))
    }

    pub fn extract_text(&self, text: &str) -> Extraction {
        let mut out = Extraction::default();

        for entry in &self.keywords {
            if !entry.rule.matches(text) {
                continue;
            }
            match &entry.keyword_code {
                Some(code) => {
                    out.keyword_codes.insert(code.clone());
                }
                None => warn!(keyword_code = %entry.rule.name(), "matched keyword rule is unresolved"),
            }
        }

        for entry in &self.stacks {
            if !entry.rule.matches(text) {
                continue;
            }
            match entry.stack_id {
                Some(stack_id) => {
                    out.stack_ids.insert(stack_id);
                }
                None => warn!(stack = %entry.rule.name(), "matched stack rule is unresolved"),
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfit_storage::MemoryStore;

    fn stack_rule(aliases: &[&str], excludes: &[&str]) -> CompiledRule {
        CompiledRule::stack(&StackRule {
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
        })
        .expect("compile")
    }

    fn keyword_rule(code: &str, patterns: &[&str], excludes: &[&str]) -> KeywordRule {
        KeywordRule {
            keyword_code: code.to_string(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn exclusion_blocks_the_broader_pattern() {
        let java = stack_rule(&["Java"], &["JavaScript"]);
        assert!(!java.matches("JavaScript developer"));
        assert!(java.matches("Java developer"));
        assert!(java.matches("JavaScript and Java"));
    }

    #[test]
    fn exclusions_are_case_sensitive() {
        let rule = CompiledRule::keyword(&keyword_rule("BE", &["backend"], &["Backend-ish"]))
            .expect("compile");
        assert!(!rule.matches("Backend-ish role"));
        assert!(rule.matches("backend-ish role"));
    }

    #[test]
    fn stack_aliases_are_word_bounded() {
        let go = stack_rule(&["Go"], &[]);
        assert!(!go.matches("Golang engineer"));
        assert!(!go.matches("going places"));
        assert!(go.matches("Go, Rust"));
        assert!(go.matches("go"));
        assert!(go.matches("Go개발자"));

        let golang = stack_rule(&["Go", "Golang"], &[]);
        assert!(golang.matches("Golang engineer"));
    }

    #[test]
    fn stack_aliases_escape_metacharacters() {
        let node = stack_rule(&["Node.js"], &[]);
        assert!(node.matches("node.js backend"));
        assert!(!node.matches("Nodexjs"));

        let cpp = stack_rule(&["C++"], &[]);
        assert!(!cpp.matches("C"));
        assert!(!cpp.matches("Cxx17"));
    }

    #[test]
    fn boundaries_sit_between_word_and_non_word_characters() {
        // A boundary needs a word character on exactly one side.
        let cpp = stack_rule(&["C++"], &[]);
        assert!(!cpp.matches("C++ developer"));
        assert!(cpp.matches("C++17"));

        let csharp = stack_rule(&["C#"], &[]);
        assert!(!csharp.matches("C# backend"));
        assert!(csharp.matches("C#10"));

        let dotnet = stack_rule(&[".NET"], &[]);
        assert!(dotnet.matches("ASP.NET Core"));
        assert!(!dotnet.matches("with .NET Core"));
    }

    #[test]
    fn alias_matches_after_an_embedded_occurrence() {
        let go = stack_rule(&["Go"], &[]);
        assert!(go.matches("Golang or Go"));
    }

    #[test]
    fn keyword_patterns_are_regexes() {
        let rule = CompiledRule::keyword(&keyword_rule("FE", &["front-?end", "프론트"], &[]))
            .expect("compile");
        assert!(rule.matches("Senior FRONTEND engineer"));
        assert!(rule.matches("프론트엔드 개발자"));
        assert!(!rule.matches("backend"));
    }

    #[test]
    fn invalid_keyword_pattern_fails_at_load() {
        let err = CompiledRule::keyword(&keyword_rule("BAD", &["(unclosed"], &[]))
            .expect_err("invalid regex");
        assert!(matches!(err, TaxonomyError::InvalidPattern { .. }));
        assert!(matches!(
            CompiledRule::keyword(&keyword_rule("EMPTY", &[], &[])),
            Err(TaxonomyError::EmptyRule(_))
        ));
    }

    #[test]
    fn rules_load_from_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(KEYWORD_RULES_FILE),
            "version: 1\nrules:\n  - keyword_code: BE\n    patterns: [backend, 백엔드]\n",
        )
        .expect("write keywords");
        std::fs::write(
            dir.path().join(STACK_RULES_FILE),
            "version: 1\nrules:\n  - aliases: [Java]\n    excludes: [JavaScript]\n  - aliases: [Go, Golang]\n",
        )
        .expect("write stacks");

        let rules = TaxonomyRules::from_dir(dir.path()).expect("load");
        assert_eq!(rules.keywords.len(), 1);
        assert_eq!(rules.keywords[0].patterns, vec!["backend", "백엔드"]);
        assert!(rules.keywords[0].excludes.is_empty());
        assert_eq!(rules.stacks[1].canonical_alias(), Some("Go"));
        assert_eq!(rules.stacks[0].excludes, vec!["JavaScript"]);
    }

    #[test]
    fn missing_rules_file_reports_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TaxonomyRules::from_dir(dir.path()).expect_err("missing");
        assert!(format!("{err:#}").contains(KEYWORD_RULES_FILE));
    }

    #[tokio::test]
    async fn extraction_resolves_through_the_store_and_skips_unresolved_rules() {
        let store = MemoryStore::new();
        store.insert_keyword("BE", "백엔드").await;
        let java = store.insert_stack("Java", "Backend").await;
        let python = store.insert_stack("Python", "Backend").await;

        let rules = TaxonomyRules {
            keywords: vec![
                keyword_rule("BE", &["backend"], &[]),
                keyword_rule("FE", &["frontend"], &[]),
            ],
            stacks: vec![
                StackRule {
                    aliases: vec!["Java".into()],
                    excludes: vec!["JavaScript".into()],
                },
                StackRule {
                    aliases: vec!["Python".into(), "파이썬".into()],
                    excludes: vec![],
                },
                StackRule {
                    aliases: vec!["Kotlin".into()],
                    excludes: vec![],
                },
            ],
        };
        let taxonomy = Taxonomy::resolve(&rules, &store).await.expect("resolve");
        assert_eq!(taxonomy.keyword_rule_count(), 2);
        assert_eq!(taxonomy.stack_rule_count(), 3);

        let content = PostingContent::Structured(serde_json::json!({
            "requirements": "Python, JavaScript, Kotlin, frontend"
        }));
        let out = taxonomy
            .extract("Backend Engineer", &content)
            .expect("extract");
        assert_eq!(out.keyword_codes, BTreeSet::from(["BE".to_string()]));
        assert_eq!(out.stack_ids, BTreeSet::from([python.stack_id]));
        assert!(!out.stack_ids.contains(&java.stack_id));
    }
}
