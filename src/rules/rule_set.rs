//! Module rules and first-match-wins rule sets.

use crate::build::ConfigurationError;
use crate::config::{ExtractConfig, RuleConfig};
use crate::rules::{matches, LoaderChain, LoaderStep, PathPattern};

/// Where the output of a matched file goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Inline into the entry bundle
    #[default]
    Inline,
    /// Divert into the target's only extraction sink
    DefaultSink,
    /// Divert into the named extraction sink
    Sink(String),
}

impl From<&ExtractConfig> for ExtractMode {
    fn from(config: &ExtractConfig) -> Self {
        match config {
            ExtractConfig::Flag(false) => ExtractMode::Inline,
            ExtractConfig::Flag(true) => ExtractMode::DefaultSink,
            ExtractConfig::Sink(name) => ExtractMode::Sink(name.clone()),
        }
    }
}

/// A pattern-plus-exclusion test paired with a transform chain.
#[derive(Debug, Clone)]
pub struct ModuleRule {
    /// Inclusion test
    pub test: PathPattern,
    /// Exclusions; any match skips the rule
    pub exclude: Vec<PathPattern>,
    /// Transform chain, in declaration order
    pub chain: LoaderChain,
    /// Never follow dependencies reported for matched files
    pub opaque: bool,
    /// Inline or extraction routing
    pub extract: ExtractMode,
}

impl ModuleRule {
    /// Create an inline, non-opaque rule with no exclusions.
    pub fn new(test: PathPattern, chain: LoaderChain) -> Self {
        Self { test, exclude: vec![], chain, opaque: false, extract: ExtractMode::Inline }
    }

    pub fn with_exclude(mut self, pattern: PathPattern) -> Self {
        self.exclude.push(pattern);
        self
    }

    pub fn with_opaque(mut self, opaque: bool) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_extract(mut self, extract: ExtractMode) -> Self {
        self.extract = extract;
        self
    }

    /// Whether this rule claims the given logical path.
    pub fn matches(&self, path: &str) -> bool {
        matches(path, &self.test, &self.exclude)
    }

    /// Whether matched content is diverted to an extraction sink.
    pub fn is_extracting(&self) -> bool {
        self.extract != ExtractMode::Inline
    }

    /// Compile a rule from configuration.
    pub fn from_config(target: &str, config: &RuleConfig) -> Result<Self, Vec<ConfigurationError>> {
        let mut errors = Vec::new();
        let pattern_error = |source| ConfigurationError::Pattern { target: target.to_string(), source };

        let test = PathPattern::from_config(&config.test).map_err(pattern_error);
        let mut exclude = Vec::new();
        for pattern in config.exclude.iter() {
            match PathPattern::from_config(pattern) {
                Ok(p) => exclude.push(p),
                Err(e) => errors.push(pattern_error(e)),
            }
        }

        let mut steps = Vec::new();
        for step in config.chain.iter() {
            match LoaderStep::from_config(step) {
                Ok(s) => steps.push(s),
                Err(source) => errors
                    .push(ConfigurationError::LoaderSpec { target: target.to_string(), source }),
            }
        }

        match test {
            Ok(test) if errors.is_empty() => Ok(Self {
                test,
                exclude,
                chain: LoaderChain::new(steps),
                opaque: config.opaque,
                extract: ExtractMode::from(&config.extract),
            }),
            Ok(_) => Err(errors),
            Err(e) => {
                errors.insert(0, e);
                Err(errors)
            }
        }
    }
}

/// Ordered rules; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct ModuleRuleSet {
    rules: Vec<ModuleRule>,
}

impl ModuleRuleSet {
    pub fn new(rules: Vec<ModuleRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: ModuleRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ModuleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Select the rule for a path. `None` means the file is copied verbatim.
    pub fn resolve(&self, path: &str) -> Option<&ModuleRule> {
        self.resolve_indexed(path).map(|(_, rule)| rule)
    }

    /// Like [`resolve`](Self::resolve), also returning the rule's declaration index.
    pub fn resolve_indexed(&self, path: &str) -> Option<(usize, &ModuleRule)> {
        self.rules.iter().enumerate().find(|(_, rule)| rule.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(test: &str, loader: &str) -> ModuleRule {
        ModuleRule::new(
            PathPattern::regex(test).unwrap(),
            LoaderChain::new(vec![LoaderStep::new(loader)]),
        )
    }

    fn loader_of(rule: Option<&ModuleRule>) -> Option<&str> {
        rule.map(|r| r.chain.steps()[0].identifier.as_str())
    }

    #[test]
    fn test_first_match_wins_over_specificity() {
        let set = ModuleRuleSet::new(vec![
            rule(r"\.(ttf|eot|svg|woff|woff2)(\?v=[0-9]\.[0-9]\.[0-9])?$", "file-loader"),
            rule(r"\.woff(2)?(\?v=[0-9]\.[0-9]\.[0-9])?$", "url-loader"),
        ]);

        assert_eq!(loader_of(set.resolve("fonts/a.woff2?v=4.7.0")), Some("file-loader"));
    }

    #[test]
    fn test_specific_rule_declared_first() {
        let set = ModuleRuleSet::new(vec![
            rule(r"\.woff(2)?(\?v=[0-9]\.[0-9]\.[0-9])?$", "url-loader"),
            rule(r"\.(ttf|eot|svg|woff|woff2)(\?v=[0-9]\.[0-9]\.[0-9])?$", "file-loader"),
        ]);

        assert_eq!(loader_of(set.resolve("fonts/a.woff2?v=4.7.0")), Some("url-loader"));
        assert_eq!(loader_of(set.resolve("fonts/a.ttf")), Some("file-loader"));
    }

    #[test]
    fn test_excluded_rule_falls_through() {
        let set = ModuleRuleSet::new(vec![
            rule(r"\.html$", "file-loader").with_exclude(PathPattern::regex("node_modules").unwrap()),
            rule(r"\.html$", "raw-loader"),
        ]);

        assert_eq!(loader_of(set.resolve("src/index.html")), Some("file-loader"));
        assert_eq!(loader_of(set.resolve("node_modules/pkg/index.html")), Some("raw-loader"));
    }

    #[test]
    fn test_no_match_is_none() {
        let set = ModuleRuleSet::new(vec![rule(r"\.css$", "css-loader")]);
        assert!(set.resolve("src/index.js").is_none());
        assert!(ModuleRuleSet::default().resolve("anything").is_none());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let set = ModuleRuleSet::new(vec![
            rule(r"\.s?css$", "css-loader"),
            rule(r"\.scss$", "sass-loader"),
        ]);

        let first = set.resolve_indexed("main.scss").map(|(i, _)| i);
        for _ in 0..20 {
            assert_eq!(set.resolve_indexed("main.scss").map(|(i, _)| i), first);
        }
        assert_eq!(first, Some(0));
    }

    #[test]
    fn test_extract_mode_from_config() {
        assert_eq!(ExtractMode::from(&ExtractConfig::Flag(false)), ExtractMode::Inline);
        assert_eq!(ExtractMode::from(&ExtractConfig::Flag(true)), ExtractMode::DefaultSink);
        assert_eq!(
            ExtractMode::from(&ExtractConfig::Sink("styles".to_string())),
            ExtractMode::Sink("styles".to_string())
        );
    }

    #[test]
    fn test_from_config_collects_errors() {
        let config: RuleConfig = toml::from_str(
            r#"
test = '(broken'
exclude = ['[also-broken']
use = ["?x=1"]
"#,
        )
        .unwrap();

        let errors = ModuleRule::from_config("dist", &config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ConfigurationError::Pattern { .. }));
        assert!(matches!(errors[2], ConfigurationError::LoaderSpec { .. }));
    }

    #[test]
    fn test_from_config_builds_rule() {
        let config: RuleConfig = toml::from_str(
            r#"
test = '\.elm$'
exclude = ['elm-stuff', 'node_modules']
loader = 'elm-webpack-loader?verbose=true&debug=true'
opaque = true
"#,
        )
        .unwrap();

        let rule = ModuleRule::from_config("dist", &config).unwrap();
        assert!(rule.opaque);
        assert_eq!(rule.exclude.len(), 2);
        assert_eq!(rule.chain.len(), 1);
        assert!(rule.matches("src/Main.elm"));
        assert!(!rule.matches("elm-stuff/Main.elm"));
    }
}
