//! Loader steps and chains.
//!
//! A chain is declared left-to-right and executed right-to-left: the chain
//! `[style-loader, css-loader, sass-loader]` runs `sass-loader` first, feeds
//! its output to `css-loader`, and finishes with `style-loader`.

use crate::build::ConfigurationError;
use crate::capability::CapabilityRegistry;
use crate::rules::ModuleRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A typed loader option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    /// Parse a value from the legacy query-string form.
    fn parse(raw: &str) -> Self {
        match raw {
            "true" => OptionValue::Bool(true),
            "false" => OptionValue::Bool(false),
            _ => match raw.parse::<i64>() {
                Ok(n) => OptionValue::Int(n),
                Err(_) => OptionValue::Str(raw.to_string()),
            },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Float(x) => write!(f, "{}", x),
            OptionValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

/// Options passed through to a capability, ordered by key.
pub type LoaderOptions = BTreeMap<String, OptionValue>;

/// Error parsing a loader step specification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepParseError {
    #[error("loader specification '{0}' has no identifier")]
    EmptyIdentifier(String),
    #[error("loader specification '{0}' contains an option without a name")]
    EmptyKey(String),
}

/// A loader step as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// `"name"` or `"name?key=value&flag"`
    Spec(String),
    /// `{ loader = "name", options = { ... } }`
    Table {
        loader: String,
        #[serde(default)]
        options: LoaderOptions,
    },
}

/// One transform invocation: a capability identifier plus its options.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderStep {
    pub identifier: String,
    pub options: LoaderOptions,
}

impl LoaderStep {
    /// Create a step with no options.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), options: LoaderOptions::new() }
    }

    /// Add an option to the step.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse `identifier?key=value&flag` into a step.
    ///
    /// A bare `flag` is `true`; `true`/`false` become booleans and integers
    /// become integers. Everything else is kept as a string.
    pub fn parse(spec: &str) -> Result<Self, StepParseError> {
        let (identifier, query) = match spec.split_once('?') {
            Some((id, query)) => (id.trim(), Some(query)),
            None => (spec.trim(), None),
        };

        if identifier.is_empty() {
            return Err(StepParseError::EmptyIdentifier(spec.to_string()));
        }

        let mut step = LoaderStep::new(identifier);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, OptionValue::parse(value)),
                None => (pair, OptionValue::Bool(true)),
            };
            if key.is_empty() {
                return Err(StepParseError::EmptyKey(spec.to_string()));
            }
            step.options.insert(key.to_string(), value);
        }

        Ok(step)
    }

    /// Build a step from its configuration form.
    ///
    /// In the table form, explicit `options` override any given in a query string.
    pub fn from_config(config: &StepConfig) -> Result<Self, StepParseError> {
        match config {
            StepConfig::Spec(spec) => Self::parse(spec),
            StepConfig::Table { loader, options } => {
                let mut step = Self::parse(loader)?;
                step.options.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(step)
            }
        }
    }
}

impl std::fmt::Display for LoaderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier)?;
        if !self.options.is_empty() {
            let options: Vec<String> =
                self.options.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, "?{}", options.join("&"))?;
        }
        Ok(())
    }
}

/// An ordered sequence of loader steps, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderChain {
    steps: Vec<LoaderStep>,
}

impl LoaderChain {
    pub fn new(steps: Vec<LoaderStep>) -> Self {
        Self { steps }
    }

    /// Steps in declaration order (left to right).
    pub fn steps(&self) -> &[LoaderStep] {
        &self.steps
    }

    /// Steps in execution order (right to left).
    pub fn execution_order(&self) -> impl DoubleEndedIterator<Item = &LoaderStep> {
        self.steps.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Display for LoaderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", steps.join(", "))
    }
}

/// Maps a selected rule to its chain and checks chains against the registry.
pub struct LoaderChainResolver<'a> {
    registry: &'a CapabilityRegistry,
}

impl<'a> LoaderChainResolver<'a> {
    pub fn new(registry: &'a CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// The chain of a rule, unchanged and in declaration order.
    pub fn resolve<'r>(&self, rule: &'r ModuleRule) -> &'r LoaderChain {
        &rule.chain
    }

    /// Check every step of a chain: the identifier must be registered and the
    /// capability must accept the step's options.
    pub fn validate(&self, target: &str, chain: &LoaderChain) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();

        for step in chain.steps() {
            match self.registry.get(&step.identifier) {
                None => errors.push(ConfigurationError::UnknownCapability {
                    target: target.to_string(),
                    identifier: step.identifier.clone(),
                }),
                Some(capability) => {
                    if let Err(message) = capability.check_options(&step.options) {
                        errors.push(ConfigurationError::InvalidOptions {
                            target: target.to_string(),
                            identifier: step.identifier.clone(),
                            message,
                        });
                    }
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PathPattern;

    #[test]
    fn test_parse_plain_identifier() {
        let step = LoaderStep::parse("css-loader").unwrap();
        assert_eq!(step.identifier, "css-loader");
        assert!(step.options.is_empty());
    }

    #[test]
    fn test_parse_query_options() {
        let step = LoaderStep::parse("url-loader?limit=10000&mimetype=application/font-woff")
            .unwrap();
        assert_eq!(step.identifier, "url-loader");
        assert_eq!(step.options.get("limit"), Some(&OptionValue::Int(10000)));
        assert_eq!(
            step.options.get("mimetype"),
            Some(&OptionValue::Str("application/font-woff".to_string()))
        );
    }

    #[test]
    fn test_parse_boolean_and_flag_options() {
        let step = LoaderStep::parse("elm-webpack-loader?verbose=true&debug").unwrap();
        assert_eq!(step.options.get("verbose"), Some(&OptionValue::Bool(true)));
        assert_eq!(step.options.get("debug"), Some(&OptionValue::Bool(true)));
    }

    #[test]
    fn test_parse_keeps_placeholders() {
        let step = LoaderStep::parse("file-loader?name=[name].[ext]").unwrap();
        assert_eq!(step.options.get("name"), Some(&OptionValue::Str("[name].[ext]".to_string())));
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(
            LoaderStep::parse("?limit=1"),
            Err(StepParseError::EmptyIdentifier("?limit=1".to_string()))
        );
        assert_eq!(
            LoaderStep::parse("url-loader?=5"),
            Err(StepParseError::EmptyKey("url-loader?=5".to_string()))
        );
    }

    #[test]
    fn test_from_config_table_overrides_query() {
        let mut options = LoaderOptions::new();
        options.insert("limit".to_string(), OptionValue::Int(20));
        let config = StepConfig::Table { loader: "url-loader?limit=10".to_string(), options };

        let step = LoaderStep::from_config(&config).unwrap();
        assert_eq!(step.options.get("limit"), Some(&OptionValue::Int(20)));
    }

    #[test]
    fn test_display_roundtrips_readably() {
        let step = LoaderStep::new("url-loader").with_option("limit", 10000i64);
        assert_eq!(step.to_string(), "url-loader?limit=10000");
    }

    #[test]
    fn test_execution_order_is_right_to_left() {
        let chain = LoaderChain::new(vec![
            LoaderStep::new("style-loader"),
            LoaderStep::new("css-loader"),
            LoaderStep::new("sass-loader"),
        ]);

        let declared: Vec<&str> = chain.steps().iter().map(|s| s.identifier.as_str()).collect();
        let executed: Vec<&str> = chain.execution_order().map(|s| s.identifier.as_str()).collect();

        assert_eq!(declared, vec!["style-loader", "css-loader", "sass-loader"]);
        assert_eq!(executed, vec!["sass-loader", "css-loader", "style-loader"]);
    }

    #[test]
    fn test_resolver_returns_rule_chain() {
        let registry = CapabilityRegistry::with_builtins();
        let chain = LoaderChain::new(vec![LoaderStep::new("css-loader")]);
        let rule = ModuleRule::new(PathPattern::regex(r"\.css$").unwrap(), chain.clone());

        let resolver = LoaderChainResolver::new(&registry);
        assert_eq!(resolver.resolve(&rule), &chain);
    }

    #[test]
    fn test_resolver_rejects_unknown_capability() {
        let registry = CapabilityRegistry::with_builtins();
        let chain = LoaderChain::new(vec![
            LoaderStep::new("css-loader"),
            LoaderStep::new("postcss-loader"),
        ]);

        let errors = LoaderChainResolver::new(&registry).validate("dist", &chain);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigurationError::UnknownCapability { identifier, .. } if identifier == "postcss-loader"
        ));
    }

    #[test]
    fn test_resolver_rejects_unknown_option() {
        let registry = CapabilityRegistry::with_builtins();
        let chain =
            LoaderChain::new(vec![LoaderStep::new("url-loader").with_option("limt", 10i64)]);

        let errors = LoaderChainResolver::new(&registry).validate("dist", &chain);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ConfigurationError::InvalidOptions { .. }));
    }
}
