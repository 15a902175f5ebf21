//! Type conversion between connected fields.
//!
//! A [`TypeResolver`] holds an ordered list of [`TypeConverter`] rules. Identity
//! and widening never consult the rules; otherwise the first rule (in
//! registration order) that accepts the pair is used. At conversion time a rule
//! that fails is skipped and the next applicable rule is tried.

mod multi_hop;
mod rules;

pub use multi_hop::MultiHopConverter;
pub use rules::{
    ArrayTypeConverter, DynamicTypeConverter, JsonTypeConverter, NumericTypeConverter,
    ObjectTypeConverter, StringFormatConverter, StringParseConverter,
};

use crate::{ConversionError, Value, ValueType};
use std::sync::Arc;

/// A pluggable conversion strategy between two field types
pub trait TypeConverter: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Whether the rule may be consulted again while it is itself resolving.
    fn reentrant(&self) -> bool {
        true
    }

    fn can_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        ctx: &ConversionContext<'_>,
    ) -> bool;

    fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
        ctx: &ConversionContext<'_>,
    ) -> Result<Value, ConversionError>;
}

/// Resolution scope handed to rules so they can resolve nested conversions
pub struct ConversionContext<'a> {
    rules: &'a [Arc<dyn TypeConverter>],
    active: Vec<usize>,
}

impl<'a> ConversionContext<'a> {
    fn new(rules: &'a [Arc<dyn TypeConverter>]) -> Self {
        Self {
            rules,
            active: Vec::new(),
        }
    }

    fn scoped(&self, index: usize, rule: &dyn TypeConverter) -> ConversionContext<'a> {
        let mut active = self.active.clone();
        if !rule.reentrant() {
            active.push(index);
        }
        ConversionContext {
            rules: self.rules,
            active,
        }
    }

    fn candidates(&self) -> impl Iterator<Item = (usize, &'a Arc<dyn TypeConverter>)> + '_ {
        let rules: &'a [Arc<dyn TypeConverter>] = self.rules;
        rules
            .iter()
            .enumerate()
            .filter(move |(index, _)| !self.active.contains(index))
    }

    pub fn can_convert(&self, source: &ValueType, target: &ValueType) -> bool {
        if source.is_assignable_to(target) {
            return true;
        }
        self.candidates().any(|(index, rule)| {
            rule.can_convert(source, target, &self.scoped(index, &**rule))
        })
    }

    pub fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
    ) -> Result<Value, ConversionError> {
        if source.is_assignable_to(target) {
            if value.conforms_to(target) {
                return Ok(value.clone());
            }
            // The value does not match its declared type; resolve from what it really is.
            let runtime = value.value_type();
            if runtime != *source {
                return self.try_convert(&runtime, target, value);
            }
        }

        let mut attempts = Vec::new();
        for (index, rule) in self.candidates() {
            let scoped = self.scoped(index, &**rule);
            if !rule.can_convert(source, target, &scoped) {
                continue;
            }
            match rule.try_convert(source, target, value, &scoped) {
                Ok(converted) => return Ok(converted),
                Err(err) => {
                    tracing::debug!(
                        rule = rule.name(),
                        %source,
                        %target,
                        "conversion rule failed, trying next: {}",
                        err.reason
                    );
                    attempts.push(format!("{}: {}", rule.name(), err.reason));
                    attempts.extend(err.attempts);
                }
            }
        }

        let reason = if attempts.is_empty() {
            "no conversion rule applies"
        } else {
            "every applicable conversion rule failed"
        };
        Err(ConversionError::new(source.clone(), target.clone(), reason).with_attempts(attempts))
    }
}

/// Ordered registry of conversion rules
#[derive(Clone)]
pub struct TypeResolver {
    rules: Vec<Arc<dyn TypeConverter>>,
}

impl TypeResolver {
    pub fn builder() -> TypeResolverBuilder {
        TypeResolverBuilder::default()
    }

    /// Resolver that only allows identity and widening
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Resolver with the standard rule stack
    pub fn with_defaults() -> Self {
        Self::builder().defaults().build()
    }

    pub fn context(&self) -> ConversionContext<'_> {
        ConversionContext::new(&self.rules)
    }

    pub fn can_convert(&self, source: &ValueType, target: &ValueType) -> bool {
        self.context().can_convert(source, target)
    }

    pub fn try_convert(
        &self,
        source: &ValueType,
        target: &ValueType,
        value: &Value,
    ) -> Result<Value, ConversionError> {
        self.context().try_convert(source, target, value)
    }

    /// Converts a value using its runtime type as the source type.
    pub fn convert_value(&self, target: &ValueType, value: &Value) -> Result<Value, ConversionError> {
        self.try_convert(&value.value_type(), target, value)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Default)]
pub struct TypeResolverBuilder {
    rules: Vec<Arc<dyn TypeConverter>>,
}

impl TypeResolverBuilder {
    /// Appends a rule; it is consulted after every rule already registered.
    pub fn rule(mut self, rule: impl TypeConverter + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Prepends a rule so it wins over every rule already registered.
    pub fn rule_first(mut self, rule: impl TypeConverter + 'static) -> Self {
        self.rules.insert(0, Arc::new(rule));
        self
    }

    /// Appends the standard rules, most specific first.
    pub fn defaults(self) -> Self {
        self.rule(DynamicTypeConverter)
            .rule(NumericTypeConverter)
            .rule(StringParseConverter)
            .rule(StringFormatConverter)
            .rule(ArrayTypeConverter)
            .rule(ObjectTypeConverter)
            .rule(JsonTypeConverter)
    }

    pub fn build(self) -> TypeResolver {
        TypeResolver { rules: self.rules }
    }
}
