use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use typeflow_core::{
    InputOperation, Operation, OperationId, OutputOperation, RegistryError, ValueType,
};

/// Factory trait for constructing one variant of a polymorphic family
pub trait VariantFactory<T>: Send + Sync {
    /// Tag identifying the variant in documents
    fn discriminant(&self) -> &str;

    /// Build the variant from the document fields (everything except the tag).
    fn create(&self, fields: serde_json::Value) -> Result<T, String>;

    /// Optional: descriptive metadata for tooling. Never consulted during execution.
    fn metadata(&self) -> VariantMetadata {
        VariantMetadata::default()
    }
}

/// Metadata about a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMetadata {
    pub display_name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub fields: Vec<FieldDocumentation>,
}

pub type OperationMetadata = VariantMetadata;

impl Default for VariantMetadata {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            description: String::new(),
            category: "general".to_string(),
            hidden: false,
            fields: Vec::new(),
        }
    }
}

impl VariantMetadata {
    pub fn new(display_name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn field(mut self, field: FieldDocumentation) -> Self {
        self.fields.push(field);
        self
    }
}

/// Documentation of one configurable field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDocumentation {
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldDocumentation {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        description: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// A factory that deserializes its fields into a config struct `C` and
/// builds the variant from it.
pub struct ConfigFactory<C, T> {
    discriminant: &'static str,
    metadata: VariantMetadata,
    build: fn(C) -> Result<T, String>,
    _config: PhantomData<fn() -> C>,
}

impl<C, T> ConfigFactory<C, T> {
    pub fn new(discriminant: &'static str, build: fn(C) -> Result<T, String>) -> Self {
        Self {
            discriminant,
            metadata: VariantMetadata::default(),
            build,
            _config: PhantomData,
        }
    }

    pub fn with_metadata(mut self, metadata: VariantMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<C: DeserializeOwned, T> VariantFactory<T> for ConfigFactory<C, T> {
    fn discriminant(&self) -> &str {
        self.discriminant
    }

    fn create(&self, fields: serde_json::Value) -> Result<T, String> {
        let config: C = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        (self.build)(config)
    }

    fn metadata(&self) -> VariantMetadata {
        self.metadata.clone()
    }
}

/// Maps discriminant strings of one family to variant factories
pub struct DiscriminantRegistry<T> {
    family: String,
    factories: BTreeMap<String, Arc<dyn VariantFactory<T>>>,
    aliases: BTreeMap<String, String>,
}

/// Registry of available operation kinds
pub type OperationRegistry = DiscriminantRegistry<Arc<dyn Operation>>;

impl<T> DiscriminantRegistry<T> {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            factories: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Register a variant factory. Discriminants must be unique within the family.
    pub fn register(&mut self, factory: Arc<dyn VariantFactory<T>>) -> Result<(), RegistryError> {
        let discriminant = factory.discriminant().to_string();
        if self.factories.contains_key(&discriminant) || self.aliases.contains_key(&discriminant) {
            return Err(RegistryError::DuplicateDiscriminant {
                family: self.family.clone(),
                discriminant,
            });
        }
        tracing::debug!("Registering {} discriminant: {}", self.family, discriminant);
        self.factories.insert(discriminant, factory);
        Ok(())
    }

    /// Register an alternative tag for an already registered discriminant.
    pub fn register_alias(
        &mut self,
        alias: impl Into<String>,
        discriminant: &str,
    ) -> Result<(), RegistryError> {
        let alias = alias.into();
        if !self.factories.contains_key(discriminant) {
            return Err(self.unknown(discriminant));
        }
        if self.factories.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(RegistryError::DuplicateDiscriminant {
                family: self.family.clone(),
                discriminant: alias,
            });
        }
        self.aliases.insert(alias, discriminant.to_string());
        Ok(())
    }

    pub fn contains(&self, discriminant: &str) -> bool {
        self.factory(discriminant).is_ok()
    }

    /// The factory registered under a discriminant or one of its aliases.
    pub fn factory(&self, discriminant: &str) -> Result<&Arc<dyn VariantFactory<T>>, RegistryError> {
        let canonical = self
            .aliases
            .get(discriminant)
            .map(String::as_str)
            .unwrap_or(discriminant);
        self.factories
            .get(canonical)
            .ok_or_else(|| self.unknown(discriminant))
    }

    /// Construct a variant from its discriminant and document fields.
    pub fn create(&self, discriminant: &str, fields: serde_json::Value) -> Result<T, RegistryError> {
        self.factory(discriminant)?
            .create(fields)
            .map_err(|reason| RegistryError::InvalidFields {
                family: self.family.clone(),
                discriminant: discriminant.to_string(),
                reason,
            })
    }

    /// Canonical discriminants, sorted.
    pub fn discriminants(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    pub fn metadata(&self, discriminant: &str) -> Option<VariantMetadata> {
        self.factory(discriminant).ok().map(|f| f.metadata())
    }

    fn unknown(&self, discriminant: &str) -> RegistryError {
        RegistryError::UnknownDiscriminant {
            family: self.family.clone(),
            discriminant: discriminant.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BoundaryConfig {
    id: OperationId,
    name: String,
    #[serde(rename = "type", default = "any_type")]
    ty: ValueType,
    #[serde(default)]
    description: Option<String>,
}

fn any_type() -> ValueType {
    ValueType::Any
}

impl DiscriminantRegistry<Arc<dyn Operation>> {
    /// Operation registry holding the workflow boundary operations.
    ///
    /// Nested `workflow` documents are resolved by the document loader, which
    /// needs the registry itself to build the inner graph.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("operation");
        let builtins: [Arc<dyn VariantFactory<Arc<dyn Operation>>>; 2] = [
            Arc::new(
                ConfigFactory::new(InputOperation::DISCRIMINANT, |c: BoundaryConfig| {
                    let mut op = InputOperation::new(c.id, c.name, c.ty);
                    if let Some(description) = c.description {
                        op = op.with_description(description);
                    }
                    Ok(Arc::new(op) as Arc<dyn Operation>)
                })
                .with_metadata(
                    VariantMetadata::new("Workflow Input", "workflow")
                        .description("Reads a named external input of the job")
                        .field(FieldDocumentation::required("name", "External input name"))
                        .field(FieldDocumentation::optional(
                            "type",
                            "Value type",
                            serde_json::json!("any"),
                        )),
                ),
            ),
            Arc::new(
                ConfigFactory::new(OutputOperation::DISCRIMINANT, |c: BoundaryConfig| {
                    let mut op = OutputOperation::new(c.id, c.name, c.ty);
                    if let Some(description) = c.description {
                        op = op.with_description(description);
                    }
                    Ok(Arc::new(op) as Arc<dyn Operation>)
                })
                .with_metadata(
                    VariantMetadata::new("Workflow Output", "workflow")
                        .description("Writes a named external output of the job")
                        .field(FieldDocumentation::required("name", "External output name"))
                        .field(FieldDocumentation::optional(
                            "type",
                            "Value type",
                            serde_json::json!("any"),
                        )),
                ),
            ),
        ];
        for factory in builtins {
            // Fresh registry, tags are distinct
            let _ = registry.register(factory);
        }
        registry
    }
}

impl Default for DiscriminantRegistry<Arc<dyn Operation>> {
    fn default() -> Self {
        Self::with_builtins()
    }
}
