//! `NodeTypeRegistry`: the catalog of node kinds a workflow may use.
//!
//! The registry is built once at startup and is read-only afterwards, so it
//! is shared behind an `Arc` without any locking.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, RegistryError};
use crate::schema::{ConfigValue, FieldSpec, FieldType, NodeConfig};

// ---------------------------------------------------------------------------
// NodeCategory
// ---------------------------------------------------------------------------

/// Coarse grouping of node kinds, used for display and workflow previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    InputOutput,
    AiGeneration,
    Processing,
    Integration,
    ControlFlow,
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputOutput => write!(f, "input_output"),
            Self::AiGeneration => write!(f, "ai_generation"),
            Self::Processing => write!(f, "processing"),
            Self::Integration => write!(f, "integration"),
            Self::ControlFlow => write!(f, "control_flow"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeTypeDescriptor
// ---------------------------------------------------------------------------

/// Everything the orchestrator knows about one node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
    #[serde(rename = "type")]
    pub type_id: String,
    pub name: String,
    pub description: String,
    pub category: NodeCategory,
    pub config_schema: Vec<FieldSpec>,
}

impl NodeTypeDescriptor {
    pub fn new(
        type_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: NodeCategory,
        config_schema: Vec<FieldSpec>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            description: description.into(),
            category,
            config_schema,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.config_schema.iter().find(|f| f.name == name)
    }

    /// Check `config` against this type's schema.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found (see its docs for ordering).
    pub fn check_config(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        for (name, value) in config.iter() {
            let spec = self.field(name).ok_or_else(|| ConfigError::UnknownField {
                node_type: self.type_id.clone(),
                field: name.clone(),
            })?;
            if !spec.field_type.accepts(value) {
                return Err(ConfigError::TypeMismatch {
                    field: name.clone(),
                    expected: spec.field_type,
                    found: value.kind(),
                });
            }
        }

        // A default satisfies a required field as well.
        for spec in &self.config_schema {
            if spec.required && !config.contains(&spec.name) && spec.default.is_none() {
                return Err(ConfigError::MissingField {
                    field: spec.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Return `config` with schema defaults filled in for absent fields.
    pub fn effective_config(&self, config: &NodeConfig) -> NodeConfig {
        let mut effective = config.clone();
        for spec in &self.config_schema {
            if let (false, Some(default)) = (effective.contains(&spec.name), &spec.default) {
                effective.insert(spec.name.clone(), default.clone());
            }
        }
        effective
    }
}

// ---------------------------------------------------------------------------
// NodeTypeRegistry
// ---------------------------------------------------------------------------

/// Ordered, indexed collection of [`NodeTypeDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: Vec<NodeTypeDescriptor>,
    index: HashMap<String, usize>,
}

impl NodeTypeRegistry {
    /// An empty registry.  Most callers want [`NodeTypeRegistry::builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.  Re-registering a type id replaces the old
    /// descriptor in place, keeping its position in the listing order.
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        debug!("registering node type '{}'", descriptor.type_id);
        match self.index.get(&descriptor.type_id) {
            Some(&pos) => self.types[pos] = descriptor,
            None => {
                self.index.insert(descriptor.type_id.clone(), self.types.len());
                self.types.push(descriptor);
            }
        }
    }

    /// All node types in registration order.
    pub fn list_node_types(&self) -> &[NodeTypeDescriptor] {
        &self.types
    }

    /// Look up a node type by id.
    ///
    /// # Errors
    /// [`RegistryError::UnknownNodeType`] if nothing is registered under `type_id`.
    pub fn resolve(&self, type_id: &str) -> Result<&NodeTypeDescriptor, RegistryError> {
        self.index
            .get(type_id)
            .map(|&pos| &self.types[pos])
            .ok_or_else(|| RegistryError::UnknownNodeType(type_id.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The content-pipeline node kinds.
    pub fn builtin() -> Self {
        use FieldType::{Boolean, Integer, Number, StringList};
        use NodeCategory::*;

        let text = FieldType::String;
        let mut registry = Self::new();

        registry.register(NodeTypeDescriptor::new(
            "input",
            "Input",
            "Receives the user-supplied input data",
            InputOutput,
            vec![FieldSpec::optional("input_fields", StringList)
                .with_default(ConfigValue::List(vec![]))],
        ));
        registry.register(NodeTypeDescriptor::new(
            "text_generation",
            "Text Generation",
            "Generates text content with a language model",
            AiGeneration,
            vec![
                FieldSpec::required("prompt", text),
                FieldSpec::optional("max_length", Integer).with_default(500i64),
                FieldSpec::optional("temperature", Number).with_default(0.7),
                FieldSpec::optional("model", text).with_default("default"),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "image_generation",
            "Image Generation",
            "Generates an image from a prompt or upstream text",
            AiGeneration,
            vec![
                FieldSpec::optional("prompt", text),
                FieldSpec::optional("style", text).with_default("realistic"),
                FieldSpec::optional("width", Integer).with_default(512i64),
                FieldSpec::optional("height", Integer).with_default(512i64),
                FieldSpec::optional("num_inference_steps", Integer).with_default(20i64),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "music_generation",
            "Music Generation",
            "Generates a music clip from a description or upstream text",
            AiGeneration,
            vec![
                FieldSpec::optional("description", text),
                FieldSpec::optional("duration", Integer).with_default(10i64),
                FieldSpec::optional("temperature", Number).with_default(1.0),
                FieldSpec::optional("style", text).with_default("ambient"),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "content_analysis",
            "Content Analysis",
            "Extracts theme, mood, keywords and sentiment from content",
            Processing,
            vec![
                FieldSpec::optional("content", text),
                FieldSpec::optional("analysis_type", text).with_default("comprehensive"),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "content_optimization",
            "Content Optimization",
            "Rewrites content for a target platform",
            Processing,
            vec![
                FieldSpec::optional("platform", text).with_default("xiaohongshu"),
                FieldSpec::optional("optimization_level", text).with_default("standard"),
                FieldSpec::optional("optimization_type", text),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "platform_publish",
            "Platform Publish",
            "Publishes content to one or more platforms",
            Integration,
            vec![
                FieldSpec::optional("platform", text).with_default("xiaohongshu"),
                FieldSpec::optional("platforms", StringList),
                FieldSpec::optional("auto_publish", Boolean).with_default(false),
                FieldSpec::optional("user_id", Integer).with_default(1i64),
            ],
        ));
        registry.register(NodeTypeDescriptor::new(
            "condition",
            "Condition",
            "Chooses an execution path from a boolean expression",
            ControlFlow,
            vec![FieldSpec::required("condition", text)],
        ));
        registry.register(NodeTypeDescriptor::new(
            "loop",
            "Loop",
            "Repeats downstream work",
            ControlFlow,
            vec![FieldSpec::optional("max_iterations", Integer).with_default(1i64)],
        ));
        registry.register(NodeTypeDescriptor::new(
            "merge",
            "Merge",
            "Combines several upstream results",
            ControlFlow,
            vec![],
        ));
        registry.register(NodeTypeDescriptor::new(
            "output",
            "Output",
            "Emits the final result",
            InputOutput,
            vec![FieldSpec::optional("output_fields", StringList)
                .with_default(ConfigValue::List(vec![]))],
        ));

        registry
    }
}
