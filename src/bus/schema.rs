//! Per-topic payload schemas.
//!
//! A schema is a flat list of field rules. Each rule accepts several aliases
//! because producers name the same field differently (`post_id` vs
//! `content_id`); a rule is satisfied by the first alias present.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::error::SchemaValidationError;
use crate::domain::envelope::EventEnvelope;
use crate::domain::events::{Action, CanonicalKind, FieldAliases};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// A string or a number.
    Id,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Id => value.is_string() || value.is_number(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Id => "string or number",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub names: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldRule {
    pub fn required(names: &'static [&'static str], kind: FieldKind) -> Self {
        Self { names, kind, required: true }
    }

    pub fn optional(names: &'static [&'static str], kind: FieldKind) -> Self {
        Self { names, kind, required: false }
    }

    fn check(&self, object: &Map<String, Value>, errors: &mut Vec<String>) {
        let found = self
            .names
            .iter()
            .find_map(|name| object.get(*name).filter(|v| !v.is_null()).map(|v| (*name, v)));

        match found {
            Some((name, value)) if !self.kind.accepts(value) => errors.push(format!(
                "field '{}' expected {}, found {}",
                name,
                self.kind.name(),
                type_name(value)
            )),
            Some(_) => {}
            None if self.required => errors.push(format!(
                "missing required field '{}'",
                self.names.join("' | '")
            )),
            None => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSchema {
    pub fields: Vec<FieldRule>,
}

impl TopicSchema {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    /// Returns every violation, not just the first.
    pub fn violations(&self, message: &Value) -> Vec<String> {
        let Some(object) = message.as_object() else {
            return vec![format!("payload must be an object, found {}", type_name(message))];
        };
        let mut errors = Vec::new();
        for rule in &self.fields {
            rule.check(object, &mut errors);
        }
        errors
    }

    /// Schema for one domain topic, derived from the entity's field aliases.
    pub fn for_domain_event(kind: CanonicalKind) -> Self {
        let aliases = FieldAliases::for_entity(kind.entity());
        let id = FieldRule::required(aliases.id, FieldKind::Id);

        let fields = match (kind, kind.action()) {
            (_, Action::Deleted) => vec![id],
            (CanonicalKind::UserCreated, _) => vec![
                id,
                FieldRule::required(aliases.title, FieldKind::String),
                FieldRule::optional(aliases.content, FieldKind::String),
            ],
            (_, Action::Created) => vec![
                id,
                FieldRule::required(aliases.content, FieldKind::String),
                FieldRule::optional(aliases.title, FieldKind::String),
                FieldRule::optional(aliases.author, FieldKind::Id),
            ],
            (_, Action::Updated) => vec![
                id,
                FieldRule::optional(aliases.content, FieldKind::String),
                FieldRule::optional(aliases.title, FieldKind::String),
                FieldRule::optional(aliases.author, FieldKind::Id),
            ],
        };
        Self::new(fields)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, TopicSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the schemas of all nine domain topics.
    pub fn with_domain_schemas() -> Self {
        let mut registry = Self::new();
        for kind in CanonicalKind::ALL {
            registry.register(kind.topic(), TopicSchema::for_domain_event(kind));
        }
        registry
    }

    pub fn register(&mut self, topic: impl Into<String>, schema: TopicSchema) {
        self.schemas.insert(topic.into(), schema);
    }

    pub fn get(&self, topic: &str) -> Option<&TopicSchema> {
        self.schemas.get(topic)
    }

    pub fn has_schema(&self, topic: &str) -> bool {
        self.schemas.contains_key(topic)
    }

    /// Validates a message about to be published. Topics without a schema
    /// accept anything.
    pub fn validate(&self, topic: &str, message: &Value) -> Result<(), SchemaValidationError> {
        let Some(schema) = self.get(topic) else {
            return Ok(());
        };
        let errors = schema.violations(message);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError { topic: topic.to_string(), errors })
        }
    }

    /// Validates a consumed message. On a topic with a schema the message
    /// must be a well-formed [`EventEnvelope`] whose payload passes the schema.
    pub fn validate_inbound(&self, topic: &str, value: &Value) -> Result<(), SchemaValidationError> {
        if !self.has_schema(topic) {
            return Ok(());
        }
        match EventEnvelope::from_value(value) {
            Ok(envelope) => self.validate(topic, &envelope.payload),
            Err(e) => Err(SchemaValidationError {
                topic: topic.to_string(),
                errors: vec![format!("malformed event envelope: {e}")],
            }),
        }
    }
}
