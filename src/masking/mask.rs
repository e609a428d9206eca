//! Mask compilation: schema + emit level → pure message transform.
//!
//! Every retention decision is made once, in [`MaskBuilder::compile`]. The
//! resulting [`MaskFn`] only walks the message and copies the keys its plan
//! allows; it never inspects annotations or the emit level again.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ConsumerConfig;
use crate::error::{ConfigError, SchemaError};
use crate::masking::schema::{FieldDef, Schema, Sensitivity};
use crate::masking::taxonomy::{EmitLevel, Taxonomy};
use crate::pipeline::types::Message;

/// What to do with one schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldPlan {
    Keep,
    Drop,
    Nested(MaskPlan),
}

/// Per-key plan for one object level. Keys absent from the plan are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MaskPlan {
    fields: HashMap<String, FieldPlan>,
}

impl MaskPlan {
    fn apply(&self, input: &Message) -> Message {
        let mut out = Message::new();
        for (key, value) in input {
            match self.fields.get(key) {
                None | Some(FieldPlan::Keep) => {
                    out.insert(key.clone(), value.clone());
                }
                Some(FieldPlan::Drop) => {}
                Some(FieldPlan::Nested(plan)) => {
                    out.insert(key.clone(), plan.apply_value(value));
                }
            }
        }
        out
    }

    /// Mask a record-typed value. The value itself is never removed: objects
    /// keep their key even when every child is masked, and array elements
    /// keep their position.
    fn apply_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => Value::Object(self.apply(obj)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.apply_value(item)).collect())
            }
            other => other.clone(),
        }
    }

    fn retained(&self) -> usize {
        self.fields
            .values()
            .filter(|p| !matches!(p, FieldPlan::Drop))
            .count()
    }
}

/// A compiled mask. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct MaskFn {
    plan: Arc<MaskPlan>,
}

impl MaskFn {
    /// A mask that retains everything (used for schema-less messages).
    pub fn passthrough() -> Self {
        Self {
            plan: Arc::new(MaskPlan::default()),
        }
    }

    /// Produce the masked copy of `message`.
    pub fn apply(&self, message: &Message) -> Message {
        self.plan.apply(message)
    }
}

/// Compiles masks for a fixed emit level and taxonomy.
#[derive(Debug, Clone)]
pub struct MaskBuilder {
    emit_level: EmitLevel,
    taxonomy: Arc<Taxonomy>,
}

impl MaskBuilder {
    pub fn new(emit_level: EmitLevel, taxonomy: Arc<Taxonomy>) -> Result<Self, ConfigError> {
        if matches!(emit_level, EmitLevel::Numeric(_)) && !taxonomy.is_empty() {
            return Err(ConfigError::invalid(
                "masking_emit_level",
                "numeric level given while a category taxonomy is configured",
            ));
        }
        Ok(Self {
            emit_level,
            taxonomy,
        })
    }

    /// Build from the `masking_*` keys of a consumer configuration.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self, ConfigError> {
        let taxonomy = Arc::new(config.taxonomy());
        let emit_level = EmitLevel::from_setting(&config.masking_emit_level, &taxonomy)?;
        Self::new(emit_level, taxonomy)
    }

    pub fn emit_level(&self) -> &EmitLevel {
        &self.emit_level
    }

    /// Compile the mask for `schema`.
    pub fn compile(&self, schema: &Schema) -> MaskFn {
        let mut plan = self.plan_fields(schema.fields());
        for id_field in schema.identity_fields() {
            if let Some(entry) = plan.fields.get_mut(id_field) {
                if *entry == FieldPlan::Drop {
                    *entry = FieldPlan::Keep;
                }
            }
        }

        debug!(
            schema = schema.name().unwrap_or("<unnamed>"),
            emit_level = %self.emit_level,
            retained = plan.retained(),
            declared = schema.fields().len(),
            "Compiled mask"
        );

        MaskFn {
            plan: Arc::new(plan),
        }
    }

    /// Parse a schema document and compile its mask in one step.
    pub fn compile_value(&self, schema: &Value) -> Result<MaskFn, SchemaError> {
        Ok(self.compile(&Schema::from_value(schema)?))
    }

    fn plan_fields(&self, fields: &[FieldDef]) -> MaskPlan {
        let fields = fields
            .iter()
            .map(|field| {
                // Record annotations never cascade onto their children.
                let plan = if field.is_record() {
                    FieldPlan::Nested(self.plan_fields(&field.fields))
                } else if self.retains(&field.sensitivity) {
                    FieldPlan::Keep
                } else {
                    FieldPlan::Drop
                };
                (field.name.clone(), plan)
            })
            .collect();
        MaskPlan { fields }
    }

    fn retains(&self, sensitivity: &Sensitivity) -> bool {
        if !sensitivity.is_annotated() {
            return true;
        }

        match &self.emit_level {
            // Category-only fields have no numeric rank and stay masked.
            EmitLevel::Numeric(max) => sensitivity.level.is_some_and(|level| level <= *max),
            EmitLevel::Categorical(emit_label) => {
                let max = self.taxonomy.index_of(emit_label);
                match (&sensitivity.category, sensitivity.level) {
                    (Some(label), _) => match self.taxonomy.index_of(label) {
                        Some(rank) => max.is_some_and(|max| rank <= max),
                        // Unknown labels only match themselves, literally.
                        None => label == emit_label,
                    },
                    (None, Some(level)) => {
                        max.is_some_and(|max| usize::try_from(level).is_ok_and(|l| l <= max))
                    }
                    (None, None) => true,
                }
            }
        }
    }
}
