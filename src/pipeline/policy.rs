//! Compiled content policies applied to every decoded message.
//!
//! **Order invariant:** approval is evaluated on the unmasked message and
//! masking only runs on messages that passed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::approval::{ApprovalBuilder, ApprovalFn};
use crate::config::ConsumerConfig;
use crate::error::ConfigError;
use crate::masking::{MaskBuilder, MaskFn, Schema};
use crate::pipeline::types::{Message, Package};

/// Upper bound on distinct schemas whose masks are kept compiled.
const MAX_CACHED_MASKS: usize = 64;

/// Approval predicate plus mask compiler, with masks cached per schema.
pub struct PolicySet {
    approval: ApprovalFn,
    masks: MaskBuilder,
    /// Mask for packages that carry no schema of their own.
    fallback: MaskFn,
    cache: HashMap<u64, MaskFn>,
}

/// Outcome counts for one package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageStats {
    pub emitted: usize,
    pub rejected: usize,
}

impl PolicySet {
    pub fn new(approval: ApprovalFn, masks: MaskBuilder) -> Self {
        Self {
            approval,
            masks,
            fallback: MaskFn::passthrough(),
            cache: HashMap::new(),
        }
    }

    /// Compile both policies from configuration. Fails fast on any invalid key.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self, ConfigError> {
        let approval = ApprovalBuilder::compile(&config.approval())?;
        let masks = MaskBuilder::from_config(config)?;
        Ok(Self::new(approval, masks))
    }

    /// Mask schema-less packages with `schema` instead of passing them through.
    pub fn with_default_schema(mut self, schema: &Schema) -> Self {
        self.fallback = self.masks.compile(schema);
        self
    }

    pub fn approval(&self) -> &ApprovalFn {
        &self.approval
    }

    pub fn mask_builder(&self) -> &MaskBuilder {
        &self.masks
    }

    /// The mask for a package schema, compiling it on first sight.
    pub fn mask_for(&mut self, schema: Option<&Arc<Schema>>) -> MaskFn {
        let Some(schema) = schema else {
            return self.fallback.clone();
        };

        if let Some(mask) = self.cache.get(&schema.fingerprint()) {
            return mask.clone();
        }
        if self.cache.len() >= MAX_CACHED_MASKS {
            debug!(cached = self.cache.len(), "Mask cache full, clearing");
            self.cache.clear();
        }
        let mask = self.masks.compile(schema);
        self.cache.insert(schema.fingerprint(), mask.clone());
        mask
    }

    /// Approve then mask a single message. `None` means it was filtered out.
    pub fn apply(&self, mask: &MaskFn, message: &Message) -> Option<Message> {
        if !self.approval.approves(message) {
            return None;
        }
        Some(mask.apply(message))
    }

    /// Rewrite a package's messages in place, keeping its broker metadata.
    pub fn apply_package(&mut self, package: &mut Package) -> PackageStats {
        let mask = self.mask_for(package.schema.as_ref());
        let before = package.messages.len();
        let messages = std::mem::take(&mut package.messages);
        package.messages = messages
            .iter()
            .filter_map(|message| self.apply(&mask, message))
            .collect();

        PackageStats {
            emitted: package.messages.len(),
            rejected: before - package.messages.len(),
        }
    }
}
