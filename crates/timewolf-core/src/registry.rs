//! Tag → decoder registry for attribute containers.

use crate::container::{split_envelope, AttributeContainer, CustomContainer};
use crate::containers::{catalog_decoders, Payload};
use crate::error::ContainerError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type DecodeFn = Arc<dyn Fn(Value) -> Result<Payload, ContainerError> + Send + Sync>;

/// Maps container tags to decoders from JSON fields.
#[derive(Clone)]
pub struct ContainerRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::with_catalog()
    }
}

impl ContainerRegistry {
    /// A registry that knows no tags.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// A registry preloaded with every catalog variant.
    pub fn with_catalog() -> Self {
        let mut registry = Self::empty();
        for (tag, decode) in catalog_decoders() {
            registry.decoders.insert(
                tag.to_string(),
                Arc::new(move |fields| decode(fields).map_err(|e| ContainerError::decode(tag, e))),
            );
        }
        registry
    }

    /// Registers a decoder for a new tag. Existing tags cannot be replaced.
    pub fn register<F>(&mut self, tag: impl Into<String>, decoder: F) -> Result<(), ContainerError>
    where
        F: Fn(Value) -> Result<Payload, ContainerError> + Send + Sync + 'static,
    {
        let tag = tag.into();
        if self.decoders.contains_key(&tag) {
            return Err(ContainerError::DuplicateType(tag));
        }
        self.decoders.insert(tag, Arc::new(decoder));
        Ok(())
    }

    /// Registers a tag whose fields are kept as an opaque JSON body.
    pub fn register_custom(&mut self, tag: impl Into<String>) -> Result<(), ContainerError> {
        let tag = tag.into();
        let owned = tag.clone();
        self.register(tag, move |body| {
            Ok(Payload::Custom(CustomContainer {
                tag: owned.clone(),
                body,
            }))
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.decoders.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }

    pub fn decode(&self, tag: &str, fields: Value) -> Result<AttributeContainer, ContainerError> {
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| ContainerError::UnknownType(tag.to_string()))?;
        decoder(fields).map(AttributeContainer::from_payload)
    }

    /// Decodes the `{type, metadata, fields}` form produced by
    /// [`AttributeContainer::to_json`].
    pub fn decode_envelope(&self, envelope: Value) -> Result<AttributeContainer, ContainerError> {
        let (tag, metadata, fields) = split_envelope(envelope)?;
        let mut container = self.decode(&tag, fields)?;
        container.set_metadata(metadata);
        Ok(container)
    }
}
