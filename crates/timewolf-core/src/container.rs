//! Attribute containers: tagged records exchanged between modules.
//!
//! A container is a [`Payload`] variant plus a free-form metadata map. The
//! variant fixes the type tag for the container's whole life; fields of the
//! variant may be edited in place through a [`ContainerHandle`].

use crate::containers::Payload;
use crate::error::ContainerError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Small scalar stored in a container's metadata slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Implemented by every catalog variant; ties a Rust type to its static tag.
pub trait ContainerKind: Clone + Send + Sync + 'static {
    const TYPE_TAG: &'static str;

    fn into_payload(self) -> Payload;
    fn from_payload(payload: &Payload) -> Option<&Self>;
    fn from_payload_mut(payload: &mut Payload) -> Option<&mut Self>;
}

/// Container whose tag is only known at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomContainer {
    pub tag: String,
    #[serde(default)]
    pub body: Value,
}

impl fmt::Display for CustomContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeContainer {
    metadata: Metadata,
    payload: Payload,
}

impl AttributeContainer {
    pub fn new<T: ContainerKind>(value: T) -> Self {
        Self::from_payload(value.into_payload())
    }

    pub fn from_payload(payload: Payload) -> Self {
        Self {
            metadata: Metadata::new(),
            payload,
        }
    }

    pub fn custom(tag: impl Into<String>, body: Value) -> Self {
        Self::from_payload(Payload::Custom(CustomContainer {
            tag: tag.into(),
            body,
        }))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn type_tag(&self) -> &str {
        self.payload.type_tag()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get<T: ContainerKind>(&self) -> Option<&T> {
        T::from_payload(&self.payload)
    }

    /// Mutable access to the variant fields. The variant itself cannot be
    /// swapped, so the tag stays fixed.
    pub fn get_mut<T: ContainerKind>(&mut self) -> Option<&mut T> {
        T::from_payload_mut(&mut self.payload)
    }

    pub fn is<T: ContainerKind>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Encodes as `{"type": tag, "metadata": {...}, "fields": {...}}`.
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.type_tag(),
            "metadata": self.metadata,
            "fields": self.payload.fields(),
        })
    }

    pub(crate) fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }
}

impl fmt::Display for AttributeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.payload, f)
    }
}

/// Shared reference to a stored container.
///
/// Equality is identity: two handles are equal only when they point at the
/// same container, whatever the field values.
#[derive(Clone)]
pub struct ContainerHandle {
    tag: Arc<str>,
    inner: Arc<RwLock<AttributeContainer>>,
}

impl ContainerHandle {
    pub fn new(container: AttributeContainer) -> Self {
        Self {
            tag: Arc::from(container.type_tag()),
            inner: Arc::new(RwLock::new(container)),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.tag
    }

    pub fn read(&self) -> RwLockReadGuard<'_, AttributeContainer> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> AttributeContainer {
        self.read().clone()
    }

    /// Reads the variant fields, if this handle holds a `T`.
    pub fn with<T: ContainerKind, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.read().get::<T>().map(f)
    }

    /// Edits the variant fields in place, if this handle holds a `T`.
    pub fn update<T: ContainerKind, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.get_mut::<T>().map(f)
    }

    pub fn update_metadata<R>(&self, f: impl FnOnce(&mut Metadata) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(guard.metadata_mut())
    }

    pub fn ptr_eq(&self, other: &ContainerHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ContainerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ContainerHandle {}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerHandle").field(&*self.read()).finish()
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.read(), f)
    }
}

impl From<AttributeContainer> for ContainerHandle {
    fn from(container: AttributeContainer) -> Self {
        Self::new(container)
    }
}

/// Splits a JSON envelope into `(tag, metadata, fields)`.
pub(crate) fn split_envelope(envelope: Value) -> Result<(String, Metadata, Value), ContainerError> {
    let Value::Object(mut obj) = envelope else {
        return Err(ContainerError::Envelope("expected a JSON object".to_string()));
    };
    let tag = match obj.remove("type") {
        Some(Value::String(tag)) => tag,
        _ => return Err(ContainerError::Envelope("missing string field 'type'".to_string())),
    };
    let metadata = match obj.remove("metadata") {
        None | Some(Value::Null) => Metadata::new(),
        Some(raw) => serde_json::from_value(raw).map_err(|e| ContainerError::decode(tag.clone(), e))?,
    };
    let fields = obj.remove("fields").unwrap_or_else(|| Value::Object(Default::default()));
    Ok((tag, metadata, fields))
}
