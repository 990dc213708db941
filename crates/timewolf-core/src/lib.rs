//! Timewolf Core - attribute containers, the container store, errors and sinks

pub mod container;
pub mod containers;
pub mod dataset;
pub mod error;
pub mod registry;
pub mod sink;
pub mod store;

pub use container::{
    AttributeContainer, ContainerHandle, ContainerKind, CustomContainer, Metadata, MetadataValue,
};
pub use containers::*;
pub use dataset::{DataFrame, DataTable};
pub use error::{
    ContainerError, ErrorKind, Fatality, ModuleError, ModuleResult, TransportError,
    PERMISSION_DENIED_MESSAGE,
};
pub use registry::ContainerRegistry;
pub use sink::{BroadcastSink, Message, MessageSink, RecordingSink, Severity, TracingSink};
pub use store::{ContainerStore, RunCache};
