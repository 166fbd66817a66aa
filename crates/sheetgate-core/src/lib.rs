//! SheetGate Core
//!
//! Leaf crate for the SheetGate access layer: the Tenant Registry, the
//! shared error taxonomy, the `DocumentClient` capability boundary, and the
//! write-event bus the Cache observes. Every other SheetGate crate depends
//! on this one; this one depends on nothing else in the workspace.

pub mod document_client;
pub mod error;
pub mod events;
pub mod tenant;

pub use document_client::{ClientError, ClientResult, DocumentClient, Handle, Row, Sheet};
pub use error::{Result, SheetGateError};
pub use events::{EventBus, WriteEvent, WriteObserver};
pub use tenant::{Plan, Tenant, TenantAttrs, TenantRegistry};
