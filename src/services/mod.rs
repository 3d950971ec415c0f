// Services module - Business logic

pub mod cancellation_workflow;
pub mod document_resolver;
pub mod document_store;
pub mod registration;
pub mod uniqueness_guard;

pub use cancellation_workflow::{CancellationWorkflow, OpenCancellation, WorkflowError};
pub use document_resolver::DocumentResolver;
pub use document_store::{DocumentStore, DocumentStoreError, HttpDocumentStore, MemoryDocumentStore};
pub use registration::{RegistrationError, RegistrationService};
pub use uniqueness_guard::{UniquenessError, UniquenessGuard};
