//! External collaborators of the back office, seen at their interface
//! boundary: the event queue, the object store for attachments and the
//! contracts file share.

pub mod blob;
pub mod error;
pub mod events;
pub mod files;
pub mod publisher;

pub use blob::{InMemoryObjectStorage, ObjectStorage, object_name};
pub use error::{IntegrationError, Result};
pub use events::DomainEvent;
pub use files::{FileShare, InMemoryFileShare, SharedFile, shared_file_name};
pub use publisher::{
    EventPublisher, InMemoryEventPublisher, PostgresQueuePublisher, QueuedMessage,
    publish_best_effort,
};
