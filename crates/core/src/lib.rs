pub mod booking;
pub mod config;
pub mod domain;
pub mod errors;
pub mod segment;

pub use booking::{Availability, BookedSlot, BusinessHours, SlotRequest, SuggestedSlot};
pub use domain::agent::{Agent, AgentId, LlmSettings, PermissionSet};
pub use domain::appointment::{Appointment, AppointmentId, AppointmentStatus, CreatedVia};
pub use domain::compliment::{Compliment, ComplimentId};
pub use domain::conversation::{
    Conversation, ConversationId, ConversationResult, ConversationStatus, Message, MessageId,
    SenderRole, ToolCallRecord,
};
pub use domain::document::{DocumentStatus, Fragment, KnowledgeDocument, KnowledgeDocumentId};
pub use errors::{DomainError, ToolError};
pub use segment::segment_message;
