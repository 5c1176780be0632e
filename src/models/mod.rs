mod agent;
mod contact;
pub mod input;
mod message;

pub use agent::{Agent, Availability, UserStatusMap};
pub use contact::{ContactRecord, Conversation};
pub use input::{ContactInput, ValidateExt};
pub use message::{Attachment, Message, RawMessage, Sender};
