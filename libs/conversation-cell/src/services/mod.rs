pub mod conversation;
pub mod deriver;
pub mod relay;

pub use conversation::ConversationService;
pub use deriver::{conversation_id_for, ConversationDeriver};
pub use relay::MessageRelay;
