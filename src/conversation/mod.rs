//! Conversation threading over topic message streams.

pub mod threader;

pub use threader::{
    CleanupReport, ConversationContext, ConversationThread, ConversationThreader, ThreadStats,
};
