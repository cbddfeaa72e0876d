pub mod location;
pub mod types;

pub use location::{Coordinate, LocationRef, RoutePreference};
pub use types::{ChatMessage, ConversationTurn, MessageRole};
