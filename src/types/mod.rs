//! Core types: runtime event wire model, content blocks, usage, permissions.

pub mod event;
pub mod message;
pub mod permission;
pub mod stream;
pub mod usage;

pub use event::*;
pub use message::*;
pub use permission::*;
pub use stream::*;
pub use usage::*;
