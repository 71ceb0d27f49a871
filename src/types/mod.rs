mod document;
mod message;

pub use document::DocumentHandle;
pub use message::*;
