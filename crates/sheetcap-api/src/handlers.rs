//! Request handlers.

pub mod health;
pub mod jobs;
pub mod maintenance;
pub mod preview;
pub mod runtime;

pub use health::*;
pub use jobs::*;
pub use maintenance::*;
pub use preview::*;
pub use runtime::*;
