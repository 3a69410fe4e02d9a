//! Per key window state and the logic firing closed windows.
mod state;
mod store;
mod trigger;

pub use state::WindowState;
pub use store::{Fold, WindowStore};
pub use trigger::FiringScheduler;

/// What happens to windows which are still open when a pipeline shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Drop all open windows without emitting them
    #[default]
    DiscardOpen,
    /// Fire all open windows before stopping, as if their end had passed
    FlushOpen,
}
