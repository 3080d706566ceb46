// Export modules for use in tests
pub mod annotations;
pub mod api;
pub mod app;
pub mod event_source;
pub mod geometry;
pub mod labels;
pub mod notification;
pub mod overlay;
pub mod panic_handler;
pub mod render;
pub mod selection;
pub mod settings;
pub mod theme;
pub mod viewport;
pub mod widget;

pub mod test_utils;

// Re-export main app components
pub use app::{App, FocusedPanel, LoadPhase, run_app_with_event_source};
