//! Presentation bridge between the core, a detached UI and the editor

pub mod handler;
pub mod messages;
pub mod surface;

pub use handler::Bridge;
pub use messages::{views, AnomalyView, FileTarget, UiCommand, UiEvent};
pub use surface::{Decoration, Diagnostic, EditorSurface, DIAGNOSTIC_SOURCE};
