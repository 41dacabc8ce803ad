//! Browser client for a self-hosted Memos server with a live-styled
//! markdown editor.

pub mod annotate;
pub mod api;
pub mod app;
pub mod debounce;
pub mod editor_core;
pub mod memo;
pub mod render;
pub mod session;
pub mod settings;

pub use annotate::{annotate, Annotation, StyleTag};
pub use editor_core::{on_enter, ContinuationAction};
