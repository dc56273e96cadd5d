//! obs-remote
//!
//! Remote control client for an OBS-style broadcast server. Keeps a local
//! mirror of scenes, sources, audio levels and output state in sync with the
//! server through pushed events, and turns operator commands into requests.

pub mod config;
pub mod console;
pub mod differ;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod reconciler;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{ReconcileError, SessionError, TransportError};
pub use mirror::StateMirror;
pub use render::{RenderCommand, Ui};
pub use session::{OperatorCommand, Session};
