//! Merge annotated Kubernetes ConfigMaps into one Prometheus configuration.
//!
//! Fragments opted in with `prometheus.io/config: "true"` are mirrored into a
//! [`FragmentStore`], changes are debounced, and every settle regenerates the
//! target tree and asks Prometheus to reload.

pub mod config;
pub mod document;
pub mod fragment;
pub mod generate;
pub mod logging;
pub mod orchestrator;
pub mod reload;
pub mod store;
pub mod watcher;

pub use config::Settings;
pub use document::{Document, DocumentError};
pub use fragment::{Fragment, FragmentId};
pub use generate::{ConfigGenerator, GenerateError, GenerateReport};
pub use orchestrator::{Orchestrator, SyncError};
pub use reload::{HttpTransport, ReloadNotifier, ReloadTransport};
pub use store::{ChangeKind, FragmentEvent, FragmentStore};
pub use watcher::{FragmentSource, KubeSource, WatchError};
