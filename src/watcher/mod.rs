//! Fragment watch: keeping the store current and debouncing its changes.
//!
//! # Architecture
//!
//! ```text
//! FragmentSource (KubeSource)
//!   - watch + relist, owns reconnection
//!         |
//!         v
//! FragmentStore ---- subscribers ----> ChangeSignal
//!                                          |
//!                                          v
//!                                   ChangeDebouncer
//!                                          |
//!                                          v
//!                                     settle signal
//! ```

mod debouncer;
mod error;
mod kubernetes;
mod source;

pub use debouncer::{ChangeDebouncer, ChangeSignal, DebounceState, Debouncer};
pub use error::WatchError;
pub use kubernetes::{KubeSource, fragment_from_config_map};
pub use source::FragmentSource;
