//! Reactive state containers with revertable mutation sessions.
//!
//! `watchi` wraps a JSON document in a [`Store`] that observes every mutation,
//! notifies subscribers, and can record mutations into a change log that
//! replays in reverse to restore prior state.
//!
//! # Core Concepts
//!
//! - **Store**: One observed root value plus its notification channel
//! - **Op**: A serializable mutation applied at a [`Path`] in the document
//! - **Change**: The undo record captured for each applied operation
//! - **Session**: A scoped recording of mutations with a [`Revert`] replay
//! - **Registry**: Constructs stores and owns their shared notification bus
//! - **Bindings**: Derived values that follow a store for a view layer
//!
//! # Sessions
//!
//! ```text
//! revertable       record through the live root; caller decides on revert
//! transaction      mutate silently; notify once on commit, revert on error
//! revert_on_error  record live; revert and re-raise (or consume) on error
//! ```
//!
//! The `_global` variants capture mutations made through any handle of the
//! store, not just the session's own. The `_async` variants accept suspending
//! actions and serialize overlapping sessions per store.
//!
//! # Quick Start
//!
//! ```
//! use watchi::{path, Registry};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! let store = registry.store(json!({"count": 0}));
//!
//! // A failed action rolls every recorded mutation back.
//! let result = store.revert_on_error(|s| {
//!     s.set(path!("count"), json!(5)).unwrap();
//!     Err::<(), _>(std::io::Error::other("downstream failure"))
//! });
//!
//! assert!(result.is_err());
//! assert_eq!(store.value_at(&path!("count")), Some(json!(0)));
//! ```

mod apply;
mod binding;
mod bus;
mod change;
mod doc;
mod error;
mod op;
mod path;
mod registry;
mod session;
mod store;

// Document types
pub use apply::get_at_path;
pub use change::{Change, ChangeLog, Previous};
pub use error::{value_type_name, TransactionError, WatchiError, WatchiResult};
pub use op::{Number, Op};
pub use path::{Path, Seg};

// Store types
pub use bus::WatchHandle;
pub use registry::Registry;
pub use session::{Revert, SessionStore};
pub use store::{DefaultErrorHandler, Store};

// View-binding types
pub use binding::{RefBinding, RenderHost, Selector, UpdatePolicy, ValueBinding};
