//! # workspace_fs
//!
//! Access to a single workspace directory on behalf of remote clients.
//!
//! - [`WorkspaceStore`] lists the directory tree and reads/writes files, with
//!   every client path resolved through [`WorkspaceRoot`] first.
//! - [`FileTree`] is the snapshot returned by a listing; it is rebuilt on
//!   every request.
//! - [`WorkspaceWatcher`] (feature `watcher`, on by default) reports changes
//!   anywhere under the root.
//!
//! ```rust,no_run
//! use workspace_fs::WorkspaceStore;
//!
//! let store = WorkspaceStore::open("./user")?;
//! store.write_file("/notes.txt", "hello")?;
//! assert_eq!(store.read_file("/notes.txt")?, "hello");
//! println!("{} files", store.list_tree()?.file_count());
//! # Ok::<(), workspace_fs::WorkspaceError>(())
//! ```

pub mod error;
pub mod path;
pub mod store;
pub mod tree;
#[cfg(feature = "watcher")]
pub mod watcher;

pub use error::{Result, WorkspaceError};
pub use path::WorkspaceRoot;
pub use store::WorkspaceStore;
pub use tree::FileTree;
#[cfg(feature = "watcher")]
pub use watcher::{ChangeKind, FileChangeEvent, WorkspaceWatcher};
