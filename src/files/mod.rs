//! Sandboxed file access
//!
//! Everything the server can touch on disk goes through here: logical
//! `plugins/...` paths are validated by [`PathSandbox`] and the operations in
//! [`FileStore`] only ever see physical paths that passed validation.

mod error;
mod sandbox;
mod store;

pub use error::FileError;
pub use sandbox::{is_allowed_extension, PathSandbox, ALLOWED_EXTENSIONS, PUBLISHED_ROOT};
pub use store::{FileEntry, FileStore, Listing, DEFAULT_LIST_LIMIT, DEFAULT_MAX_FILE_SIZE};
