//! # Sandboxed Scratch
//!
//! A small library for keeping intermediate files of a multi-step job inside one
//! sandboxed directory.
//!
//! The directory is provisioned lazily: building a [`ScratchSpace`] touches nothing on
//! disk, the first write creates the root. Provisioning is idempotent, so several tasks
//! (or several processes) writing their first entry at the same time all succeed.
//!
//! ## Features
//!
//! - **Lazy provisioning**: the root directory is created on first write and re-created
//!   after a purge
//! - **Atomic writes**: entries are written to a hidden temp file and renamed into place,
//!   readers never observe a partially written entry
//! - **Namespaces**: an optional single-segment namespace below the base directory, used
//!   to keep separate jobs apart
//! - **Path validation**: absolute paths, `..` components, NUL bytes and symlinks that
//!   escape the root are rejected
//! - **Whole-tree purge**: removes every entry at once, idempotent
//!
//! ## Basic Usage
//!
//! ```rust
//! use sandboxed_scratch::ScratchSpace;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scratch = ScratchSpace::builder()
//!     .base_directory("/var/tmp/my-job")
//!     .namespace("run-42")
//!     .build()?;
//!
//! scratch.write("step_one.csv", "a,b\n1,2\n").await?;
//! let bytes = scratch.read("step_one.csv").await?;
//! assert_eq!(bytes, b"a,b\n1,2\n");
//!
//! scratch.purge().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod security;
pub mod space;

pub use error::{Result, ScratchError};
pub use space::{EntryInfo, ScratchSpace, ScratchSpaceBuilder};
