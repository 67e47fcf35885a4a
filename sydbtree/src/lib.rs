#![warn(missing_docs)]
//! sydbtree: the parameter layer of a page based B-tree driver
//!
//! # What is in here?
//!
//! Before a B-tree file can store a single key, somebody has to decide how keys and values are
//! packed into fixed size physical pages. This crate is that somebody.
//!
//! # Implementation Details
//!
//! The crate is composed of a few layers, leaves first:
//!
//!  - [`memory::MemoryPool`]: a bounded, size classed allocator with a fixed emergency reserve.
//!    Small requests are served from power of two buckets which are split buddy style. Large
//!    requests are served in whole blocks from an address sorted, coalescing free list.
//!  - [`btree::NullBitmap`]: a bit per field view over bytes embedded in key and value objects.
//!  - [`btree::FileParameter`]: the layout planner. Given a field definition list (held in a
//!    [`parameter::Parameters`] store, the "FileID") it works out which fields live inline and
//!    which are stored outside, whether keys sit in the node key table or in separate key
//!    objects, how big a page must be and how many keys a node holds (the fan-out).
//!  - [`btree::OpenParameter`]: validates a per-open option store (projection, search
//!    conditions, sort order, fetch) against a layout and normalises it.
//!
//! The normalised FileID is the persisted layout contract. It can be written to disk with
//! [`FileIdFile`] and re-read later, at which point building a [`btree::FileParameter`] from it
//! again yields exactly the same layout.
//!
//! Note: the B-tree engine that actually walks pages is not part of this crate. It is a consumer
//! of the constants computed here.
//!

pub mod btree;
pub mod data;
mod io;
pub mod memory;
pub mod parameter;

pub use crate::io::file::{FileIdFile, FileIdFileError};

use bincode::config::AllowTrailing;
use bincode::config::FixintEncoding;
use bincode::config::WithOtherIntEncoding;
use bincode::config::WithOtherTrailing;
use bincode::{DefaultOptions, Options};
use std::sync::LazyLock;

static BINCODER: LazyLock<
    WithOtherIntEncoding<WithOtherTrailing<DefaultOptions, AllowTrailing>, FixintEncoding>,
> = LazyLock::new(|| {
    bincode::DefaultOptions::new()
        .allow_trailing_bytes()
        .with_fixint_encoding()
});
