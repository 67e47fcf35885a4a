//! Page geometry
//!
//! Sizes imposed by the layers below the B-tree: which physical page sizes exist, and how
//! much of a page is left for objects once the buffer, version log and area manager have taken
//! their share. Also the archive sizes of node page headers and key information slots.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::null_bitmap;
use super::BtreeError;
use crate::data::{OBJECT_ID_ARCHIVE_SIZE, PAGE_ID_ARCHIVE_SIZE, U32_ARCHIVE_SIZE};

/// Smallest physical page.
pub const MIN_PAGE_SIZE: usize = 4 << 10;
/// Largest physical page.
pub const MAX_PAGE_SIZE: usize = 64 << 10;

/// Per page overhead of the buffer layer.
pub const BUFFER_PAGE_OVERHEAD: usize = 16;
/// Per page overhead of the version log.
pub const VERSION_PAGE_OVERHEAD: usize = 40;

const AREA_HEADER_SIZE: usize = 8;
const LARGE_AREA_HEADER_SIZE: usize = 14;
const AREA_DIRECTORY_INFO_SIZE: usize = 4;
const LARGE_AREA_DIRECTORY_INFO_SIZE: usize = 8;
const AREAS_PER_DIRECTORY_BLOCK: usize = 8;

/// Leaf page header: 5 page ids and 2 counters.
pub const LEAF_PAGE_HEADER_SIZE: usize = 5 * PAGE_ID_ARCHIVE_SIZE + 2 * U32_ARCHIVE_SIZE;
/// Branch page header: 3 page ids and 2 counters.
pub const NODE_PAGE_HEADER_SIZE: usize = 3 * PAGE_ID_ARCHIVE_SIZE + 2 * U32_ARCHIVE_SIZE;

/// Where key values live.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum KeyPosType {
    /// Inline, in the node's key information slots
    KeyInfo,
    /// In separate key objects referenced from the key information slots
    KeyObject,
}

/// Physical page rules of a storage layer.
pub trait PageGeometry: Debug + Send + Sync {
    /// The physical page size used for a requested `size`.
    fn verify_page_size(&self, size: usize) -> Result<usize, BtreeError>;

    /// Bytes available for `area_count` objects on a page of `page_size` bytes. The size is
    /// taken as given, so callers may ask about fractions of a physical page.
    fn page_data_size(&self, page_size: usize, area_count: usize) -> usize;
}

/// Geometry of area managed pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaManageGeometry {
    /// Largest page size this layer will produce
    pub max_page_size: usize,
}

impl Default for AreaManageGeometry {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl AreaManageGeometry {
    fn is_large(page_size: usize) -> bool {
        page_size & 0xFFFF_0000 != 0
    }

    fn area_header_size(page_size: usize) -> usize {
        if Self::is_large(page_size) {
            LARGE_AREA_HEADER_SIZE
        } else {
            AREA_HEADER_SIZE
        }
    }

    fn directory_size(page_size: usize, area_count: usize) -> usize {
        let info = if Self::is_large(page_size) {
            LARGE_AREA_DIRECTORY_INFO_SIZE
        } else {
            AREA_DIRECTORY_INFO_SIZE
        };
        let block = 1 + AREAS_PER_DIRECTORY_BLOCK * info;
        let rem = area_count % AREAS_PER_DIRECTORY_BLOCK;
        let partial = if rem > 0 { 1 + rem * info } else { 0 };
        (area_count / AREAS_PER_DIRECTORY_BLOCK) * block + partial
    }
}

impl PageGeometry for AreaManageGeometry {
    fn verify_page_size(&self, size: usize) -> Result<usize, BtreeError> {
        let verified = size.max(MIN_PAGE_SIZE).next_power_of_two();
        if verified > self.max_page_size {
            return Err(BtreeError::not_supported(format!(
                "page size {size} exceeds {}",
                self.max_page_size
            )));
        }
        Ok(verified)
    }

    fn page_data_size(&self, page_size: usize, area_count: usize) -> usize {
        page_size
            .saturating_sub(BUFFER_PAGE_OVERHEAD + VERSION_PAGE_OVERHEAD)
            .saturating_sub(Self::area_header_size(page_size))
            .saturating_sub(Self::directory_size(page_size, area_count))
    }
}

/// Archive size of a node page header.
pub fn node_header_size(leaf: bool) -> usize {
    if leaf {
        LEAF_PAGE_HEADER_SIZE
    } else {
        NODE_PAGE_HEADER_SIZE
    }
}

/// Archive size of a key information slot, excluding any inline key values.
pub fn key_information_size(leaf: bool, key_pos: KeyPosType, key_count: usize) -> usize {
    match (key_pos, leaf) {
        // key object id + value object id
        (KeyPosType::KeyObject, true) => 2 * OBJECT_ID_ARCHIVE_SIZE,
        // key object id + child page id
        (KeyPosType::KeyObject, false) => OBJECT_ID_ARCHIVE_SIZE + PAGE_ID_ARCHIVE_SIZE,
        (KeyPosType::KeyInfo, true) => OBJECT_ID_ARCHIVE_SIZE + null_bitmap::size(key_count),
        (KeyPosType::KeyInfo, false) => PAGE_ID_ARCHIVE_SIZE + null_bitmap::size(key_count),
    }
}
