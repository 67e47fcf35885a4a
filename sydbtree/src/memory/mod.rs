//! Memory management
//!

// Re-export
pub use self::pool::MemoryError;
pub use self::pool::MemoryPool;
pub use self::pool::PoolConfig;
pub use self::pool::{BLOCK_SIZE, EMERGENCY_BLOCK_SIZE, HALF_BLOCK_SIZE};

mod cell;
mod pool;
