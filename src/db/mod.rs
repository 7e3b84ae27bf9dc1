// 状态存储抽象层模块

pub mod factory;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use factory::create_status_store;
pub use memory::MemoryStatusStore;
pub use sqlite::SqliteStatusStore;
pub use traits::{StatusStore, StatusStoreError, StatusStoreResult};
