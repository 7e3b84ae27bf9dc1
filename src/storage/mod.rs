// 存储抽象层模块

pub mod durable;
pub mod factory;
pub mod local;
pub mod memory;
pub mod oss;
pub mod traits;

pub use durable::{DurableStore, Namespace, ObjectMissing};
pub use factory::{create_durable_store, create_storage};
pub use traits::{Storage, CONTENT_TYPE_JSON};
