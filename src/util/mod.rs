pub mod config;
pub mod log;
pub mod logging;
pub mod notification;
pub mod task_queue;
