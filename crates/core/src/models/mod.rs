pub mod health;
pub mod retry;
pub mod task;
pub mod task_execution;

pub use health::*;
pub use retry::*;
pub use task::*;
pub use task_execution::*;
