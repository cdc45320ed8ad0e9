//! 章节生成用例
//!
//! - machine: 单会话状态机与快照发布
//! - facade: 面向展示层的操作入口
//! - view: 派生视图与统计

mod facade;
mod machine;
mod view;

pub use facade::{GenerationFacade, GenerationFacadeConfig};
pub use machine::{Delivery, GenerationSnapshot, GenerationStateMachine};
pub use view::{generation_stats, GenerationView};
