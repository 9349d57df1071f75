//! render graph 编译器与 native backend 之间的窄接口
//!
//! 编译器产出的执行计划只通过本 crate 中的类型与 backend 交互：
//!
//! - [`handles`]: 物理资源句柄，由 backend 的资源管理器发放
//! - [`desc`]: 物理资源描述，瞬态资源按此分配
//! - [`barrier`]: `vk::*MemoryBarrier2` 的便捷构造器，执行器录制 barrier 时使用
//! - [`allocator`]: 瞬态资源分配接口，编译器通过它向 backend 申请资源
//!
//! backend 如何创建 vk 对象、如何录制命令，都不属于本 crate 的职责。

pub mod allocator;
pub mod barrier;
pub mod desc;
pub mod handles;
