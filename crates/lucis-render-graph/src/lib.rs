//! 声明式渲染图编译器
//!
//! 把一帧的 GPU 工作描述（一组声明了资源使用方式的 Pass）编译成
//! 带最小 barrier 集合、semaphore 依赖和物理资源绑定的执行计划。
//!
//! # 核心概念
//!
//! - **RgImageHandle / RgBufferHandle**: 虚拟资源句柄，在 graph 内部标识资源
//! - **RgImageState / RgBufferState**: 资源状态描述，包含 stage、access、layout
//! - **RgPass**: 渲染 Pass trait，声明资源依赖和执行逻辑
//! - **RenderGraphBuilder**: 构建器，用于登记资源和 Pass
//! - **RgExecutableGraph**: 编译结果，按 section 组织、带预计算的 barrier
//!
//! # 使用示例
//!
//! ```ignore
//! use lucis_render_graph::*;
//!
//! // 1. 定义 Pass
//! struct BlurPass {
//!     input: RgImageHandle,
//!     output: RgImageHandle,
//! }
//!
//! impl RgPass for BlurPass {
//!     fn setup(&mut self, builder: &mut RgPassBuilder) {
//!         builder.use_image(self.input, RgImageState::SHADER_READ_COMPUTE);
//!         builder.use_image(self.output, RgImageState::STORAGE_WRITE_COMPUTE);
//!     }
//!
//!     fn execute(&self, ctx: &RgPassContext) {
//!         let input = ctx.get_image(self.input);
//!         let output = ctx.get_image(self.output);
//!         // 绑定 descriptor sets, dispatch...
//!     }
//! }
//!
//! // 2. 构建渲染图
//! let mut builder = RenderGraphBuilder::new();
//! let input = builder.import_image("scene-color", scene_color, format, 1, 1, RgImageState::COLOR_ATTACHMENT_WRITE);
//! let output = builder.create_image("blurred", GfxImageDesc::new_2d(1920, 1080, format, usage));
//! builder.add_pass("blur", BlurPass { input, output });
//!
//! // 3. 编译；执行计划交给外部执行器按 section 提交
//! let graph = builder.compile(RgCompileOptions::default(), &mut pool)?;
//! ```
//!
//! # 并发模型
//!
//! 编译是单线程的同步纯计算：每帧在驱动帧提交的线程上执行一次，
//! 不做任何 I/O，也不会阻塞。执行计划的消费（录制、提交、等 fence）
//! 发生在外部执行器里，与本 crate 无关。
//!
//! # 模块结构
//!
//! - `resource_handle` / `resource_state` / `subresource`: 资源寻址与状态
//! - `buffer_resource` / `image_resource` / `resource_registry`: 资源目录
//! - `pass` / `builder`: 声明层
//! - `graph`: 依赖图和拓扑排序
//! - `compiler`: section 划分、semaphore 分配、barrier 生成
//! - `barrier` / `semaphore_info` / `executable`: 编译产物

mod barrier;
mod buffer_resource;
mod builder;
mod compiler;
mod error;
mod executable;
mod graph;
mod image_resource;
mod pass;
mod resource_handle;
mod resource_registry;
mod resource_state;
mod semaphore_info;
mod subresource;

// Re-exports
pub use barrier::{RgBufferBarrier, RgGlobalBarrier, RgImageBarrier};
pub use buffer_resource::{RgBufferResource, RgBufferSource};
pub use builder::{RenderGraphBuilder, RgPassHandle};
pub use compiler::RgCompileOptions;
pub use error::RgCompileError;
pub use executable::{
    RgBufferRecord, RgExecutableGraph, RgExecutablePass, RgExecutableResources, RgExecutableSection, RgImageRecord,
};
pub use graph::DependencyGraph;
pub use image_resource::{RgImageResource, RgImageSource, RgSwapchainSync};
pub use pass::{RgPass, RgPassBuilder, RgPassContext, RgPassNode};
pub use resource_handle::{RgBufferHandle, RgImageHandle};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::{RgBufferState, RgImageState, is_read_only_access, is_write_only_access};
pub use semaphore_info::RgSemaphoreInfo;
pub use subresource::{RgSubresource, RgSubresourceMap, RgSubresourceRange};
