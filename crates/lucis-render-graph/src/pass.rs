//! Pass 定义和构建器
//!
//! 提供 `RgPass` trait 用于声明式定义渲染 Pass，
//! 以及 `RgPassBuilder` 用于在 setup 阶段声明资源依赖。

use ash::vk;

use crate::buffer_resource::RgBufferResource;
use crate::executable::RgExecutableResources;
use crate::image_resource::RgImageResource;
use crate::resource_handle::{RgBufferHandle, RgImageHandle};
use crate::resource_registry::RgResourceRegistry;
use crate::resource_state::{RgBufferState, RgImageState};
use crate::subresource::RgSubresourceRange;
use lucis_render_interface::desc::{GfxBufferDesc, GfxImageDesc};
use lucis_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

/// Pass 执行时的上下文
///
/// 提供虚拟句柄到物理句柄的解析。命令缓冲区由外部执行器自行管理，
/// 不经过本 crate。
pub struct RgPassContext<'a> {
    /// 编译产出的物理资源绑定表
    pub resources: &'a RgExecutableResources,
    /// 当前 Pass 名称
    pub pass_name: &'a str,
}

impl RgPassContext<'_> {
    /// 获取图像的物理句柄
    #[inline]
    pub fn get_image(&self, handle: RgImageHandle) -> Option<GfxImageHandle> {
        self.resources.image_binding(handle)
    }

    /// 获取缓冲区的物理句柄
    #[inline]
    pub fn get_buffer(&self, handle: RgBufferHandle) -> Option<GfxBufferHandle> {
        self.resources.buffer_binding(handle)
    }
}

/// 类型擦除的 Pass 执行器 trait
pub(crate) trait RgPassExecutor {
    /// 执行 Pass
    fn execute(&self, ctx: &RgPassContext<'_>);
}

/// 包装用户 Pass 实现的执行器
pub(crate) struct RgPassExecutorWrapper<P> {
    pub pass: P,
}

impl<P: RgPass> RgPassExecutor for RgPassExecutorWrapper<P> {
    fn execute(&self, ctx: &RgPassContext<'_>) {
        self.pass.execute(ctx);
    }
}

/// 一条图像使用声明（展开前的原始形式）
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgImageUse {
    pub handle: RgImageHandle,
    pub range: RgSubresourceRange,
    pub state: RgImageState,
}

/// Pass 构建器
///
/// 在 `RgPass::setup()` 中使用，声明 Pass 的资源依赖。
pub struct RgPassBuilder<'a> {
    /// Pass 名称
    #[allow(dead_code)]
    pub(crate) name: String,

    /// 缓冲区使用声明
    pub(crate) buffer_uses: Vec<(RgBufferHandle, RgBufferState)>,
    /// 图像使用声明（按 subresource 范围）
    pub(crate) image_uses: Vec<RgImageUse>,

    /// 资源注册表引用（用于创建瞬态资源）
    pub(crate) resources: &'a mut RgResourceRegistry,
}

impl RgPassBuilder<'_> {
    /// 声明使用缓冲区
    ///
    /// 同一缓冲区的多次声明在编译时按位或合并。
    #[inline]
    pub fn use_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        self.buffer_uses.push((handle, state));
        handle
    }

    /// 声明使用整个图像（所有 mip 与 layer）
    #[inline]
    pub fn use_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        self.use_image_subresource(handle, RgSubresourceRange::ALL, state)
    }

    /// 声明使用图像的一个 subresource 范围
    ///
    /// 不同范围的多次声明会在编译时展开到 subresource 粒度；
    /// 同一个 subresource 的多次声明必须使用相同 layout，mask 按位或合并。
    pub fn use_image_subresource(
        &mut self,
        handle: RgImageHandle,
        range: RgSubresourceRange,
        state: RgImageState,
    ) -> RgImageHandle {
        self.image_uses.push(RgImageUse { handle, range, state });
        handle
    }

    /// 创建瞬态缓冲区
    ///
    /// 缓冲区在编译阶段从瞬态资源池分配，帧结束后归还。
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: GfxBufferDesc) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }

    /// 创建瞬态图像
    pub fn create_image(&mut self, name: impl Into<String>, desc: GfxImageDesc) -> RgImageHandle {
        self.resources.register_image(RgImageResource::transient(name, desc))
    }
}

/// Pass 节点数据（构建后、编译前）
pub struct RgPassNode<'a> {
    /// Pass 名称
    pub name: String,

    /// 缓冲区使用声明
    pub(crate) buffer_uses: Vec<(RgBufferHandle, RgBufferState)>,
    /// 图像使用声明
    pub(crate) image_uses: Vec<RgImageUse>,

    /// 显式依赖边：必须先于本 Pass 执行的 Pass 索引
    pub(crate) prevs: Vec<usize>,
    /// 显式依赖边：必须后于本 Pass 执行的 Pass 索引
    pub(crate) succs: Vec<usize>,

    /// 本 Pass 提交后 signal 的 fence（划分 section 的提交边界）
    pub(crate) signal_fence: Option<vk::Fence>,
    /// 执行本 Pass 之前要求队列同步（划分 section）
    pub(crate) sync_before_exec: bool,

    /// 执行回调（类型擦除的 Pass 实现；dummy pass 为 None）
    pub(crate) executor: Option<Box<dyn RgPassExecutor + 'a>>,
}

/// RgPass trait
///
/// 定义渲染图中的一个 Pass。用户需要实现此 trait 来创建自定义 Pass。
///
/// # 线程安全
///
/// Pass 不需要是 Send + Sync，render graph 在驱动帧提交的线程上单线程使用。
/// Pass 可以借用外部资源，生命周期由 `RenderGraphBuilder` 的生命周期参数约束。
pub trait RgPass {
    /// 声明 Pass 的资源依赖
    ///
    /// 在此方法中使用 `RgPassBuilder` 声明读取和写入的资源。
    fn setup(&mut self, builder: &mut RgPassBuilder<'_>);

    /// 执行 Pass 的渲染逻辑
    ///
    /// 由外部执行器在录制完本 Pass 的 barrier 之后调用。
    fn execute(&self, ctx: &RgPassContext<'_>);
}
