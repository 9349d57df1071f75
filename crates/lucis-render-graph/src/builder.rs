//! RenderGraph 构建器
//!
//! 声明式构建一帧的渲染图：登记资源、添加 Pass、声明显式依赖，
//! 最后调用 [`RenderGraphBuilder::compile`] 产出执行计划。

use ash::vk;

use crate::buffer_resource::RgBufferResource;
use crate::compiler::{RgCompileOptions, RgCompiler};
use crate::error::RgCompileError;
use crate::executable::RgExecutableGraph;
use crate::image_resource::{RgImageResource, RgSwapchainSync};
use crate::pass::{RgPass, RgPassBuilder, RgPassExecutorWrapper, RgPassNode};
use crate::resource_handle::{RgBufferHandle, RgImageHandle};
use crate::resource_registry::RgResourceRegistry;
use crate::resource_state::{RgBufferState, RgImageState};
use lucis_render_interface::allocator::GfxTransientResourcePool;
use lucis_render_interface::desc::{GfxBufferDesc, GfxImageDesc};
use lucis_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

/// 构建阶段的 Pass 标识，用于声明显式依赖和提交边界
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgPassHandle(pub(crate) usize);

/// RenderGraph 构建器
///
/// # 使用流程
///
/// 1. 创建 builder: `RenderGraphBuilder::new()`
/// 2. 导入外部资源: `builder.import_image(...)`
/// 3. 添加 Pass: `builder.add_pass("name", pass)`
/// 4. 编译: `builder.compile(options, pool)`
///
/// # 生命周期
///
/// `'a` 是 Pass 可以借用的外部资源的生命周期。
/// 这允许 Pass 直接引用外部的 pipeline、geometry 等资源，
/// 而不需要使用 Rc/Arc 包装。
pub struct RenderGraphBuilder<'a> {
    /// 资源注册表
    resources: RgResourceRegistry,
    /// Pass 节点列表（按添加顺序）
    passes: Vec<RgPassNode<'a>>,

    /// 本帧的 swapchain image（至多一个）
    swapchain_image: Option<RgImageHandle>,
    /// 整帧完成时 signal 的 fence
    complete_fence: Option<vk::Fence>,
    /// graph 所在队列的 queue family
    queue_family_index: u32,
}

impl Default for RenderGraphBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl RenderGraphBuilder<'_> {
    /// 创建新的 RenderGraph 构建器
    pub fn new() -> Self {
        Self {
            resources: RgResourceRegistry::new(),
            passes: Vec::new(),
            swapchain_image: None,
            complete_fence: None,
            queue_family_index: 0,
        }
    }

    /// 设置 graph 所在队列的 queue family
    ///
    /// 导入资源声明了其他 queue family 时，编译器据此生成所有权转移 barrier。
    pub fn set_queue_family_index(&mut self, queue_family_index: u32) {
        self.queue_family_index = queue_family_index;
    }

    /// 设置整帧完成时 signal 的 fence
    pub fn set_complete_fence(&mut self, fence: vk::Fence) {
        self.complete_fence = Some(fence);
    }
}

// 资源登记
impl RenderGraphBuilder<'_> {
    /// 登记一个完整构造的图像资源（跨队列、只读纹理等少见形态走这里）
    pub fn register_image(&mut self, image_resource: RgImageResource) -> RgImageHandle {
        self.resources.register_image(image_resource)
    }

    /// 登记一个完整构造的缓冲区资源
    pub fn register_buffer(&mut self, buffer_resource: RgBufferResource) -> RgBufferHandle {
        self.resources.register_buffer(buffer_resource)
    }

    /// 导入外部图像资源
    ///
    /// # 参数
    /// - `current_state`: 图像进入本帧时各 subresource 的统一状态
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        handle: GfxImageHandle,
        format: vk::Format,
        mip_levels: u32,
        array_layers: u32,
        current_state: RgImageState,
    ) -> RgImageHandle {
        self.resources
            .register_image(RgImageResource::imported(name, handle, format, mip_levels, array_layers, current_state))
    }

    /// 导入只读采样纹理
    ///
    /// 帧内只允许以 `SHADER_READ_ONLY_OPTIMAL` layout 读取
    /// （`STRICT_VALIDATION` 开启时校验）。
    pub fn import_read_only_image(
        &mut self,
        name: impl Into<String>,
        handle: GfxImageHandle,
        format: vk::Format,
        mip_levels: u32,
        array_layers: u32,
    ) -> RgImageHandle {
        self.resources.register_image(RgImageResource::imported_read_only(name, handle, format, mip_levels, array_layers))
    }

    /// 导入外部缓冲区资源
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        handle: GfxBufferHandle,
        current_state: RgBufferState,
    ) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::imported(name, handle, current_state))
    }

    /// 创建瞬态图像
    pub fn create_image(&mut self, name: impl Into<String>, desc: GfxImageDesc) -> RgImageHandle {
        self.resources.register_image(RgImageResource::transient(name, desc))
    }

    /// 创建瞬态缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: GfxBufferDesc) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }

    /// 登记本帧的 swapchain image
    ///
    /// 编译器会给首个使用它的 section 加 acquire 等待、
    /// 给最后一个使用它的 section 加 present signal 和 layout 转换。
    ///
    /// # Panics
    /// 一帧内登记两次 swapchain image 时 panic。
    pub fn register_swapchain_image(
        &mut self,
        name: impl Into<String>,
        handle: GfxImageHandle,
        format: vk::Format,
        acquire_semaphore: vk::Semaphore,
        present_semaphore: vk::Semaphore,
    ) -> RgImageHandle {
        assert!(self.swapchain_image.is_none(), "swapchain image already registered for this graph");
        let sync = RgSwapchainSync { acquire_semaphore, present_semaphore };
        let rg_handle = self.resources.register_image(RgImageResource::swapchain(name, handle, format, sync));
        self.swapchain_image = Some(rg_handle);
        rg_handle
    }
}

// Pass 管理
impl<'a> RenderGraphBuilder<'a> {
    /// 添加 Pass
    ///
    /// 立即调用 `pass.setup()` 收集资源依赖声明。
    ///
    /// # 返回
    /// Pass 标识，用于 [`Self::connect`] 等后续声明
    pub fn add_pass<P: RgPass + 'a>(&mut self, name: impl Into<String>, mut pass: P) -> RgPassHandle {
        let name = name.into();

        // 创建 PassBuilder 供 Pass 声明依赖
        let mut builder = RgPassBuilder {
            name: name.clone(),
            buffer_uses: Vec::new(),
            image_uses: Vec::new(),
            resources: &mut self.resources,
        };
        pass.setup(&mut builder);

        let node = RgPassNode {
            name,
            buffer_uses: builder.buffer_uses,
            image_uses: builder.image_uses,
            prevs: Vec::new(),
            succs: Vec::new(),
            signal_fence: None,
            sync_before_exec: false,
            executor: Some(Box::new(RgPassExecutorWrapper { pass })),
        };

        self.passes.push(node);
        RgPassHandle(self.passes.len() - 1)
    }

    /// 添加一个没有回调、不声明资源的空 Pass
    ///
    /// 用作依赖汇聚点，或者给 fence 一个挂载位置。
    pub fn add_dummy_pass(&mut self, name: impl Into<String>) -> RgPassHandle {
        self.passes.push(RgPassNode {
            name: name.into(),
            buffer_uses: Vec::new(),
            image_uses: Vec::new(),
            prevs: Vec::new(),
            succs: Vec::new(),
            signal_fence: None,
            sync_before_exec: false,
            executor: None,
        });
        RgPassHandle(self.passes.len() - 1)
    }

    /// 声明显式依赖：`head` 必须先于 `tail` 执行
    pub fn connect(&mut self, head: RgPassHandle, tail: RgPassHandle) {
        self.passes[head.0].succs.push(tail.0);
        self.passes[tail.0].prevs.push(head.0);
    }

    /// 让 Pass 所在的 section 提交时 signal 指定 fence
    ///
    /// fence 是提交边界：该 Pass 之后会开启新的 section。
    pub fn set_signal_fence(&mut self, pass: RgPassHandle, fence: vk::Fence) {
        self.passes[pass.0].signal_fence = Some(fence);
    }

    /// 要求执行该 Pass 之前队列空闲（该 Pass 会开启新的 section）
    pub fn sync_queue_before_execution(&mut self, pass: RgPassHandle) {
        self.passes[pass.0].sync_before_exec = true;
    }
}

impl<'a> RenderGraphBuilder<'a> {
    /// 编译渲染图
    ///
    /// 执行依赖分析、拓扑排序、section 划分、semaphore 分配、
    /// 资源绑定与 barrier 生成。
    ///
    /// # 返回
    /// 编译后的执行计划；图不合法时返回 [`RgCompileError`]。
    pub fn compile(
        self,
        options: RgCompileOptions,
        pool: &mut dyn GfxTransientResourcePool,
    ) -> Result<RgExecutableGraph<'a>, RgCompileError> {
        RgCompiler::new(
            options,
            self.resources,
            self.passes,
            self.swapchain_image,
            self.complete_fence,
            self.queue_family_index,
        )
        .compile(pool)
    }
}
