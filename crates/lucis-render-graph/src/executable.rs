//! 编译产物：可执行的渲染图
//!
//! 外部执行器按顺序消费 section：wait semaphore → 逐 Pass 录制
//! pre-barrier 并调用回调 → 录制 post-barrier（present 转换）→
//! 带着 signal semaphore / fence 提交。本 crate 不做任何 GPU 提交。

use ash::vk;
use slotmap::SecondaryMap;

use crate::barrier::{RgBufferBarrier, RgGlobalBarrier, RgImageBarrier};
use crate::pass::{RgPassContext, RgPassExecutor};
use crate::resource_handle::{RgBufferHandle, RgImageHandle};
use crate::resource_state::{RgBufferState, RgImageState};
use crate::semaphore_info::RgSemaphoreInfo;
use crate::subresource::RgSubresourceMap;
use lucis_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

/// 单个缓冲区的编译结果：物理绑定与帧末状态
#[derive(Clone, Debug)]
pub struct RgBufferRecord {
    /// 物理句柄；未被使用的瞬态资源为 `None`
    pub handle: Option<GfxBufferHandle>,
    /// 本帧执行完毕后资源所处的同步状态，供下一帧的外部资源登记使用
    pub final_state: RgBufferState,
}

/// 单个图像的编译结果：物理绑定与帧末状态
#[derive(Clone, Debug)]
pub struct RgImageRecord {
    /// 物理句柄；未被使用的瞬态资源为 `None`
    pub handle: Option<GfxImageHandle>,
    /// 各 subresource 帧末状态；`None` 表示该 subresource 本帧未被触碰
    pub final_state: RgSubresourceMap<Option<RgImageState>>,
}

/// 物理资源绑定表与帧末状态
#[derive(Default)]
pub struct RgExecutableResources {
    /// 缓冲区记录
    pub buffers: SecondaryMap<RgBufferHandle, RgBufferRecord>,
    /// 图像记录
    pub images: SecondaryMap<RgImageHandle, RgImageRecord>,
}

impl RgExecutableResources {
    /// 查询缓冲区的物理绑定
    #[inline]
    pub fn buffer_binding(&self, handle: RgBufferHandle) -> Option<GfxBufferHandle> {
        self.buffers.get(handle).and_then(|record| record.handle)
    }

    /// 查询图像的物理绑定
    #[inline]
    pub fn image_binding(&self, handle: RgImageHandle) -> Option<GfxImageHandle> {
        self.images.get(handle).and_then(|record| record.handle)
    }
}

/// 可执行 Pass：原始 Pass 加上执行前必须录制的 barrier
pub struct RgExecutablePass<'a> {
    /// Pass 名称
    pub name: String,

    /// 可选的 global memory barrier（若干无 layout 转换的 barrier 的合并）
    pub pre_global_barrier: Option<RgGlobalBarrier>,
    /// 执行前的图像 barrier
    pub pre_image_barriers: Vec<RgImageBarrier>,
    /// 执行前的缓冲区 barrier
    pub pre_buffer_barriers: Vec<RgBufferBarrier>,

    /// 执行回调；dummy pass 为 None
    pub(crate) executor: Option<Box<dyn RgPassExecutor + 'a>>,
}

impl RgExecutablePass<'_> {
    /// 是否携带执行回调
    #[inline]
    pub fn has_callback(&self) -> bool {
        self.executor.is_some()
    }

    /// 是否携带任何 barrier
    pub fn has_barriers(&self) -> bool {
        self.pre_global_barrier.is_some() || !self.pre_image_barriers.is_empty() || !self.pre_buffer_barriers.is_empty()
    }

    /// 调用 Pass 的执行回调（若有）
    pub fn execute(&self, ctx: &RgPassContext<'_>) {
        if let Some(executor) = &self.executor {
            executor.execute(ctx);
        }
    }
}

/// 可执行 section：一次队列提交的粒度
pub struct RgExecutableSection<'a> {
    /// 按执行顺序排列的 Pass
    pub passes: Vec<RgExecutablePass<'a>>,

    /// 提交前 wait 的 semaphore（swapchain acquire）
    pub wait_acquire_semaphore: Option<RgSemaphoreInfo>,
    /// 提交时 signal 的 semaphore（present 依赖）
    pub signal_present_semaphore: Option<RgSemaphoreInfo>,
    /// 提交时 signal 的 fence
    pub signal_fence: Option<vk::Fence>,

    /// section 末尾的图像 barrier（swapchain 的 present layout 转换）
    pub post_image_barriers: Vec<RgImageBarrier>,

    /// 提交本 section 之前要求队列空闲
    pub sync_before_exec: bool,
}

/// 编译后的渲染图
///
/// 生命周期 `'a` 是 Pass 借用的外部资源的生命周期，
/// 执行计划不能比这些外部资源活得更久。
pub struct RgExecutableGraph<'a> {
    /// 按提交顺序排列的 section
    pub sections: Vec<RgExecutableSection<'a>>,
    /// 物理资源绑定与帧末状态
    pub resources: RgExecutableResources,

    /// 跨队列导入资源的 release barrier，调用方必须在持有队列上先行提交
    pub release_image_barriers: Vec<RgImageBarrier>,
    /// 同上，缓冲区部分
    pub release_buffer_barriers: Vec<RgBufferBarrier>,

    /// 整帧完成时 signal 的 fence
    pub complete_fence: Option<vk::Fence>,
}

impl std::fmt::Debug for RgExecutableGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgExecutableGraph")
            .field("sections", &self.sections.len())
            .field("release_image_barriers", &self.release_image_barriers.len())
            .field("release_buffer_barriers", &self.release_buffer_barriers.len())
            .field("complete_fence", &self.complete_fence)
            .finish_non_exhaustive()
    }
}

impl RgExecutableGraph<'_> {
    /// Pass 总数
    pub fn pass_count(&self) -> usize {
        self.sections.iter().map(|section| section.passes.len()).sum()
    }

    /// 遍历所有 Pass（跨 section，按执行顺序）
    pub fn iter_passes(&self) -> impl Iterator<Item = &RgExecutablePass<'_>> {
        self.sections.iter().flat_map(|section| section.passes.iter())
    }
}

// 调试输出
impl RgExecutableGraph<'_> {
    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 section 的同步原语和每个 Pass 的 barrier 详情。
    pub fn log_execution_plan(&self) {
        log::info!("========== RenderGraph Execution Plan ==========");
        log::info!("{} section(s), {} pass(es)", self.sections.len(), self.pass_count());

        for barrier in &self.release_image_barriers {
            log::info!("  release image barrier{}", format_transfer(barrier.queue_transfer));
        }
        for barrier in &self.release_buffer_barriers {
            log::info!("  release buffer barrier{}", format_transfer(barrier.queue_transfer));
        }

        for (section_index, section) in self.sections.iter().enumerate() {
            log::info!("┌─ Section {}", section_index);
            if let Some(wait) = &section.wait_acquire_semaphore {
                log::info!("│  wait acquire semaphore @ {}", format_pipeline_stage(wait.stage));
            }
            if section.sync_before_exec {
                log::info!("│  sync queue before execution");
            }

            for pass in &section.passes {
                log::info!("│  Pass \"{}\"{}", pass.name, if pass.has_callback() { "" } else { " (dummy)" });

                if let Some(global) = &pass.pre_global_barrier {
                    log::info!(
                        "│    global barrier: [{} / {}] -> [{} / {}]",
                        format_pipeline_stage(global.src_stage),
                        format_access_flags(global.src_access),
                        format_pipeline_stage(global.dst_stage),
                        format_access_flags(global.dst_access),
                    );
                }
                for barrier in &pass.pre_image_barriers {
                    log::info!(
                        "│    image barrier (mip {}, layer {}): {:?} -> {:?}, [{} / {}] -> [{} / {}]{}",
                        barrier.subresource.mip_level,
                        barrier.subresource.array_layer,
                        barrier.old_layout,
                        barrier.new_layout,
                        format_pipeline_stage(barrier.src_stage),
                        format_access_flags(barrier.src_access),
                        format_pipeline_stage(barrier.dst_stage),
                        format_access_flags(barrier.dst_access),
                        format_transfer(barrier.queue_transfer),
                    );
                }
                for barrier in &pass.pre_buffer_barriers {
                    log::info!(
                        "│    buffer barrier: [{} / {}] -> [{} / {}]{}",
                        format_pipeline_stage(barrier.src_stage),
                        format_access_flags(barrier.src_access),
                        format_pipeline_stage(barrier.dst_stage),
                        format_access_flags(barrier.dst_access),
                        format_transfer(barrier.queue_transfer),
                    );
                }
            }

            for barrier in &section.post_image_barriers {
                log::info!("│  post barrier: {:?} -> {:?}", barrier.old_layout, barrier.new_layout);
            }
            if let Some(signal) = &section.signal_present_semaphore {
                log::info!("│  signal present semaphore @ {}", format_pipeline_stage(signal.stage));
            }
            if section.signal_fence.is_some() {
                log::info!("│  signal fence");
            }
            log::info!("└─");
        }
    }
}

fn format_transfer(transfer: Option<(u32, u32)>) -> String {
    match transfer {
        Some((src, dst)) => format!(" [queue transfer {} -> {}]", src, dst),
        None => String::new(),
    }
}

/// 格式化 PipelineStageFlags2 为可读字符串
pub(crate) fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    if stage.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<&str> =
        STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub(crate) fn format_access_flags(access: vk::AccessFlags2) -> String {
    const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];

    if access.is_empty() {
        return "NONE".to_string();
    }
    let names: Vec<&str> =
        ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}
