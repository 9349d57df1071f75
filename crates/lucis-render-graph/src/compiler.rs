//! 渲染图编译器
//!
//! 把一帧声明式的 Pass/资源描述编译成可执行计划：
//!
//! 1. 展开使用声明到 subresource 粒度
//! 2. 拓扑排序（显式边 + 可选的声明顺序合成边）
//! 3. 按排序后顺序收集每个资源粒度的使用序列
//! 4. 在 fence 和 swapchain 边界划分 section
//! 5. 给 swapchain 的首末 section 挂 acquire/present semaphore
//! 6. 绑定外部资源、从瞬态池分配内部资源、记录帧末状态
//! 7. 合并相容的连续使用成 run，在 run 之间生成并放置 barrier
//! 8. 简化 access mask、可选地合并 global barrier，产出执行计划
//!
//! 编译是纯同步计算，不触碰 GPU。

use ash::vk;
use itertools::Itertools;
use slotmap::SecondaryMap;

use crate::barrier::{RgBufferBarrier, RgGlobalBarrier, RgImageBarrier};
use crate::error::RgCompileError;
use crate::executable::{
    RgBufferRecord, RgExecutableGraph, RgExecutablePass, RgExecutableResources, RgExecutableSection, RgImageRecord,
};
use crate::graph::DependencyGraph;
use crate::image_resource::{RgImageSource, RgSwapchainSync};
use crate::pass::RgPassNode;
use crate::resource_handle::{RgBufferHandle, RgImageHandle};
use crate::resource_registry::RgResourceRegistry;
use crate::resource_state::{RgBufferState, RgImageState, is_read_only_access, is_write_only_access};
use crate::semaphore_info::RgSemaphoreInfo;
use crate::subresource::{RgSubresource, RgSubresourceMap};
use lucis_render_interface::allocator::GfxTransientResourcePool;

bitflags::bitflags! {
    /// 编译选项
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RgCompileOptions: u32 {
        /// 按声明顺序为共享资源的 Pass 合成依赖边
        const CONNECT_PASSES_BY_DEFINITION_ORDER = 1 << 0;
        /// 合成边时合并相容的连续使用者（只读且同 layout），减少边数量
        const OPTIMIZE_PASS_CONNECTION = 1 << 1;
        /// 把同一个 Pass 上无 layout 转换的多个 barrier 合并成一个 global barrier
        const PREFER_GLOBAL_MEMORY_BARRIER = 1 << 2;
        /// 开启完整校验（对应 debug 构建的断言语义）
        const STRICT_VALIDATION = 1 << 3;
    }
}

impl Default for RgCompileOptions {
    fn default() -> Self {
        Self::CONNECT_PASSES_BY_DEFINITION_ORDER
    }
}

/// 展开后的单个 Pass 使用表（缓冲区整体，图像按 subresource）
struct ExpandedUsage {
    buffers: SecondaryMap<RgBufferHandle, RgBufferState>,
    images: SecondaryMap<RgImageHandle, RgSubresourceMap<Option<RgImageState>>>,
}

/// 资源粒度使用序列中的一项
#[derive(Clone, Copy, Debug)]
struct RgBufferUser {
    /// 排序后的 Pass 索引
    pass_index: usize,
    state: RgBufferState,
}

#[derive(Clone, Copy, Debug)]
struct RgImageUser {
    /// 排序后的 Pass 索引
    pass_index: usize,
    state: RgImageState,
}

/// 编译期 section：一次提交粒度内的 Pass 序列与同步需求
struct CompileSection {
    /// 排序后的 Pass 索引
    passes: Vec<usize>,

    wait_acquire: bool,
    wait_acquire_stages: vk::PipelineStageFlags2,

    signal_present: bool,
    signal_present_stages: vk::PipelineStageFlags2,

    signal_fence: Option<vk::Fence>,
    present_barrier: Option<RgImageBarrier>,
    sync_before_exec: bool,
}

impl CompileSection {
    fn new(sync_before_exec: bool) -> Self {
        Self {
            passes: Vec::new(),
            wait_acquire: false,
            wait_acquire_stages: vk::PipelineStageFlags2::NONE,
            signal_present: false,
            signal_present_stages: vk::PipelineStageFlags2::NONE,
            signal_fence: None,
            present_barrier: None,
            sync_before_exec,
        }
    }
}

/// 编译期 Pass：已放置到该 Pass 上的 barrier
#[derive(Default)]
struct CompilePass {
    pre_image_barriers: Vec<RgImageBarrier>,
    pre_buffer_barriers: Vec<RgBufferBarrier>,
}

impl CompilePass {
    fn has_barriers(&self) -> bool {
        !self.pre_image_barriers.is_empty() || !self.pre_buffer_barriers.is_empty()
    }
}

/// 渲染图编译器
///
/// 一次性消费 builder 产出的图描述，产出 [`RgExecutableGraph`]。
pub(crate) struct RgCompiler<'a> {
    options: RgCompileOptions,
    strict: bool,

    resources: RgResourceRegistry,
    passes: Vec<RgPassNode<'a>>,
    swapchain_image: Option<RgImageHandle>,
    complete_fence: Option<vk::Fence>,
    queue_family_index: u32,

    /// 按声明顺序展开的使用表
    expanded: Vec<ExpandedUsage>,
    /// 排序后位置 -> 声明顺序索引
    sorted_passes: Vec<usize>,
    /// 每个缓冲区的使用序列（按排序后 Pass 索引递增）
    buffer_users: SecondaryMap<RgBufferHandle, Vec<RgBufferUser>>,
    /// 每个图像 subresource 的使用序列
    image_users: SecondaryMap<RgImageHandle, RgSubresourceMap<Vec<RgImageUser>>>,

    sections: Vec<CompileSection>,
    /// 排序后 Pass 索引 -> section 索引
    pass_to_section: Vec<usize>,
    /// 排序后 Pass 索引 -> 已放置的 barrier
    compile_passes: Vec<CompilePass>,

    /// 跨队列导入资源的 release barrier（交给持有队列提交）
    release_image_barriers: Vec<RgImageBarrier>,
    release_buffer_barriers: Vec<RgBufferBarrier>,
}

impl<'a> RgCompiler<'a> {
    pub(crate) fn new(
        options: RgCompileOptions,
        resources: RgResourceRegistry,
        passes: Vec<RgPassNode<'a>>,
        swapchain_image: Option<RgImageHandle>,
        complete_fence: Option<vk::Fence>,
        queue_family_index: u32,
    ) -> Self {
        let pass_count = passes.len();
        Self {
            strict: options.contains(RgCompileOptions::STRICT_VALIDATION),
            options,
            resources,
            passes,
            swapchain_image,
            complete_fence,
            queue_family_index,
            expanded: Vec::with_capacity(pass_count),
            sorted_passes: Vec::new(),
            buffer_users: SecondaryMap::new(),
            image_users: SecondaryMap::new(),
            sections: Vec::new(),
            pass_to_section: Vec::new(),
            compile_passes: Vec::new(),
            release_image_barriers: Vec::new(),
            release_buffer_barriers: Vec::new(),
        }
    }

    /// 编译
    pub(crate) fn compile(
        mut self,
        pool: &mut dyn GfxTransientResourcePool,
    ) -> Result<RgExecutableGraph<'a>, RgCompileError> {
        self.expand_usages()?;
        self.sort_passes()?;
        self.collect_resource_users();
        self.generate_sections()?;
        self.generate_semaphores();

        let mut resources = RgExecutableResources::default();
        self.bind_resources(&mut resources, pool);

        self.compile_passes = (0..self.sorted_passes.len()).map(|_| CompilePass::default()).collect();
        self.generate_barriers();

        log::debug!(
            "render graph compiled: {} pass(es), {} section(s)",
            self.sorted_passes.len(),
            self.sections.len()
        );
        Ok(self.fill_executable(resources))
    }

    /// 把每个 Pass 的使用声明展开、合并到 subresource 粒度
    fn expand_usages(&mut self) -> Result<(), RgCompileError> {
        for pass in &self.passes {
            let mut usage = ExpandedUsage {
                buffers: SecondaryMap::new(),
                images: SecondaryMap::new(),
            };

            for &(handle, state) in &pass.buffer_uses {
                match usage.buffers.get_mut(handle) {
                    Some(prev) => *prev = prev.merge(&state),
                    None => {
                        usage.buffers.insert(handle, state);
                    }
                }
            }

            for image_use in &pass.image_uses {
                let image = self.resources.get_image(image_use.handle).expect("image handle not registered");

                if self.strict && image.is_read_only() {
                    if image_use.state.is_write() {
                        return Err(RgCompileError::ReadOnlyImageWritten {
                            image: image.name.clone(),
                            pass: pass.name.clone(),
                        });
                    }
                    if image_use.state.layout != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
                        return Err(RgCompileError::ReadOnlyImageBadLayout {
                            image: image.name.clone(),
                            pass: pass.name.clone(),
                            layout: image_use.state.layout,
                        });
                    }
                }

                let (mip_levels, array_layers) = (image.mip_levels, image.array_layers);
                let grid = usage
                    .images
                    .entry(image_use.handle)
                    .unwrap()
                    .or_insert_with(|| RgSubresourceMap::new(mip_levels, array_layers));
                for subrsc in image_use.range.iter_clamped(mip_levels, array_layers) {
                    match &mut grid[subrsc] {
                        Some(prev) => {
                            // 同一个 Pass 内对同一个 subresource 的重复声明：layout 必须一致
                            if prev.layout != image_use.state.layout {
                                return Err(RgCompileError::IncompatibleLayoutMerge {
                                    image: image.name.clone(),
                                    pass: pass.name.clone(),
                                });
                            }
                            *prev = prev.merge(&image_use.state);
                        }
                        cell => *cell = Some(image_use.state),
                    }
                }
            }

            self.expanded.push(usage);
        }
        Ok(())
    }

    /// 构建依赖图并拓扑排序
    fn sort_passes(&mut self) -> Result<(), RgCompileError> {
        let mut graph = DependencyGraph::new(self.passes.len());
        for (pass_index, pass) in self.passes.iter().enumerate() {
            for &succ in &pass.succs {
                graph.add_edge(pass_index, succ);
            }
            for &prev in &pass.prevs {
                graph.add_edge(prev, pass_index);
            }
        }

        if self.options.contains(RgCompileOptions::CONNECT_PASSES_BY_DEFINITION_ORDER) {
            self.connect_by_definition_order(&mut graph);
        }

        match graph.topological_sort() {
            Ok(order) => {
                self.sorted_passes = order;
                Ok(())
            }
            Err(remaining) => Err(RgCompileError::CycleDetected {
                passes: remaining.iter().map(|&i| self.passes[i].name.clone()).collect_vec(),
            }),
        }
    }

    /// 按声明顺序合成依赖边
    ///
    /// 对每个资源粒度：上一组使用者连向下一个使用者。开启
    /// `OPTIMIZE_PASS_CONNECTION` 时，相容的连续使用（只读且图像同
    /// layout）合并为同一组，组内不连边。
    fn connect_by_definition_order(&self, graph: &mut DependencyGraph) {
        let optimize = self.options.contains(RgCompileOptions::OPTIMIZE_PASS_CONNECTION);

        #[derive(Clone)]
        struct UserRecord {
            prev_users: Vec<usize>,
            users: Vec<usize>,
            layout: vk::ImageLayout,
            read_only: bool,
        }
        impl Default for UserRecord {
            fn default() -> Self {
                Self {
                    prev_users: Vec::new(),
                    users: Vec::new(),
                    layout: vk::ImageLayout::UNDEFINED,
                    read_only: false,
                }
            }
        }

        let mut buffer_records: SecondaryMap<RgBufferHandle, UserRecord> = SecondaryMap::new();
        let mut image_records: SecondaryMap<RgImageHandle, RgSubresourceMap<UserRecord>> = SecondaryMap::new();

        for (pass_index, usage) in self.expanded.iter().enumerate() {
            for (handle, state) in &usage.buffers {
                let record = buffer_records.entry(handle).unwrap().or_insert_with(UserRecord::default);
                let read_only = state.is_read_only();
                if optimize && record.read_only && read_only {
                    record.users.push(pass_index);
                } else {
                    record.prev_users = std::mem::take(&mut record.users);
                    record.users = vec![pass_index];
                    record.read_only = read_only;
                }
                for &prev in &record.prev_users {
                    graph.add_edge(prev, pass_index);
                }
            }

            for (handle, grid) in &usage.images {
                let records = image_records
                    .entry(handle)
                    .unwrap()
                    .or_insert_with(|| RgSubresourceMap::new(grid.mip_levels(), grid.array_layers()));
                for (subrsc, cell) in grid.iter() {
                    let Some(state) = cell else { continue };
                    let record = &mut records[subrsc];
                    let read_only = state.is_read_only();
                    if optimize && record.read_only && read_only && record.layout == state.layout {
                        record.users.push(pass_index);
                    } else {
                        record.prev_users = std::mem::take(&mut record.users);
                        record.users = vec![pass_index];
                        record.read_only = read_only;
                        record.layout = state.layout;
                    }
                    for &prev in &record.prev_users {
                        graph.add_edge(prev, pass_index);
                    }
                }
            }
        }
    }

    /// 按排序后顺序收集每个资源粒度的使用序列
    fn collect_resource_users(&mut self) {
        for (sorted_index, &pass_index) in self.sorted_passes.iter().enumerate() {
            let usage = &self.expanded[pass_index];

            for (handle, state) in &usage.buffers {
                self.buffer_users
                    .entry(handle)
                    .unwrap()
                    .or_insert_with(Vec::new)
                    .push(RgBufferUser { pass_index: sorted_index, state: *state });
            }

            for (handle, grid) in &usage.images {
                let users = self
                    .image_users
                    .entry(handle)
                    .unwrap()
                    .or_insert_with(|| RgSubresourceMap::new(grid.mip_levels(), grid.array_layers()));
                for (subrsc, cell) in grid.iter() {
                    if let Some(state) = cell {
                        users[subrsc].push(RgImageUser { pass_index: sorted_index, state: *state });
                    }
                }
            }
        }
    }

    /// swapchain image 的使用序列（未登记或未被使用时为 None）
    fn swapchain_users(&self) -> Option<&[RgImageUser]> {
        let handle = self.swapchain_image?;
        let grid = self.image_users.get(handle)?;
        let users = &grid[RgSubresource::new(0, 0)];
        if users.is_empty() { None } else { Some(users) }
    }

    /// 划分 section
    ///
    /// 新 section 开始于：上一个 Pass 带 signal fence、上一个 Pass 是
    /// swapchain image 的最后一个使用者、或当前 Pass 要求执行前队列同步。
    fn generate_sections(&mut self) -> Result<(), RgCompileError> {
        let swapchain_last_pass = self.swapchain_users().and_then(|users| users.last()).map(|user| user.pass_index);

        let pass_count = self.sorted_passes.len();
        let mut need_new_section = true;
        let mut need_sync_before_exec = false;

        for sorted_index in 0..pass_count {
            if need_new_section {
                self.sections.push(CompileSection::new(need_sync_before_exec));
            }

            let section_index = self.sections.len() - 1;
            self.pass_to_section.push(section_index);

            let pass = &self.passes[self.sorted_passes[sorted_index]];
            let section = &mut self.sections[section_index];
            section.passes.push(sorted_index);

            if let Some(fence) = pass.signal_fence {
                // 每个 section 至多一个 signal fence；fence 本身就是 section
                // 边界，除非上游状态被破坏否则不会触发
                if section.signal_fence.is_some() && self.strict {
                    return Err(RgCompileError::DuplicateSignalFence { pass: pass.name.clone() });
                }
                section.signal_fence = Some(fence);
            }

            need_new_section = pass.signal_fence.is_some();
            need_new_section |= swapchain_last_pass == Some(sorted_index);

            need_sync_before_exec =
                sorted_index + 1 < pass_count && self.passes[self.sorted_passes[sorted_index + 1]].sync_before_exec;
            need_new_section |= need_sync_before_exec;
        }
        Ok(())
    }

    /// 给 swapchain 的首末 section 挂 acquire/present semaphore
    ///
    /// stage mask 取首（末）使用者与其后（前）所有无 barrier 间隔的
    /// 使用者的并集：这些使用可以和首（末）使用并发执行。
    fn generate_semaphores(&mut self) {
        let Some(users) = self.swapchain_users() else {
            return;
        };

        let first = users[0];
        let mut first_stages = first.state.stage;
        for user in users[1..].iter() {
            if !user.state.dont_need_barrier(&first.state) {
                break;
            }
            first_stages |= user.state.stage;
        }
        let first_section = self.pass_to_section[first.pass_index];

        let last = *users.last().unwrap();
        let mut last_stages = last.state.stage;
        for user in users.iter().rev().skip(1) {
            if !user.state.dont_need_barrier(&last.state) {
                break;
            }
            last_stages |= user.state.stage;
        }
        let last_section = self.pass_to_section[last.pass_index];

        let section = &mut self.sections[first_section];
        section.wait_acquire = true;
        section.wait_acquire_stages |= first_stages;

        let section = &mut self.sections[last_section];
        section.signal_present = true;
        section.signal_present_stages |= last_stages;
    }

    /// 绑定外部资源、分配瞬态资源、记录帧末状态
    fn bind_resources(&mut self, resources: &mut RgExecutableResources, pool: &mut dyn GfxTransientResourcePool) {
        use crate::buffer_resource::RgBufferSource;

        for (handle, res) in self.resources.iter_buffers() {
            let users = self.buffer_users.get(handle).map(|users| users.as_slice()).unwrap_or(&[]);
            let final_state = if users.is_empty() { res.current_state } else { buffer_tail_state(users) };
            let physical = match &res.source {
                RgBufferSource::Imported { handle: physical, .. } => Some(*physical),
                RgBufferSource::Transient { desc } => {
                    if users.is_empty() {
                        // 没有任何 Pass 使用，跳过分配
                        None
                    } else {
                        Some(pool.alloc_buffer(desc, &res.name))
                    }
                }
            };
            resources.buffers.insert(handle, RgBufferRecord { handle: physical, final_state });
        }

        for (handle, res) in self.resources.iter_images() {
            let users_grid = self.image_users.get(handle);
            let mut final_state: RgSubresourceMap<Option<RgImageState>> =
                RgSubresourceMap::new(res.mip_levels, res.array_layers);
            let mut used = false;

            for (subrsc, cell) in final_state.iter_mut() {
                let users = users_grid.map(|grid| grid[subrsc].as_slice()).unwrap_or(&[]);
                if users.is_empty() {
                    *cell = match &res.source {
                        RgImageSource::Transient { .. } => None,
                        _ => Some(res.current_state[subrsc]),
                    };
                } else {
                    used = true;
                    *cell = Some(image_tail_state(users));
                }
            }

            if res.is_swapchain() {
                // swapchain image 帧末必然处于 present layout
                final_state[RgSubresource::new(0, 0)] = Some(RgImageState::PRESENT);
            }

            let physical = match &res.source {
                RgImageSource::Imported { handle: physical, .. } | RgImageSource::Swapchain { handle: physical, .. } => {
                    Some(*physical)
                }
                RgImageSource::Transient { desc } => {
                    if used {
                        Some(pool.alloc_image(desc, &res.name))
                    } else {
                        None
                    }
                }
            };
            resources.images.insert(handle, RgImageRecord { handle: physical, final_state });
        }
    }

    /// 生成并放置 barrier
    ///
    /// 每个资源粒度：把使用序列贪心切分成无需内部 barrier 的最大 run，
    /// run 之间生成一个状态转换 barrier。放置窗口是
    /// `[上一 run 最后 Pass + 1, 下一 run 首个 Pass]`，从窗口末端向前
    /// 找已有 barrier 的 Pass 批量放置，减少打断管线的位置数。
    fn generate_barriers(&mut self) {
        // 缓冲区
        for (handle, res) in self.resources.iter_buffers() {
            let Some(users) = self.buffer_users.get(handle) else {
                continue;
            };
            if users.is_empty() {
                continue;
            }

            let mut last_state = res.current_state;
            let mut pending_transfer = res
                .owner_queue_family()
                .filter(|&family| family != self.queue_family_index)
                .map(|family| (family, self.queue_family_index));

            let mut user_index = 0;
            while user_index < users.len() {
                let mut next_index = user_index + 1;
                while next_index < users.len() && users[next_index].state.dont_need_barrier(&users[user_index].state) {
                    next_index += 1;
                }

                let mut curr_state = RgBufferState::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE);
                for user in &users[user_index..next_index] {
                    curr_state = curr_state.merge(&user.state);
                }

                if pending_transfer.is_none() && last_state.dont_need_barrier(&curr_state) {
                    curr_state = curr_state.merge(&last_state);
                    last_state = curr_state;
                    user_index = next_index;
                    continue;
                }

                let min_pass = if user_index > 0 { users[user_index - 1].pass_index + 1 } else { 0 };
                let max_pass = users[user_index].pass_index;
                let barrier_pass = self.pick_barrier_pass(min_pass, max_pass);

                let barrier = RgBufferBarrier {
                    buffer: handle,
                    src_stage: last_state.stage,
                    src_access: last_state.access,
                    dst_stage: curr_state.stage,
                    dst_access: curr_state.access,
                    queue_transfer: pending_transfer.take(),
                };
                if barrier.queue_transfer.is_some() {
                    self.release_buffer_barriers.push(barrier);
                }
                self.compile_passes[barrier_pass].pre_buffer_barriers.push(barrier);

                last_state = curr_state;
                user_index = next_index;
            }
        }

        // 图像（按 subresource）
        let mut swapchain_used = false;
        for (handle, res) in self.resources.iter_images() {
            let Some(users_grid) = self.image_users.get(handle) else {
                continue;
            };
            let is_swapchain = res.is_swapchain();
            let aspect = res.infer_aspect();
            let owner_transfer = res
                .owner_queue_family()
                .filter(|&family| family != self.queue_family_index)
                .map(|family| (family, self.queue_family_index));

            for (subrsc, users) in users_grid.iter() {
                if users.is_empty() {
                    continue;
                }
                swapchain_used |= is_swapchain;

                let mut last_state = res.current_state[subrsc];
                let mut pending_transfer = owner_transfer;

                let mut user_index = 0;
                while user_index < users.len() {
                    let mut next_index = user_index + 1;
                    while next_index < users.len()
                        && users[next_index].state.dont_need_barrier(&users[user_index].state)
                    {
                        next_index += 1;
                    }

                    let mut curr_state = RgImageState::new(
                        vk::PipelineStageFlags2::NONE,
                        vk::AccessFlags2::NONE,
                        users[user_index].state.layout,
                    );
                    for user in &users[user_index..next_index] {
                        curr_state = curr_state.merge(&user.state);
                    }

                    if pending_transfer.is_none() && last_state.dont_need_barrier(&curr_state) {
                        curr_state.stage |= last_state.stage;
                        curr_state.access |= last_state.access;
                        last_state = curr_state;
                        user_index = next_index;
                        continue;
                    }

                    let mut min_pass = if user_index > 0 { users[user_index - 1].pass_index + 1 } else { 0 };
                    if user_index == 0 && is_swapchain {
                        // swapchain 的首个 barrier 不能放到 acquire 等待所在
                        // section 之前
                        let first_section = self.pass_to_section[users[0].pass_index];
                        while self.pass_to_section[min_pass] != first_section {
                            min_pass += 1;
                        }
                    }
                    let max_pass = users[user_index].pass_index;
                    let barrier_pass = self.pick_barrier_pass(min_pass, max_pass);

                    let is_clean_swapchain_entry = is_swapchain
                        && user_index == 0
                        && last_state.stage == vk::PipelineStageFlags2::NONE
                        && last_state.access == vk::AccessFlags2::NONE;
                    let barrier = if is_clean_swapchain_entry {
                        // acquire semaphore 已经完成了执行依赖；这里只做
                        // layout 转换，src stage 对齐到 dst stage 即可
                        RgImageBarrier {
                            image: handle,
                            subresource: subrsc,
                            aspect,
                            src_stage: curr_state.stage,
                            src_access: vk::AccessFlags2::NONE,
                            old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                            dst_stage: curr_state.stage,
                            dst_access: curr_state.access,
                            new_layout: curr_state.layout,
                            queue_transfer: None,
                        }
                    } else {
                        RgImageBarrier {
                            image: handle,
                            subresource: subrsc,
                            aspect,
                            src_stage: last_state.stage,
                            src_access: last_state.access,
                            old_layout: last_state.layout,
                            dst_stage: curr_state.stage,
                            dst_access: curr_state.access,
                            new_layout: curr_state.layout,
                            queue_transfer: pending_transfer.take(),
                        }
                    };
                    if barrier.queue_transfer.is_some() {
                        self.release_image_barriers.push(barrier);
                    }
                    self.compile_passes[barrier_pass].pre_image_barriers.push(barrier);

                    last_state = curr_state;
                    user_index = next_index;
                }

                if is_swapchain {
                    // 最后一个使用 section 的末尾转换到 present layout
                    let last_section = self.pass_to_section[users.last().unwrap().pass_index];
                    self.sections[last_section].present_barrier = Some(RgImageBarrier {
                        image: handle,
                        subresource: subrsc,
                        aspect,
                        src_stage: last_state.stage,
                        src_access: if is_read_only_access(last_state.access) {
                            vk::AccessFlags2::NONE
                        } else {
                            last_state.access
                        },
                        old_layout: last_state.layout,
                        dst_stage: vk::PipelineStageFlags2::NONE,
                        dst_access: vk::AccessFlags2::NONE,
                        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                        queue_transfer: None,
                    });
                }
            }
        }

        // swapchain 登记了但没有任何 Pass 使用：仍要转换到 present layout
        if !swapchain_used
            && let Some(handle) = self.swapchain_image
        {
            let res = self.resources.get_image(handle).unwrap();
            let state = res.current_state[RgSubresource::new(0, 0)];
            if state.layout != vk::ImageLayout::PRESENT_SRC_KHR {
                if self.sections.is_empty() {
                    self.sections.push(CompileSection::new(false));
                }
                self.sections.last_mut().unwrap().present_barrier = Some(RgImageBarrier {
                    image: handle,
                    subresource: RgSubresource::new(0, 0),
                    aspect: res.infer_aspect(),
                    src_stage: vk::PipelineStageFlags2::NONE,
                    src_access: vk::AccessFlags2::NONE,
                    old_layout: state.layout,
                    dst_stage: vk::PipelineStageFlags2::NONE,
                    dst_access: vk::AccessFlags2::NONE,
                    new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                    queue_transfer: None,
                });
            }
        }
    }

    /// 在放置窗口 `[min_pass, max_pass]` 内选择 barrier 所在的 Pass
    ///
    /// 从窗口末端向前找第一个已有 barrier 的 Pass，借用它的打断点；
    /// 找不到就放在窗口末端（下一 run 的首个 Pass）。
    fn pick_barrier_pass(&self, min_pass: usize, max_pass: usize) -> usize {
        for candidate in (min_pass..max_pass).rev() {
            if self.compile_passes[candidate].has_barriers() {
                return candidate;
            }
        }
        max_pass
    }

    /// 组装执行计划
    fn fill_executable(mut self, resources: RgExecutableResources) -> RgExecutableGraph<'a> {
        let prefer_global = self.options.contains(RgCompileOptions::PREFER_GLOBAL_MEMORY_BARRIER);

        let swapchain_sync: Option<RgSwapchainSync> = self
            .swapchain_image
            .and_then(|handle| self.resources.get_image(handle))
            .and_then(|res| match &res.source {
                RgImageSource::Swapchain { sync, .. } => Some(*sync),
                _ => None,
            });

        let mut initial_barrier_emitted = false;
        let sections = std::mem::take(&mut self.sections);
        let mut sections_out = Vec::with_capacity(sections.len());

        for section in sections {
            let mut passes_out = Vec::with_capacity(section.passes.len());
            for sorted_index in section.passes {
                let compile_pass = std::mem::take(&mut self.compile_passes[sorted_index]);
                let node = &mut self.passes[self.sorted_passes[sorted_index]];

                let mut pass_out = RgExecutablePass {
                    name: node.name.clone(),
                    pre_global_barrier: None,
                    pre_image_barriers: compile_pass.pre_image_barriers,
                    pre_buffer_barriers: compile_pass.pre_buffer_barriers,
                    executor: node.executor.take(),
                };

                simplify_access_masks(&mut pass_out);
                if prefer_global {
                    merge_global_barrier(&mut pass_out);
                }
                if !initial_barrier_emitted {
                    // 帧首 Pass 挂一个全量 barrier，隔离上一帧的所有访问
                    initial_barrier_emitted = true;
                    pass_out.pre_global_barrier = Some(RgGlobalBarrier {
                        src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
                        src_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                        dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
                        dst_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    });
                }

                passes_out.push(pass_out);
            }

            sections_out.push(RgExecutableSection {
                passes: passes_out,
                wait_acquire_semaphore: if section.wait_acquire {
                    let sync = swapchain_sync.expect("acquire wait generated without swapchain");
                    Some(RgSemaphoreInfo::binary(sync.acquire_semaphore, section.wait_acquire_stages))
                } else {
                    None
                },
                signal_present_semaphore: if section.signal_present {
                    let sync = swapchain_sync.expect("present signal generated without swapchain");
                    Some(RgSemaphoreInfo::binary(sync.present_semaphore, section.signal_present_stages))
                } else {
                    None
                },
                signal_fence: section.signal_fence,
                post_image_barriers: section.present_barrier.into_iter().collect(),
                sync_before_exec: section.sync_before_exec,
            });
        }

        RgExecutableGraph {
            sections: sections_out,
            resources,
            release_image_barriers: std::mem::take(&mut self.release_image_barriers),
            release_buffer_barriers: std::mem::take(&mut self.release_buffer_barriers),
            complete_fence: self.complete_fence,
        }
    }
}

/// 帧末状态：使用序列尾部无 barrier 间隔的 run 的合并状态
fn buffer_tail_state(users: &[RgBufferUser]) -> RgBufferState {
    let last = users.last().unwrap().state;
    let mut state = last;
    for user in users.iter().rev().skip(1) {
        if !user.state.dont_need_barrier(&last) {
            break;
        }
        state = state.merge(&user.state);
    }
    state
}

fn image_tail_state(users: &[RgImageUser]) -> RgImageState {
    let last = users.last().unwrap().state;
    let mut state = last;
    for user in users.iter().rev().skip(1) {
        if !user.state.dont_need_barrier(&last) {
            break;
        }
        state = state.merge(&user.state);
    }
    state
}

/// 去掉多余的 access mask：
/// - 前序状态只读时不需要等待可见性，src access 清空
/// - 后继状态只写（且图像 layout 不变）时不需要可用性，dst access 清空
///
/// 跨队列所有权转移的 barrier 不做简化，保证 release/acquire 两半参数一致。
fn simplify_access_masks(pass: &mut RgExecutablePass<'_>) {
    for barrier in &mut pass.pre_buffer_barriers {
        if barrier.queue_transfer.is_some() {
            continue;
        }
        if is_read_only_access(barrier.src_access) {
            barrier.src_access = vk::AccessFlags2::NONE;
        }
        if is_write_only_access(barrier.dst_access) {
            barrier.dst_access = vk::AccessFlags2::NONE;
        }
    }
    for barrier in &mut pass.pre_image_barriers {
        if barrier.queue_transfer.is_some() {
            continue;
        }
        if is_read_only_access(barrier.src_access) {
            barrier.src_access = vk::AccessFlags2::NONE;
        }
        if is_write_only_access(barrier.dst_access) && barrier.old_layout == barrier.new_layout {
            barrier.dst_access = vk::AccessFlags2::NONE;
        }
    }
}

/// 把无 layout 转换、无所有权转移的 barrier 合并成一个 global barrier
///
/// 至少减少两个独立 barrier 时才值得合并。
fn merge_global_barrier(pass: &mut RgExecutablePass<'_>) {
    let mergeable_buffers = pass.pre_buffer_barriers.iter().filter(|b| b.queue_transfer.is_none()).count();
    let mergeable_images = pass
        .pre_image_barriers
        .iter()
        .filter(|b| b.queue_transfer.is_none() && b.old_layout == b.new_layout)
        .count();
    if mergeable_buffers + mergeable_images < 2 {
        return;
    }

    let mut global = RgGlobalBarrier::default();
    pass.pre_buffer_barriers.retain(|barrier| {
        if barrier.queue_transfer.is_none() {
            global.src_stage |= barrier.src_stage;
            global.src_access |= barrier.src_access;
            global.dst_stage |= barrier.dst_stage;
            global.dst_access |= barrier.dst_access;
            false
        } else {
            true
        }
    });
    pass.pre_image_barriers.retain(|barrier| {
        if barrier.queue_transfer.is_none() && barrier.old_layout == barrier.new_layout {
            global.src_stage |= barrier.src_stage;
            global.src_access |= barrier.src_access;
            global.dst_stage |= barrier.dst_stage;
            global.dst_access |= barrier.dst_access;
            false
        } else {
            true
        }
    });
    pass.pre_global_barrier = Some(global);
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use ash::vk;
    use ash::vk::Handle;
    use slotmap::SlotMap;

    use super::*;
    use crate::builder::RenderGraphBuilder;
    use crate::buffer_resource::RgBufferResource;
    use crate::pass::{RgPass, RgPassBuilder, RgPassContext};
    use crate::subresource::RgSubresourceRange;
    use lucis_render_interface::desc::{GfxBufferDesc, GfxImageDesc};
    use lucis_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

    /// 测试用的瞬态资源池：只发放句柄并记录分配
    #[derive(Default)]
    struct MockPool {
        buffers: SlotMap<GfxBufferHandle, ()>,
        images: SlotMap<GfxImageHandle, ()>,
        buffer_allocs: Vec<String>,
        image_allocs: Vec<String>,
    }

    impl GfxTransientResourcePool for MockPool {
        fn alloc_buffer(&mut self, _desc: &GfxBufferDesc, name: &str) -> GfxBufferHandle {
            self.buffer_allocs.push(name.to_string());
            self.buffers.insert(())
        }

        fn alloc_image(&mut self, _desc: &GfxImageDesc, name: &str) -> GfxImageHandle {
            self.image_allocs.push(name.to_string());
            self.images.insert(())
        }
    }

    fn phys_buffer() -> GfxBufferHandle {
        let mut slots: SlotMap<GfxBufferHandle, ()> = SlotMap::with_key();
        slots.insert(())
    }

    fn phys_image() -> GfxImageHandle {
        let mut slots: SlotMap<GfxImageHandle, ()> = SlotMap::with_key();
        slots.insert(())
    }

    /// 声明若干缓冲区使用的 Pass
    struct BufferPass {
        uses: Vec<(RgBufferHandle, RgBufferState)>,
    }

    impl RgPass for BufferPass {
        fn setup(&mut self, builder: &mut RgPassBuilder<'_>) {
            for &(handle, state) in &self.uses {
                builder.use_buffer(handle, state);
            }
        }

        fn execute(&self, _ctx: &RgPassContext<'_>) {}
    }

    /// 声明若干整图使用的 Pass
    struct ImagePass {
        uses: Vec<(RgImageHandle, RgImageState)>,
    }

    impl RgPass for ImagePass {
        fn setup(&mut self, builder: &mut RgPassBuilder<'_>) {
            for &(handle, state) in &self.uses {
                builder.use_image(handle, state);
            }
        }

        fn execute(&self, _ctx: &RgPassContext<'_>) {}
    }

    /// 按 subresource 范围声明使用的 Pass
    struct SubresourcePass {
        uses: Vec<(RgImageHandle, RgSubresourceRange, RgImageState)>,
    }

    impl RgPass for SubresourcePass {
        fn setup(&mut self, builder: &mut RgPassBuilder<'_>) {
            for &(handle, range, state) in &self.uses {
                builder.use_image_subresource(handle, range, state);
            }
        }

        fn execute(&self, _ctx: &RgPassContext<'_>) {}
    }

    fn compile(builder: RenderGraphBuilder<'_>) -> RgExecutableGraph<'_> {
        let mut pool = MockPool::default();
        builder.compile(RgCompileOptions::default(), &mut pool).unwrap()
    }

    #[test]
    fn test_write_then_read_buffer() {
        // Pass "producer" 写入缓冲区，Pass "consumer" 读取：
        // consumer 前恰好一个 写 -> 读 barrier
        let mut builder = RenderGraphBuilder::new();
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNDEFINED);
        builder.add_pass("producer", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });
        builder.add_pass("consumer", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_READ_COMPUTE)] });

        let exec = compile(builder);
        let passes: Vec<_> = exec.iter_passes().collect();
        assert_eq!(passes.len(), 2);

        assert_eq!(passes[1].pre_buffer_barriers.len(), 1);
        let barrier = &passes[1].pre_buffer_barriers[0];
        assert_eq!(barrier.buffer, buf);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);

        // 全部在一个 section 内
        assert_eq!(exec.sections.len(), 1);
    }

    #[test]
    fn test_read_only_passes_no_barriers() {
        // 三个 Pass 以相同 layout 采样同一张图：彼此之间零 barrier；
        // 导入状态已经在采样 layout，连初始转换都不需要
        let resident = RgImageState::new(
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let mut builder = RenderGraphBuilder::new();
        let img = builder.import_image("env", phys_image(), vk::Format::R8G8B8A8_UNORM, 1, 1, resident);
        builder.add_pass("a", ImagePass { uses: vec![(img, RgImageState::SHADER_READ_FRAGMENT)] });
        builder.add_pass("b", ImagePass { uses: vec![(img, RgImageState::SHADER_READ_COMPUTE)] });
        builder.add_pass("c", ImagePass { uses: vec![(img, RgImageState::SHADER_READ_FRAGMENT)] });

        let mut pool = MockPool::default();
        let options = RgCompileOptions::default() | RgCompileOptions::OPTIMIZE_PASS_CONNECTION;
        let exec = builder.compile(options, &mut pool).unwrap();

        for pass in exec.iter_passes() {
            assert!(pass.pre_image_barriers.is_empty());
            assert!(pass.pre_buffer_barriers.is_empty());
        }

        // 帧末状态是整个只读 run 的并集
        let record = exec.resources.images.get(img).unwrap();
        let final_state = record.final_state[RgSubresource::new(0, 0)].unwrap();
        assert!(final_state.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(final_state.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert_eq!(final_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_cycle_detection() {
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_dummy_pass("a");
        let b = builder.add_dummy_pass("b");
        builder.connect(a, b);
        builder.connect(b, a);

        let mut pool = MockPool::default();
        let err = builder.compile(RgCompileOptions::default(), &mut pool).unwrap_err();
        match err {
            RgCompileError::CycleDetected { passes } => assert_eq!(passes, ["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_declaration_order_is_kept() {
        // 两个 Pass 写同一个缓冲区，没有显式边：按声明顺序合成依赖
        let mut builder = RenderGraphBuilder::new();
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNDEFINED);
        builder.add_pass("w1", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });
        builder.add_pass("w2", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });

        let exec = compile(builder);
        let names: Vec<_> = exec.iter_passes().map(|pass| pass.name.as_str()).collect();
        assert_eq!(names, ["w1", "w2"]);

        // 写 -> 写 需要一个 barrier
        let passes: Vec<_> = exec.iter_passes().collect();
        assert_eq!(passes[1].pre_buffer_barriers.len(), 1);
    }

    #[test]
    fn test_barrier_batching() {
        // 链 a -> b -> c -> d；r1 由 a 写 c 读，r2 由 b 写 d 读。
        // r2 的两个 barrier 都应该批量放到已有打断点的 Pass 上，
        // 而不是各自独立的 Pass。
        let mut builder = RenderGraphBuilder::new();
        let r1 = builder.import_buffer("r1", phys_buffer(), RgBufferState::UNDEFINED);
        let r2 = builder.import_buffer("r2", phys_buffer(), RgBufferState::UNDEFINED);
        let a = builder.add_pass("a", BufferPass { uses: vec![(r1, RgBufferState::STORAGE_WRITE_COMPUTE)] });
        let b = builder.add_pass("b", BufferPass { uses: vec![(r2, RgBufferState::STORAGE_WRITE_COMPUTE)] });
        let c = builder.add_pass("c", BufferPass { uses: vec![(r1, RgBufferState::STORAGE_READ_COMPUTE)] });
        let d = builder.add_pass("d", BufferPass { uses: vec![(r2, RgBufferState::STORAGE_READ_COMPUTE)] });
        builder.connect(a, b);
        builder.connect(b, c);
        builder.connect(c, d);

        let exec = compile(builder);
        let passes: Vec<_> = exec.iter_passes().collect();

        // r1 的初始转换在 a 上；r2 的初始转换批到同一点
        assert_eq!(passes[0].pre_buffer_barriers.len(), 2);
        assert!(passes[1].pre_buffer_barriers.is_empty());
        // 两个 写 -> 读 barrier 都落在 c 上（d 上没有新的打断点）
        assert_eq!(passes[2].pre_buffer_barriers.len(), 2);
        assert!(passes[3].pre_buffer_barriers.is_empty());

        let handles: Vec<_> = passes[2].pre_buffer_barriers.iter().map(|barrier| barrier.buffer).collect();
        assert!(handles.contains(&r1));
        assert!(handles.contains(&r2));
    }

    #[test]
    fn test_section_split_on_fence() {
        let fence = vk::Fence::from_raw(7);
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_dummy_pass("a");
        let b = builder.add_dummy_pass("b");
        let c = builder.add_dummy_pass("c");
        builder.connect(a, b);
        builder.connect(b, c);
        builder.set_signal_fence(b, fence);

        let exec = compile(builder);
        assert_eq!(exec.sections.len(), 2);
        assert_eq!(exec.sections[0].passes.len(), 2);
        assert_eq!(exec.sections[1].passes.len(), 1);
        assert_eq!(exec.sections[0].signal_fence, Some(fence));
        assert!(exec.sections[1].signal_fence.is_none());
    }

    #[test]
    fn test_sync_before_exec_splits_section() {
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_dummy_pass("a");
        let b = builder.add_dummy_pass("b");
        builder.connect(a, b);
        builder.sync_queue_before_execution(b);

        let exec = compile(builder);
        assert_eq!(exec.sections.len(), 2);
        assert!(!exec.sections[0].sync_before_exec);
        assert!(exec.sections[1].sync_before_exec);
    }

    #[test]
    fn test_swapchain_contract() {
        let acquire = vk::Semaphore::from_raw(1);
        let present = vk::Semaphore::from_raw(2);
        let mut builder = RenderGraphBuilder::new();
        let swapchain =
            builder.register_swapchain_image("backbuffer", phys_image(), vk::Format::B8G8R8A8_UNORM, acquire, present);
        builder.add_pass("draw", ImagePass { uses: vec![(swapchain, RgImageState::COLOR_ATTACHMENT_WRITE)] });
        builder.add_pass("overlay", ImagePass { uses: vec![(swapchain, RgImageState::COLOR_ATTACHMENT_READ_WRITE)] });

        let exec = compile(builder);
        assert_eq!(exec.sections.len(), 1);
        let section = &exec.sections[0];

        // 首个使用 section 等 acquire semaphore；stage 并集覆盖整个无 barrier 的 run
        let wait = section.wait_acquire_semaphore.unwrap();
        assert_eq!(wait.semaphore, acquire);
        assert_eq!(wait.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

        // 最后一个使用 section signal present semaphore
        let signal = section.signal_present_semaphore.unwrap();
        assert_eq!(signal.semaphore, present);
        assert_eq!(signal.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

        // 首个 Pass 前做 acquire 后的 layout 转换
        assert_eq!(section.passes[0].pre_image_barriers.len(), 1);
        let entry = &section.passes[0].pre_image_barriers[0];
        assert_eq!(entry.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(entry.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(entry.src_access, vk::AccessFlags2::NONE);
        // 两个 render target Pass 之间不需要 barrier
        assert!(section.passes[1].pre_image_barriers.is_empty());

        // 恰好一个 present 转换 barrier
        assert_eq!(section.post_image_barriers.len(), 1);
        let present_barrier = &section.post_image_barriers[0];
        assert_eq!(present_barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(present_barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        // 帧末状态强制为 present
        let record = exec.resources.images.get(swapchain).unwrap();
        let final_state = record.final_state[RgSubresource::new(0, 0)].unwrap();
        assert_eq!(final_state.layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_swapchain_semaphore_stage_union_stops_at_barrier() {
        // P1 以 color attachment 写入，P2 以 storage 写入（layout 不同）：
        // acquire 只并 P1 的 stage，present 只并 P2 的 stage
        let acquire = vk::Semaphore::from_raw(3);
        let present = vk::Semaphore::from_raw(4);
        let mut builder = RenderGraphBuilder::new();
        let swapchain =
            builder.register_swapchain_image("backbuffer", phys_image(), vk::Format::B8G8R8A8_UNORM, acquire, present);
        builder.add_pass("draw", ImagePass { uses: vec![(swapchain, RgImageState::COLOR_ATTACHMENT_WRITE)] });
        builder.add_pass("post", ImagePass { uses: vec![(swapchain, RgImageState::STORAGE_WRITE_COMPUTE)] });

        let exec = compile(builder);
        let section = &exec.sections[0];
        assert_eq!(section.wait_acquire_semaphore.unwrap().stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(section.signal_present_semaphore.unwrap().stage, vk::PipelineStageFlags2::COMPUTE_SHADER);

        // P2 前有 COLOR -> GENERAL 的转换
        let transition = &section.passes[1].pre_image_barriers[0];
        assert_eq!(transition.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(transition.new_layout, vk::ImageLayout::GENERAL);
        // layout 变化时 dst access 不能被简化掉
        assert_eq!(transition.dst_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);

        // present 转换从 GENERAL 出发
        assert_eq!(section.post_image_barriers[0].old_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_swapchain_unused_still_presented() {
        // swapchain 登记了但没有 Pass 使用：最后一个 section 仍要补 present 转换
        let acquire = vk::Semaphore::from_raw(5);
        let present = vk::Semaphore::from_raw(6);
        let mut builder = RenderGraphBuilder::new();
        builder.register_swapchain_image("backbuffer", phys_image(), vk::Format::B8G8R8A8_UNORM, acquire, present);
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNDEFINED);
        builder.add_pass("unrelated", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });

        let exec = compile(builder);
        assert_eq!(exec.sections.len(), 1);
        let section = &exec.sections[0];
        assert!(section.wait_acquire_semaphore.is_none());
        assert_eq!(section.post_image_barriers.len(), 1);
        assert_eq!(section.post_image_barriers[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        // 完全空的图也一样：合成一个空 section 挂 present 转换
        let mut builder = RenderGraphBuilder::new();
        builder.register_swapchain_image("backbuffer", phys_image(), vk::Format::B8G8R8A8_UNORM, acquire, present);
        let exec = compile(builder);
        assert_eq!(exec.sections.len(), 1);
        assert!(exec.sections[0].passes.is_empty());
        assert_eq!(exec.sections[0].post_image_barriers.len(), 1);
    }

    #[test]
    fn test_final_state_writeback() {
        let mut builder = RenderGraphBuilder::new();
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNDEFINED);
        let untouched = builder.import_buffer("untouched", phys_buffer(), RgBufferState::TRANSFER_DST);
        builder.add_pass("producer", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });
        builder.add_pass("consumer", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_READ_COMPUTE)] });

        let exec = compile(builder);

        // 使用过的资源：帧末状态是尾部 run 的合并状态
        let record = exec.resources.buffers.get(buf).unwrap();
        assert_eq!(record.final_state.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(record.final_state.access, vk::AccessFlags2::SHADER_STORAGE_READ);

        // 未被使用的导入资源保持进入状态
        let record = exec.resources.buffers.get(untouched).unwrap();
        assert_eq!(record.final_state.access, vk::AccessFlags2::TRANSFER_WRITE);
    }

    #[test]
    fn test_transient_allocation() {
        let mut builder = RenderGraphBuilder::new();
        let used = builder.create_image(
            "gbuffer",
            GfxImageDesc::new_2d(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::STORAGE),
        );
        let unused = builder.create_buffer("scratch", GfxBufferDesc::new(256, vk::BufferUsageFlags::STORAGE_BUFFER));
        builder.add_pass("fill", ImagePass { uses: vec![(used, RgImageState::STORAGE_WRITE_COMPUTE)] });

        let mut pool = MockPool::default();
        let exec = builder.compile(RgCompileOptions::default(), &mut pool).unwrap();

        // 只有被使用的瞬态资源会分配
        assert_eq!(pool.image_allocs, ["gbuffer"]);
        assert!(pool.buffer_allocs.is_empty());
        assert!(exec.resources.image_binding(used).is_some());
        assert!(exec.resources.buffer_binding(unused).is_none());

        // 瞬态图像首次使用前从 UNDEFINED 转换进目标 layout
        let passes: Vec<_> = exec.iter_passes().collect();
        assert_eq!(passes[0].pre_image_barriers.len(), 1);
        let barrier = &passes[0].pre_image_barriers[0];
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_subresource_granularity_and_batching() {
        // 2 mip 的瞬态图像：mip0 先被拷贝写入再被采样，mip1 只在最后被采样。
        // mip1 的 UNDEFINED 转换批到 mip0 已有 barrier 的 Pass 上。
        let mut builder = RenderGraphBuilder::new();
        let img = builder.create_image(
            "chain",
            GfxImageDesc::new_2d(
                8,
                8,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .with_mips_layers(2, 1),
        );
        let upload = builder.add_pass(
            "upload",
            SubresourcePass {
                uses: vec![(img, RgSubresourceRange::single(0, 0), RgImageState::TRANSFER_DST)],
            },
        );
        let sample_mip0 = builder.add_pass(
            "sample-mip0",
            SubresourcePass {
                uses: vec![(img, RgSubresourceRange::single(0, 0), RgImageState::SHADER_READ_FRAGMENT)],
            },
        );
        let sample_mip1 = builder.add_pass(
            "sample-mip1",
            SubresourcePass {
                uses: vec![(img, RgSubresourceRange::single(1, 0), RgImageState::SHADER_READ_FRAGMENT)],
            },
        );
        // mip1 的使用者与 mip0 无资源依赖，用显式边固定顺序
        builder.connect(upload, sample_mip0);
        builder.connect(sample_mip0, sample_mip1);

        let exec = compile(builder);
        let passes: Vec<_> = exec.iter_passes().collect();

        // upload: mip0 UNDEFINED -> TRANSFER_DST
        assert_eq!(passes[0].pre_image_barriers.len(), 1);
        assert_eq!(passes[0].pre_image_barriers[0].subresource, RgSubresource::new(0, 0));

        // sample-mip0: mip0 TRANSFER_DST -> SHADER_READ_ONLY，
        // 且 mip1 的 UNDEFINED -> SHADER_READ_ONLY 批到同一个 Pass
        assert_eq!(passes[1].pre_image_barriers.len(), 2);
        let subresources: Vec<_> =
            passes[1].pre_image_barriers.iter().map(|barrier| barrier.subresource).collect();
        assert!(subresources.contains(&RgSubresource::new(0, 0)));
        assert!(subresources.contains(&RgSubresource::new(1, 0)));

        assert!(passes[2].pre_image_barriers.is_empty());
    }

    #[test]
    fn test_access_mask_simplification() {
        // 前序只读：src access 清空；后继只写且无 layout 变化：dst access 清空
        let mut builder = RenderGraphBuilder::new();
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNIFORM_COMPUTE);
        builder.add_pass("overwrite", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });

        let exec = compile(builder);
        let passes: Vec<_> = exec.iter_passes().collect();
        let barrier = &passes[0].pre_buffer_barriers[0];
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access, vk::AccessFlags2::NONE);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.dst_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_global_barrier_merge() {
        // 同一个 Pass 上的多个无 layout 转换 barrier 合并成一个 global barrier
        let mut builder = RenderGraphBuilder::new();
        let b1 = builder.import_buffer("b1", phys_buffer(), RgBufferState::UNDEFINED);
        let b2 = builder.import_buffer("b2", phys_buffer(), RgBufferState::UNDEFINED);
        builder.add_pass(
            "produce",
            BufferPass {
                uses: vec![
                    (b1, RgBufferState::STORAGE_WRITE_COMPUTE),
                    (b2, RgBufferState::STORAGE_WRITE_COMPUTE),
                ],
            },
        );
        builder.add_pass(
            "consume",
            BufferPass {
                uses: vec![
                    (b1, RgBufferState::STORAGE_READ_COMPUTE),
                    (b2, RgBufferState::STORAGE_READ_COMPUTE),
                ],
            },
        );

        let mut pool = MockPool::default();
        let options = RgCompileOptions::default() | RgCompileOptions::PREFER_GLOBAL_MEMORY_BARRIER;
        let exec = builder.compile(options, &mut pool).unwrap();
        let passes: Vec<_> = exec.iter_passes().collect();

        // consume 上的两个 barrier 被合并
        assert!(passes[1].pre_buffer_barriers.is_empty());
        let global = passes[1].pre_global_barrier.unwrap();
        assert!(global.src_access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));
        assert!(global.dst_access.contains(vk::AccessFlags2::SHADER_STORAGE_READ));
    }

    #[test]
    fn test_first_pass_carries_frame_boundary_barrier() {
        let mut builder = RenderGraphBuilder::new();
        let buf = builder.import_buffer("data", phys_buffer(), RgBufferState::UNDEFINED);
        builder.add_pass("only", BufferPass { uses: vec![(buf, RgBufferState::STORAGE_WRITE_COMPUTE)] });

        let exec = compile(builder);
        let passes: Vec<_> = exec.iter_passes().collect();
        let global = passes[0].pre_global_barrier.unwrap();
        assert_eq!(global.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(global.dst_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
    }

    #[test]
    fn test_queue_ownership_transfer() {
        // 属于 queue family 1 的导入缓冲区在 family 0 的 graph 中使用：
        // release 半边交给持有队列，acquire 半边进计划
        let mut builder = RenderGraphBuilder::new();
        let shared = builder.register_buffer(
            RgBufferResource::imported("shared", phys_buffer(), RgBufferState::TRANSFER_DST).with_queue_family(1),
        );
        builder.add_pass("consume", BufferPass { uses: vec![(shared, RgBufferState::STORAGE_READ_COMPUTE)] });

        let exec = compile(builder);
        assert_eq!(exec.release_buffer_barriers.len(), 1);
        assert_eq!(exec.release_buffer_barriers[0].queue_transfer, Some((1, 0)));

        let passes: Vec<_> = exec.iter_passes().collect();
        let acquire = &passes[0].pre_buffer_barriers[0];
        assert_eq!(acquire.queue_transfer, Some((1, 0)));
        // 所有权转移的两半参数必须一致，不做 access 简化
        assert_eq!(acquire.src_access, vk::AccessFlags2::TRANSFER_WRITE);

        // family 一致时退化成普通 barrier
        let mut builder = RenderGraphBuilder::new();
        builder.set_queue_family_index(1);
        let local = builder.register_buffer(
            RgBufferResource::imported("local", phys_buffer(), RgBufferState::TRANSFER_DST).with_queue_family(1),
        );
        builder.add_pass("consume", BufferPass { uses: vec![(local, RgBufferState::STORAGE_READ_COMPUTE)] });

        let exec = compile(builder);
        assert!(exec.release_buffer_barriers.is_empty());
        let passes: Vec<_> = exec.iter_passes().collect();
        assert_eq!(passes[0].pre_buffer_barriers[0].queue_transfer, None);
    }

    #[test]
    fn test_strict_validation_read_only_image() {
        let make_builder = |state: RgImageState| {
            let mut builder = RenderGraphBuilder::new();
            let lut = builder.import_read_only_image("lut", phys_image(), vk::Format::R8G8B8A8_UNORM, 1, 1);
            builder.add_pass("use", ImagePass { uses: vec![(lut, state)] });
            builder
        };
        let strict = RgCompileOptions::default() | RgCompileOptions::STRICT_VALIDATION;

        // 写入只读纹理：strict 下报错
        let mut pool = MockPool::default();
        let err = make_builder(RgImageState::STORAGE_WRITE_COMPUTE).compile(strict, &mut pool).unwrap_err();
        assert!(matches!(err, RgCompileError::ReadOnlyImageWritten { .. }));

        // 非采样 layout：strict 下报错
        let mut pool = MockPool::default();
        let err = make_builder(RgImageState::TRANSFER_SRC).compile(strict, &mut pool).unwrap_err();
        assert!(matches!(err, RgCompileError::ReadOnlyImageBadLayout { .. }));

        // 非 strict 构建信任调用方声明
        let mut pool = MockPool::default();
        assert!(make_builder(RgImageState::STORAGE_WRITE_COMPUTE).compile(RgCompileOptions::default(), &mut pool).is_ok());

        // 合法使用在 strict 下也通过
        let mut pool = MockPool::default();
        assert!(make_builder(RgImageState::SHADER_READ_FRAGMENT).compile(strict, &mut pool).is_ok());
    }

    #[test]
    fn test_conflicting_layouts_always_fatal() {
        // 同一个 Pass 内对同一个 subresource 声明两种 layout：永远是错误
        let mut builder = RenderGraphBuilder::new();
        let img = builder.import_image(
            "img",
            phys_image(),
            vk::Format::R8G8B8A8_UNORM,
            1,
            1,
            RgImageState::UNDEFINED,
        );
        builder.add_pass(
            "conflicted",
            ImagePass {
                uses: vec![(img, RgImageState::SHADER_READ_FRAGMENT), (img, RgImageState::TRANSFER_SRC)],
            },
        );

        let mut pool = MockPool::default();
        let err = builder.compile(RgCompileOptions::default(), &mut pool).unwrap_err();
        assert!(matches!(err, RgCompileError::IncompatibleLayoutMerge { .. }));
    }

    #[test]
    fn test_complete_fence_passthrough() {
        let fence = vk::Fence::from_raw(11);
        let mut builder = RenderGraphBuilder::new();
        builder.set_complete_fence(fence);
        let a = builder.add_dummy_pass("a");
        let _ = a;

        let exec = compile(builder);
        assert_eq!(exec.complete_fence, Some(fence));
        assert!(!exec.sections[0].passes[0].has_callback());
    }

    #[test]
    fn test_log_execution_plan_smoke() {
        lucis_crate_tools::init_log::init_log();

        let acquire = vk::Semaphore::from_raw(21);
        let present = vk::Semaphore::from_raw(22);
        let mut builder = RenderGraphBuilder::new();
        let swapchain =
            builder.register_swapchain_image("backbuffer", phys_image(), vk::Format::B8G8R8A8_UNORM, acquire, present);
        let scene = builder.create_image(
            "scene-color",
            GfxImageDesc::new_2d(4, 4, vk::Format::R16G16B16A16_SFLOAT, vk::ImageUsageFlags::STORAGE),
        );
        builder.add_pass("scene", ImagePass { uses: vec![(scene, RgImageState::STORAGE_WRITE_COMPUTE)] });
        builder.add_pass(
            "composite",
            ImagePass {
                uses: vec![(scene, RgImageState::SHADER_READ_FRAGMENT), (swapchain, RgImageState::COLOR_ATTACHMENT_WRITE)],
            },
        );

        let exec = compile(builder);
        exec.log_execution_plan();
        assert_eq!(exec.pass_count(), 2);
    }

    #[test]
    fn test_pass_context_resolves_physical_handles() {
        // 回调通过 RgPassContext 拿到编译期分配的物理句柄
        struct ProbePass {
            image: RgImageHandle,
            seen: Rc<Cell<Option<GfxImageHandle>>>,
        }
        impl RgPass for ProbePass {
            fn setup(&mut self, builder: &mut RgPassBuilder<'_>) {
                builder.use_image(self.image, RgImageState::STORAGE_WRITE_COMPUTE);
            }
            fn execute(&self, ctx: &RgPassContext<'_>) {
                self.seen.set(ctx.get_image(self.image));
            }
        }

        let seen = Rc::new(Cell::new(None));
        let mut builder = RenderGraphBuilder::new();
        let img = builder.create_image(
            "target",
            GfxImageDesc::new_2d(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::STORAGE),
        );
        builder.add_pass("probe", ProbePass { image: img, seen: seen.clone() });

        let exec = compile(builder);
        let pass = &exec.sections[0].passes[0];
        pass.execute(&RgPassContext {
            resources: &exec.resources,
            pass_name: &pass.name,
        });

        assert!(seen.get().is_some());
        assert_eq!(seen.get(), exec.resources.image_binding(img));
    }
}
