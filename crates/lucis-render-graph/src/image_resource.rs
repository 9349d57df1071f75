//! 图像资源条目
//!
//! 图像状态按 subresource 粒度跟踪；swapchain image 是一种特殊的导入资源，
//! 额外携带 acquire/present 两个 semaphore。

use ash::vk;

use crate::resource_state::RgImageState;
use crate::subresource::RgSubresourceMap;
use lucis_render_interface::desc::GfxImageDesc;
use lucis_render_interface::handles::GfxImageHandle;

/// swapchain image 的同步原语
#[derive(Clone, Copy, Debug)]
pub struct RgSwapchainSync {
    /// backend acquire 完成后 signal 的 semaphore，首个使用 section 需要 wait
    pub acquire_semaphore: vk::Semaphore,
    /// 最后一个使用 section signal 的 semaphore，present 时 wait
    pub present_semaphore: vk::Semaphore,
}

/// 图像资源的来源
#[derive(Clone, Debug)]
pub enum RgImageSource {
    /// 从外部导入的图像，物理对象由调用方持有
    Imported {
        handle: GfxImageHandle,
        /// 当前持有该资源的 queue family；`None` 表示与 graph 所在队列一致
        queue_family: Option<u32>,
        /// 只读采样纹理：只允许以 `SHADER_READ_ONLY_OPTIMAL` layout 读取
        read_only: bool,
    },
    /// 由 render graph 创建的瞬态图像，生命周期只有一帧
    Transient { desc: GfxImageDesc },
    /// swapchain image（单 mip 单 layer 的导入资源）
    Swapchain {
        handle: GfxImageHandle,
        sync: RgSwapchainSync,
    },
}

/// 图像资源条目
#[derive(Clone, Debug)]
pub struct RgImageResource {
    /// 资源来源
    pub source: RgImageSource,
    /// 进入本帧时各 subresource 的同步状态
    pub current_state: RgSubresourceMap<RgImageState>,
    /// 图像格式（用于推断 barrier aspect）
    pub format: vk::Format,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 调试名称
    pub name: String,
}

// new & init
impl RgImageResource {
    /// 创建导入的图像资源，所有 subresource 使用同一初始状态
    pub fn imported(
        name: impl Into<String>,
        handle: GfxImageHandle,
        format: vk::Format,
        mip_levels: u32,
        array_layers: u32,
        current_state: RgImageState,
    ) -> Self {
        Self {
            source: RgImageSource::Imported {
                handle,
                queue_family: None,
                read_only: false,
            },
            current_state: RgSubresourceMap::new_filled(mip_levels, array_layers, current_state),
            format,
            mip_levels,
            array_layers,
            name: name.into(),
        }
    }

    /// 创建只读采样纹理
    ///
    /// 资源常驻 `SHADER_READ_ONLY_OPTIMAL` layout，帧内不允许写入或转换 layout。
    pub fn imported_read_only(
        name: impl Into<String>,
        handle: GfxImageHandle,
        format: vk::Format,
        mip_levels: u32,
        array_layers: u32,
    ) -> Self {
        let state = RgImageState::new(
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        Self {
            source: RgImageSource::Imported {
                handle,
                queue_family: None,
                read_only: true,
            },
            current_state: RgSubresourceMap::new_filled(mip_levels, array_layers, state),
            format,
            mip_levels,
            array_layers,
            name: name.into(),
        }
    }

    /// 声明资源当前属于另一个 queue family（需要所有权转移）
    pub fn with_queue_family(mut self, queue_family: u32) -> Self {
        if let RgImageSource::Imported { queue_family: qf, .. } = &mut self.source {
            *qf = Some(queue_family);
        }
        self
    }

    /// 创建瞬态图像资源
    pub fn transient(name: impl Into<String>, desc: GfxImageDesc) -> Self {
        let format = desc.format;
        let mip_levels = desc.mip_levels;
        let array_layers = desc.array_layers;
        Self {
            source: RgImageSource::Transient { desc },
            current_state: RgSubresourceMap::new_filled(mip_levels, array_layers, RgImageState::UNDEFINED),
            format,
            mip_levels,
            array_layers,
            name: name.into(),
        }
    }

    /// 创建 swapchain image 资源
    ///
    /// stage/access 为空：跨帧同步由 acquire semaphore 负责。layout 记为
    /// `UNDEFINED`（acquire 拿到的图像内容不做保证），首次使用前编译器
    /// 会生成进入目标 layout 的转换。
    pub fn swapchain(name: impl Into<String>, handle: GfxImageHandle, format: vk::Format, sync: RgSwapchainSync) -> Self {
        let state =
            RgImageState::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);
        Self {
            source: RgImageSource::Swapchain { handle, sync },
            current_state: RgSubresourceMap::new_filled(1, 1, state),
            format,
            mip_levels: 1,
            array_layers: 1,
            name: name.into(),
        }
    }
}

// getter
impl RgImageResource {
    /// 根据格式推断 aspect flags
    #[inline]
    pub fn infer_aspect(&self) -> vk::ImageAspectFlags {
        GfxImageDesc::infer_aspect(self.format)
    }

    /// 获取物理 image handle（瞬态资源分配前为 `None`）
    pub fn physical_handle(&self) -> Option<GfxImageHandle> {
        match &self.source {
            RgImageSource::Imported { handle, .. } | RgImageSource::Swapchain { handle, .. } => Some(*handle),
            RgImageSource::Transient { .. } => None,
        }
    }

    /// 检查是否为瞬态资源
    pub fn is_transient(&self) -> bool {
        matches!(&self.source, RgImageSource::Transient { .. })
    }

    /// 检查是否为 swapchain image
    pub fn is_swapchain(&self) -> bool {
        matches!(&self.source, RgImageSource::Swapchain { .. })
    }

    /// 检查是否为只读采样纹理
    pub fn is_read_only(&self) -> bool {
        matches!(&self.source, RgImageSource::Imported { read_only: true, .. })
    }

    /// 资源当前所属的 queue family（仅导入资源可能跨队列）
    pub fn owner_queue_family(&self) -> Option<u32> {
        match &self.source {
            RgImageSource::Imported { queue_family, .. } => *queue_family,
            _ => None,
        }
    }
}
