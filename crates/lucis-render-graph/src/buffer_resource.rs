//! 缓冲区资源条目

use ash::vk;

use crate::resource_state::RgBufferState;
use lucis_render_interface::desc::GfxBufferDesc;
use lucis_render_interface::handles::GfxBufferHandle;

/// 缓冲区资源的来源
#[derive(Clone, Debug)]
pub enum RgBufferSource {
    /// 从外部导入的缓冲区，物理对象由调用方持有
    Imported {
        handle: GfxBufferHandle,
        /// 当前持有该资源的 queue family；`None` 表示与 graph 所在队列一致
        queue_family: Option<u32>,
    },
    /// 由 render graph 创建的瞬态缓冲区，生命周期只有一帧
    Transient { desc: GfxBufferDesc },
}

/// 缓冲区资源条目
#[derive(Clone, Debug)]
pub struct RgBufferResource {
    /// 资源来源
    pub source: RgBufferSource,
    /// 进入本帧时的同步状态
    pub current_state: RgBufferState,
    /// 调试名称
    pub name: String,
}

// new & init
impl RgBufferResource {
    /// 创建导入的缓冲区资源
    pub fn imported(name: impl Into<String>, handle: GfxBufferHandle, current_state: RgBufferState) -> Self {
        Self {
            source: RgBufferSource::Imported { handle, queue_family: None },
            current_state,
            name: name.into(),
        }
    }

    /// 声明资源当前属于另一个 queue family（需要所有权转移）
    pub fn with_queue_family(mut self, queue_family: u32) -> Self {
        if let RgBufferSource::Imported { queue_family: qf, .. } = &mut self.source {
            *qf = Some(queue_family);
        }
        self
    }

    /// 创建瞬态缓冲区资源
    pub fn transient(name: impl Into<String>, desc: GfxBufferDesc) -> Self {
        Self {
            source: RgBufferSource::Transient { desc },
            current_state: RgBufferState::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
            name: name.into(),
        }
    }
}

// getter
impl RgBufferResource {
    /// 获取物理 buffer handle（仅对导入资源有效）
    pub fn physical_handle(&self) -> Option<GfxBufferHandle> {
        match &self.source {
            RgBufferSource::Imported { handle, .. } => Some(*handle),
            RgBufferSource::Transient { .. } => None,
        }
    }

    /// 检查是否为瞬态资源
    pub fn is_transient(&self) -> bool {
        matches!(&self.source, RgBufferSource::Transient { .. })
    }

    /// 资源当前所属的 queue family（仅导入资源可能跨队列）
    pub fn owner_queue_family(&self) -> Option<u32> {
        match &self.source {
            RgBufferSource::Imported { queue_family, .. } => *queue_family,
            RgBufferSource::Transient { .. } => None,
        }
    }
}
