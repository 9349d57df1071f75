//! 编译器产出的 barrier 记录
//!
//! 编译阶段只知道虚拟句柄，不持有 `vk::Image` / `vk::Buffer`；
//! 因此 barrier 先以记录形式存在执行计划里，执行器解析出物理对象后
//! 再转换成 `lucis-render-interface` 中的构造器录制。

use ash::vk;

use crate::resource_handle::{RgBufferHandle, RgImageHandle};
use crate::subresource::RgSubresource;
use lucis_render_interface::barrier::{GfxBufferBarrier, GfxGlobalBarrier, GfxImageBarrier};

/// 图像 barrier 记录，作用于单个 subresource
#[derive(Clone, Copy, Debug)]
pub struct RgImageBarrier {
    /// 目标图像（graph 内部句柄）
    pub image: RgImageHandle,
    /// 目标 subresource
    pub subresource: RgSubresource,
    /// 图像 aspect（由格式推断）
    pub aspect: vk::ImageAspectFlags,

    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,

    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub new_layout: vk::ImageLayout,

    /// queue family 所有权转移 `(src_family, dst_family)`；普通 barrier 为 `None`
    pub queue_transfer: Option<(u32, u32)>,
}

impl RgImageBarrier {
    /// 转换为可录制的 barrier
    ///
    /// 需要提供执行器解析出的 `vk::Image`。
    pub fn to_gfx_barrier(&self, image: vk::Image) -> GfxImageBarrier {
        let mut barrier = GfxImageBarrier::new()
            .image(image)
            .layout_transfer(self.old_layout, self.new_layout)
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access)
            .image_aspect_flag(self.aspect)
            .subresource(self.subresource.mip_level, self.subresource.array_layer);
        if let Some((src_family, dst_family)) = self.queue_transfer {
            barrier = barrier.queue_family_transfer(src_family, dst_family);
        }
        barrier
    }
}

/// 缓冲区 barrier 记录，作用于整个缓冲区
#[derive(Clone, Copy, Debug)]
pub struct RgBufferBarrier {
    /// 目标缓冲区（graph 内部句柄）
    pub buffer: RgBufferHandle,

    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,

    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,

    /// queue family 所有权转移 `(src_family, dst_family)`；普通 barrier 为 `None`
    pub queue_transfer: Option<(u32, u32)>,
}

impl RgBufferBarrier {
    /// 转换为可录制的 barrier
    pub fn to_gfx_barrier(&self, buffer: vk::Buffer) -> GfxBufferBarrier {
        let mut barrier = GfxBufferBarrier::new()
            .buffer(buffer, 0, vk::WHOLE_SIZE)
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access);
        if let Some((src_family, dst_family)) = self.queue_transfer {
            barrier = barrier.queue_family_transfer(src_family, dst_family);
        }
        barrier
    }
}

/// global memory barrier 记录
///
/// 不绑定具体资源；若干无 layout 转换的 barrier 可以合并成一个。
#[derive(Clone, Copy, Debug, Default)]
pub struct RgGlobalBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl RgGlobalBarrier {
    /// 转换为可录制的 barrier
    pub fn to_gfx_barrier(&self) -> GfxGlobalBarrier {
        GfxGlobalBarrier::new()
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access)
    }
}
