//! 资源注册表
//!
//! 管理 render graph 中所有声明的资源，提供虚拟句柄到资源信息的映射。
//! 使用 SlotMap 存储资源，提供稳定的句柄和高效的访问。

use slotmap::SlotMap;

use crate::buffer_resource::RgBufferResource;
use crate::image_resource::RgImageResource;
use crate::resource_handle::{RgBufferHandle, RgImageHandle};

#[derive(Default)]
pub struct RgResourceRegistry {
    /// 图像资源表
    images: SlotMap<RgImageHandle, RgImageResource>,
    /// 缓冲区资源表
    buffers: SlotMap<RgBufferHandle, RgBufferResource>,
}

// new & init
impl RgResourceRegistry {
    /// 创建新的资源注册表
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl RgResourceRegistry {
    pub fn register_image(&mut self, image_resource: RgImageResource) -> RgImageHandle {
        self.images.insert(image_resource)
    }

    pub fn register_buffer(&mut self, buffer_resource: RgBufferResource) -> RgBufferHandle {
        self.buffers.insert(buffer_resource)
    }
}

// getter & iter
impl RgResourceRegistry {
    /// 获取图像资源
    #[inline]
    pub fn get_image(&self, handle: RgImageHandle) -> Option<&RgImageResource> {
        self.images.get(handle)
    }

    /// 获取缓冲区资源
    #[inline]
    pub fn get_buffer(&self, handle: RgBufferHandle) -> Option<&RgBufferResource> {
        self.buffers.get(handle)
    }

    /// 获取图像数量
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// 获取缓冲区数量
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// 迭代所有图像资源（按句柄索引序，确定性）
    #[inline]
    pub fn iter_images(&self) -> impl Iterator<Item = (RgImageHandle, &RgImageResource)> {
        self.images.iter()
    }

    /// 迭代所有缓冲区资源（按句柄索引序，确定性）
    #[inline]
    pub fn iter_buffers(&self) -> impl Iterator<Item = (RgBufferHandle, &RgBufferResource)> {
        self.buffers.iter()
    }
}
