//! 瞬态资源分配接口
//!
//! render graph 的 Internal 资源生命周期只有一帧，由 backend 的瞬态资源池
//! 按帧分配、按帧回收。编译器通过本接口申请资源，并不关心池的实现方式
//! （简单的按描述复用、或者基于内存别名的复用都可以）。

use crate::desc::{GfxBufferDesc, GfxImageDesc};
use crate::handles::{GfxBufferHandle, GfxImageHandle};

/// 瞬态资源池
///
/// 实现方需要保证：同一帧内分配出的资源互不重叠；
/// 上一帧归还的资源可以在之后的帧里复用。
pub trait GfxTransientResourcePool {
    /// 按描述分配一个瞬态缓冲区
    fn alloc_buffer(&mut self, desc: &GfxBufferDesc, name: &str) -> GfxBufferHandle;

    /// 按描述分配一个瞬态图像
    ///
    /// 新分配图像的 layout 视为 `UNDEFINED`。
    fn alloc_image(&mut self, desc: &GfxImageDesc, name: &str) -> GfxImageHandle;
}
