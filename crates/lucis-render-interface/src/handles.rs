//! 物理资源句柄
//!
//! 这些句柄由 backend 的资源管理器发放，指向真实的 GPU 资源。
//! render graph 编译器只负责传递它们，从不解引用。

use slotmap::new_key_type;

new_key_type! {
    /// 物理 Buffer 句柄
    pub struct GfxBufferHandle;
    /// 物理 Image 句柄
    pub struct GfxImageHandle;
}
