//! RenderGraph 资源句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与 backend 的物理句柄分离。
//! 使用 slotmap key 作为稳定索引，编译器的所有内部表都以它们为键。

use slotmap::new_key_type;

new_key_type! {
    /// Graph 内部的 Buffer 句柄
    pub struct RgBufferHandle;
    /// Graph 内部的 Image 句柄
    pub struct RgImageHandle;
}
