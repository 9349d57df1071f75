//! 编译错误定义
//!
//! 所有错误在编译阶段同步抛出；编译失败不会产出部分有效的执行计划。
//! 循环依赖与 layout 冲突永远是致命错误；其余校验只在
//! `STRICT_VALIDATION` 开启时执行（对应 debug 构建的断言语义）。

use ash::vk;
use thiserror::Error;

/// render graph 编译错误
#[derive(Debug, Error)]
pub enum RgCompileError {
    /// Pass 依赖图存在环，拓扑排序无法消耗所有 Pass
    #[error("cycle detected in pass dependency graph, passes stuck on the cycle: {passes:?}")]
    CycleDetected {
        /// 参与环（或被环阻塞）的 Pass 名称
        passes: Vec<String>,
    },

    /// 同一个 section 收到了两个 signal fence
    #[error("pass '{pass}' would attach a second signal fence to its section")]
    DuplicateSignalFence { pass: String },

    /// 只读采样纹理被声明了写访问
    #[error("read-only image '{image}' is written by pass '{pass}'")]
    ReadOnlyImageWritten { image: String, pass: String },

    /// 只读采样纹理被声明了非采样 layout
    #[error("read-only image '{image}' is used by pass '{pass}' in layout {layout:?}, expected SHADER_READ_ONLY_OPTIMAL")]
    ReadOnlyImageBadLayout {
        image: String,
        pass: String,
        layout: vk::ImageLayout,
    },

    /// 同一个 Pass 对同一个 subresource 声明了两种不同的 layout
    #[error("pass '{pass}' declares image '{image}' with conflicting layouts")]
    IncompatibleLayoutMerge { image: String, pass: String },
}
