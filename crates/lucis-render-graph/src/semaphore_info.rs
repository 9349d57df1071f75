use ash::vk;

/// section 提交时的 semaphore 依赖
#[derive(Clone, Copy, Debug)]
pub struct RgSemaphoreInfo {
    /// Vulkan semaphore 原始句柄
    pub semaphore: vk::Semaphore,
    /// 等待/signal 的 pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Timeline semaphore 的等待值（binary semaphore 为 None）
    pub value: Option<u64>,
}

impl RgSemaphoreInfo {
    /// 创建 binary semaphore
    #[inline]
    pub fn binary(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            stage,
            value: None,
        }
    }

    /// 创建 timeline semaphore
    #[inline]
    pub fn timeline(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        Self {
            semaphore,
            stage,
            value: Some(value),
        }
    }
}
