//! 依赖图构建和拓扑排序
//!
//! 分析 Pass 之间的资源依赖关系，构建 DAG 并进行拓扑排序。
//! 排序使用 Kahn 算法，就绪队列为 FIFO：输入顺序确定时输出顺序也确定，
//! 没有依赖关系的 Pass 保持声明顺序。

use std::collections::VecDeque;

/// 依赖图
///
/// 表示 Pass 之间的依赖关系，用于拓扑排序和执行顺序计算。
/// 节点是 Pass 索引；边在添加时去重。
pub struct DependencyGraph {
    /// Pass 数量
    pass_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    /// 入度表
    in_degrees: Vec<usize>,
}

impl DependencyGraph {
    /// 创建新的依赖图
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
        }
    }

    /// 添加依赖边
    ///
    /// # 参数
    /// - `producer`: 生产者 Pass 索引（先执行）
    /// - `consumer`: 消费者 Pass 索引（后执行）
    ///
    /// 自环和重复边会被忽略。
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        if producer == consumer {
            return;
        }
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }
    }

    /// 检查边是否存在
    #[inline]
    pub fn has_edge(&self, producer: usize, consumer: usize) -> bool {
        self.adjacency[producer].contains(&consumer)
    }

    /// 执行拓扑排序
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(remaining)`: 检测到循环依赖，返回无法消耗的 Pass 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.pass_count);

        // 将所有入度为 0 的节点按声明顺序加入队列
        for i in 0..self.pass_count {
            if in_degrees[i] == 0 {
                queue.push_back(i);
            }
        }

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if result.len() != self.pass_count {
            // 存在循环，找出未被消耗的节点
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// 获取 Pass 的直接后继
    pub fn successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }
}
