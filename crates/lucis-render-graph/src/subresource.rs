//! 图像 subresource 寻址
//!
//! 图像状态按 (mip level, array layer) 粒度跟踪；缓冲区整体跟踪，
//! 不走这里。`RgSubresourceMap` 是 mip × layer 的致密表格。

use std::ops::{Index, IndexMut};

/// 单个 subresource 的坐标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgSubresource {
    pub mip_level: u32,
    pub array_layer: u32,
}

impl RgSubresource {
    #[inline]
    pub const fn new(mip_level: u32, array_layer: u32) -> Self {
        Self { mip_level, array_layer }
    }
}

/// subresource 范围，用于 Pass 的使用声明
///
/// `level_count` / `layer_count` 为 `u32::MAX` 时表示覆盖到最后一级。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSubresourceRange {
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl RgSubresourceRange {
    /// 覆盖整个图像
    pub const ALL: Self = Self {
        base_mip_level: 0,
        level_count: u32::MAX,
        base_array_layer: 0,
        layer_count: u32::MAX,
    };

    /// 单个 subresource
    #[inline]
    pub const fn single(mip_level: u32, array_layer: u32) -> Self {
        Self {
            base_mip_level: mip_level,
            level_count: 1,
            base_array_layer: array_layer,
            layer_count: 1,
        }
    }

    /// 遍历范围与图像实际尺寸的交集
    pub fn iter_clamped(self, mip_levels: u32, array_layers: u32) -> impl Iterator<Item = RgSubresource> {
        let mip_end = self.base_mip_level.saturating_add(self.level_count).min(mip_levels);
        let layer_end = self.base_array_layer.saturating_add(self.layer_count).min(array_layers);
        let base_layer = self.base_array_layer;
        (self.base_mip_level..mip_end)
            .flat_map(move |mip| (base_layer..layer_end).map(move |layer| RgSubresource::new(mip, layer)))
    }
}

/// mip × layer 的致密表格
///
/// 按 mip 为外层、layer 为内层的顺序存储和遍历，保证编译结果的确定性。
#[derive(Clone, Debug)]
pub struct RgSubresourceMap<T> {
    mip_levels: u32,
    array_layers: u32,
    data: Vec<T>,
}

impl<T: Default + Clone> RgSubresourceMap<T> {
    /// 创建表格，所有格子为默认值
    pub fn new(mip_levels: u32, array_layers: u32) -> Self {
        Self {
            mip_levels,
            array_layers,
            data: vec![T::default(); (mip_levels * array_layers) as usize],
        }
    }
}

impl<T> RgSubresourceMap<T> {
    /// 以统一值初始化表格
    pub fn new_filled(mip_levels: u32, array_layers: u32, value: T) -> Self
    where
        T: Clone,
    {
        Self {
            mip_levels,
            array_layers,
            data: vec![value; (mip_levels * array_layers) as usize],
        }
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    fn index_of(&self, subresource: RgSubresource) -> usize {
        debug_assert!(subresource.mip_level < self.mip_levels);
        debug_assert!(subresource.array_layer < self.array_layers);
        (subresource.mip_level * self.array_layers + subresource.array_layer) as usize
    }

    /// 遍历所有 subresource（mip 外层，layer 内层）
    pub fn iter(&self) -> impl Iterator<Item = (RgSubresource, &T)> {
        self.data.iter().enumerate().map(|(i, v)| {
            let subrsc = RgSubresource::new(i as u32 / self.array_layers, i as u32 % self.array_layers);
            (subrsc, v)
        })
    }

    /// 可变遍历
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RgSubresource, &mut T)> {
        let array_layers = self.array_layers;
        self.data.iter_mut().enumerate().map(move |(i, v)| {
            let subrsc = RgSubresource::new(i as u32 / array_layers, i as u32 % array_layers);
            (subrsc, v)
        })
    }
}

impl<T> Index<RgSubresource> for RgSubresourceMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, subresource: RgSubresource) -> &T {
        &self.data[self.index_of(subresource)]
    }
}

impl<T> IndexMut<RgSubresource> for RgSubresourceMap<T> {
    #[inline]
    fn index_mut(&mut self, subresource: RgSubresource) -> &mut T {
        let i = self.index_of(subresource);
        &mut self.data[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_indexing() {
        let mut map: RgSubresourceMap<u32> = RgSubresourceMap::new(3, 2);
        map[RgSubresource::new(2, 1)] = 42;
        assert_eq!(map[RgSubresource::new(2, 1)], 42);
        assert_eq!(map[RgSubresource::new(0, 0)], 0);
        assert_eq!(map.iter().count(), 6);
    }

    #[test]
    fn test_iter_order() {
        let map: RgSubresourceMap<u32> = RgSubresourceMap::new(2, 2);
        let order: Vec<_> = map.iter().map(|(s, _)| (s.mip_level, s.array_layer)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_range_clamped() {
        // ALL 覆盖整个图像
        let all: Vec<_> = RgSubresourceRange::ALL.iter_clamped(2, 3).collect();
        assert_eq!(all.len(), 6);

        // 范围超出图像尺寸时被截断
        let range = RgSubresourceRange {
            base_mip_level: 1,
            level_count: 10,
            base_array_layer: 0,
            layer_count: 1,
        };
        let subs: Vec<_> = range.iter_clamped(3, 2).collect();
        assert_eq!(subs, vec![RgSubresource::new(1, 0), RgSubresource::new(2, 0)]);
    }
}
