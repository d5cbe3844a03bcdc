// SPDX-License-Identifier: GPL-3.0-only

//! Asset grid geometry
//!
//! The grid scrolls along one axis and is made of three sections laid out one
//! after the other along that axis: the action cells, the camera cell and the
//! library assets. Asset cells are squares; `items_per_line` of them fit
//! across the scroll axis.

use super::geometry::{Rect, ScrollDirection, Size};
use crate::config::LayoutConfiguration;

#[derive(Debug, Clone, PartialEq)]
pub struct AssetGridLayout {
    pub scroll_direction: ScrollDirection,
    pub items_per_line: usize,
    pub interitem_spacing: f64,
    /// Extent of the grid across the scroll axis
    pub cross_extent: f64,
    /// Offset along the scroll axis where the first asset line starts
    pub assets_origin: f64,
}

impl AssetGridLayout {
    /// Lay out the grid for a container whose extent across the scroll axis is
    /// `cross_extent`
    pub fn new(config: &LayoutConfiguration, cross_extent: f64) -> Self {
        let items_per_line = config.asset_items_per_line.max(1);
        let mut layout = Self {
            scroll_direction: config.scroll_direction,
            items_per_line,
            interitem_spacing: config.interitem_spacing,
            cross_extent,
            assets_origin: 0.0,
        };

        let mut origin = 0.0;
        if config.action_item_count() > 0 {
            origin += layout.item_extent() + config.action_section_spacing;
        }
        if config.shows_camera_item {
            origin += cross_extent + config.action_section_spacing;
        }
        layout.assets_origin = origin;
        layout
    }

    /// Side of a square asset cell
    pub fn item_extent(&self) -> f64 {
        let n = self.items_per_line as f64;
        ((self.cross_extent - self.interitem_spacing * (n - 1.0)) / n).max(0.0)
    }

    pub fn item_size(&self) -> Size {
        let side = self.item_extent();
        Size::new(side, side)
    }

    /// Thumbnail pixel size for a display `scale`
    pub fn thumbnail_size(&self, scale: f64) -> Size {
        let side = self.item_extent() * scale;
        Size::new(side, side)
    }

    fn line_stride(&self) -> f64 {
        self.item_extent() + self.interitem_spacing
    }

    /// Frame of the asset at `index`
    pub fn frame_for_asset(&self, index: usize) -> Rect {
        let side = self.item_extent();
        let line = (index / self.items_per_line) as f64;
        let slot = (index % self.items_per_line) as f64;
        let along = self.assets_origin + line * self.line_stride();
        let across = slot * self.line_stride();

        match self.scroll_direction {
            ScrollDirection::Vertical => Rect::new(across, along, side, side),
            ScrollDirection::Horizontal => Rect::new(along, across, side, side),
        }
    }

    /// Extent along the scroll axis of the whole grid holding `count` assets
    pub fn content_extent(&self, count: usize) -> f64 {
        if count == 0 {
            return self.assets_origin;
        }
        let lines = count.div_ceil(self.items_per_line) as f64;
        self.assets_origin + lines * self.line_stride() - self.interitem_spacing
    }

    /// Indexes of the assets whose cells intersect `rect`, in ascending order
    pub fn items_in_rect(&self, rect: &Rect, count: usize) -> Vec<usize> {
        if rect.is_empty() || count == 0 || self.item_extent() <= 0.0 {
            return Vec::new();
        }

        let (start, extent, _) = rect.span(self.scroll_direction);
        let stride = self.line_stride();
        let lines = count.div_ceil(self.items_per_line);

        let first_line = ((start - self.assets_origin) / stride).floor().max(0.0) as usize;
        let last_line = (((start + extent - self.assets_origin) / stride).ceil().max(0.0) as usize)
            .min(lines);

        (first_line..last_line)
            .flat_map(|line| {
                let first = line * self.items_per_line;
                first..(first + self.items_per_line).min(count)
            })
            .filter(|&index| self.frame_for_asset(index).intersects(rect))
            .collect()
    }
}
