/// Per-subresource image layout tracking
///
/// Every texture touched during a recording gets a dense grid holding the
/// current layout of each (mip, layer) subresource. Grids are created on the
/// first transition request and start at the texture's default layout, so a
/// recording may assume every texture begins there.
///
/// A transition request over a uniformly laid out range emits at most one
/// barrier; a range whose subresources diverged falls back to one barrier per
/// subresource that is not already in the requested layout.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::backend::TextureHandle;
use crate::error::Result;
use crate::resource::{SubresourceRange, Texture};
use crate::sync::{ImageBarrier, ImageLayout};

/// Dense (mip, layer) grid of layouts for one texture
#[derive(Debug, Clone)]
pub struct SubresourceGrid {
    mip_levels: u32,
    layers: u32,
    layouts: Vec<ImageLayout>,
}

impl SubresourceGrid {
    pub fn new(mip_levels: u32, layers: u32, initial: ImageLayout) -> Self {
        Self {
            mip_levels,
            layers,
            layouts: vec![initial; (mip_levels * layers) as usize],
        }
    }

    fn index(&self, mip: u32, layer: u32) -> usize {
        (mip * self.layers + layer) as usize
    }

    pub fn get(&self, mip: u32, layer: u32) -> ImageLayout {
        self.layouts[self.index(mip, layer)]
    }

    pub fn set(&mut self, mip: u32, layer: u32, layout: ImageLayout) {
        let index = self.index(mip, layer);
        self.layouts[index] = layout;
    }

    /// True if `range` lies inside the grid
    pub fn contains(&self, range: &SubresourceRange) -> bool {
        range.base_mip.checked_add(range.mip_count).is_some_and(|end| end <= self.mip_levels)
            && range.base_layer.checked_add(range.layer_count).is_some_and(|end| end <= self.layers)
    }

    /// Layout shared by every subresource of `range`, if there is one
    pub fn uniform_layout(&self, range: &SubresourceRange) -> Option<ImageLayout> {
        let mut pairs = range.iter();
        let (mip, layer) = pairs.next()?;
        let candidate = self.get(mip, layer);
        pairs
            .all(|(mip, layer)| self.get(mip, layer) == candidate)
            .then_some(candidate)
    }
}

struct TrackedTexture {
    texture: Arc<Texture>,
    grid: SubresourceGrid,
}

/// Layout state of one recording sequence
///
/// Not shared across threads; a recorder owns exactly one tracker.
#[derive(Default)]
pub struct ImageLayoutTracker {
    textures: FxHashMap<TextureHandle, TrackedTexture>,
    /// Touch order, so restore barriers come out deterministically
    order: Vec<TextureHandle>,
}

impl ImageLayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every subresource addressed by `ranges` to `new_layout`
    ///
    /// Ranges are processed independently. Needed barriers are appended to
    /// `barriers`; the number appended is returned.
    pub fn transition(
        &mut self,
        texture: &Arc<Texture>,
        ranges: &[SubresourceRange],
        new_layout: ImageLayout,
        barriers: &mut Vec<ImageBarrier>,
    ) -> Result<usize> {
        let tracked = self.track(texture);
        let mut emitted = 0;
        for range in ranges {
            if !tracked.grid.contains(range) {
                crate::ferrite_invalid!(
                    "ferrite::sync",
                    "Subresource range {:?} outside texture {:?} ({} mips x {} layers)",
                    range, texture.handle(), tracked.grid.mip_levels, tracked.grid.layers
                );
            }
            emitted += Self::transition_range(tracked, range, new_layout, barriers);
        }
        Ok(emitted)
    }

    fn track(&mut self, texture: &Arc<Texture>) -> &mut TrackedTexture {
        let handle = texture.handle();
        let order = &mut self.order;
        self.textures.entry(handle).or_insert_with(|| {
            order.push(handle);
            let desc = texture.desc();
            TrackedTexture {
                texture: Arc::clone(texture),
                grid: SubresourceGrid::new(
                    desc.mip_levels,
                    desc.tracked_layers(),
                    texture.default_layout(),
                ),
            }
        })
    }

    fn transition_range(
        tracked: &mut TrackedTexture,
        range: &SubresourceRange,
        new_layout: ImageLayout,
        barriers: &mut Vec<ImageBarrier>,
    ) -> usize {
        if range.is_empty() {
            return 0;
        }
        let handle = tracked.texture.handle();
        let aspect = tracked.texture.aspect();

        if let Some(current) = tracked.grid.uniform_layout(range) {
            if current == new_layout {
                return 0;
            }
            barriers.push(ImageBarrier::new(handle, aspect, *range, current, new_layout));
            for (mip, layer) in range.iter() {
                tracked.grid.set(mip, layer, new_layout);
            }
            return 1;
        }

        let mut emitted = 0;
        for (mip, layer) in range.iter() {
            let current = tracked.grid.get(mip, layer);
            if current == new_layout {
                continue;
            }
            barriers.push(ImageBarrier::new(
                handle,
                aspect,
                SubresourceRange::single(mip, layer),
                current,
                new_layout,
            ));
            tracked.grid.set(mip, layer, new_layout);
            emitted += 1;
        }
        emitted
    }

    /// Current layout of one subresource (the default layout if never touched)
    pub fn layout(&self, texture: &Texture, mip: u32, layer: u32) -> ImageLayout {
        self.textures
            .get(&texture.handle())
            .map(|tracked| tracked.grid.get(mip, layer))
            .unwrap_or_else(|| texture.default_layout())
    }

    /// True if every subresource of `range` currently is in `layout`
    pub fn is_in_layout(&self, texture: &Texture, range: &SubresourceRange, layout: ImageLayout) -> bool {
        match self.textures.get(&texture.handle()) {
            Some(tracked) => tracked.grid.contains(range) && range.iter().all(|(m, l)| tracked.grid.get(m, l) == layout),
            None => texture.default_layout() == layout,
        }
    }

    /// Move every touched texture back to its default layout
    ///
    /// Uses the same uniform/per-subresource logic as [`transition`](Self::transition).
    pub fn reset(&mut self, barriers: &mut Vec<ImageBarrier>) -> usize {
        let mut emitted = 0;
        for handle in &self.order {
            if let Some(tracked) = self.textures.get_mut(handle) {
                let default = tracked.texture.default_layout();
                let range = tracked.texture.desc().full_range();
                emitted += Self::transition_range(tracked, &range, default, barriers);
            }
        }
        if emitted > 0 {
            crate::ferrite_trace!("ferrite::sync", "{} restore barrier(s) for {} texture(s)", emitted, self.order.len());
        }
        emitted
    }

    /// Forget every tracked texture
    pub fn clear(&mut self) {
        self.textures.clear();
        self.order.clear();
    }

    pub fn tracked_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
#[path = "layout_tracker_tests.rs"]
mod tests;
