use crate::coords::Extent;
use crate::error::{EffectError, Result};

/// At most one live intermediate target, reallocated only when its extent or
/// format changes.
pub(crate) struct TargetSlot<T> {
    current: Option<Allocated<T>>,
    allocations: u64,
}

struct Allocated<T> {
    extent: Extent,
    format: wgpu::TextureFormat,
    value: T,
}

impl<T> Default for TargetSlot<T> {
    fn default() -> Self {
        Self {
            current: None,
            allocations: 0,
        }
    }
}

impl<T> TargetSlot<T> {
    /// Returns the target for `extent`/`format`, allocating on first use or
    /// after a change. A failed allocation keeps the previous target.
    pub fn ensure(
        &mut self,
        extent: Extent,
        format: wgpu::TextureFormat,
        allocate: impl FnOnce(Extent, wgpu::TextureFormat) -> Result<T>,
    ) -> Result<&T> {
        if extent.is_empty() {
            return Err(EffectError::resource(format!(
                "intermediate target of {}x{} has zero size",
                extent.width, extent.height
            )));
        }

        let reusable = matches!(&self.current, Some(a) if a.extent == extent && a.format == format);
        if !reusable {
            let value = allocate(extent, format)?;
            self.allocations += 1;
            self.current = Some(Allocated { extent, format, value });
        }

        self.current
            .as_ref()
            .map(|a| &a.value)
            .ok_or_else(|| EffectError::resource("intermediate target missing after allocation"))
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref().map(|a| &a.value)
    }

    pub fn extent(&self) -> Option<Extent> {
        self.current.as_ref().map(|a| a.extent)
    }

    /// Number of allocations performed over the slot's lifetime.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn release(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    fn alloc(extent: Extent, _: wgpu::TextureFormat) -> Result<Extent> {
        Ok(extent)
    }

    #[test]
    fn same_extent_reuses_target() {
        let mut slot = TargetSlot::default();
        slot.ensure(Extent::new(64, 64), FORMAT, alloc).unwrap();
        slot.ensure(Extent::new(64, 64), FORMAT, alloc).unwrap();
        assert_eq!(slot.allocations(), 1);
    }

    #[test]
    fn each_change_reallocates_once() {
        let mut slot = TargetSlot::default();
        for extent in [Extent::new(64, 64), Extent::new(32, 32), Extent::new(32, 32), Extent::new(64, 64)] {
            slot.ensure(extent, FORMAT, alloc).unwrap();
        }
        assert_eq!(slot.allocations(), 3);
        assert_eq!(slot.get(), Some(&Extent::new(64, 64)));

        slot.ensure(Extent::new(64, 64), wgpu::TextureFormat::Bgra8Unorm, alloc)
            .unwrap();
        assert_eq!(slot.allocations(), 4);
    }

    #[test]
    fn zero_extent_is_rejected_without_allocating() {
        let mut slot = TargetSlot::default();
        let err = slot.ensure(Extent::new(0, 16), FORMAT, alloc).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(slot.allocations(), 0);
    }

    #[test]
    fn failed_allocation_keeps_previous_target() {
        let mut slot = TargetSlot::default();
        slot.ensure(Extent::new(8, 8), FORMAT, alloc).unwrap();
        let err = slot
            .ensure(Extent::new(16, 16), FORMAT, |_, _| Err(EffectError::resource("out of memory")))
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(slot.extent(), Some(Extent::new(8, 8)));
        assert_eq!(slot.allocations(), 1);
    }
}
