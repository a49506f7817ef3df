use std::{
    fmt,
    sync::atomic::{AtomicIsize, Ordering},
};

/// A live-object counter for debugging purposes.
pub struct InternalCounter {
    value: AtomicIsize,
}

impl InternalCounter {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        InternalCounter {
            value: AtomicIsize::new(0),
        }
    }

    #[inline]
    pub fn read(&self) -> isize {
        self.value.load(Ordering::Relaxed)
    }

    /// Get and reset the counter's value.
    #[inline]
    pub fn take(&self) -> isize {
        self.value.swap(0, Ordering::Relaxed)
    }

    #[inline]
    pub fn add(&self, val: isize) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn sub(&self, val: isize) {
        self.value.fetch_sub(val, Ordering::Relaxed);
    }
}

impl Clone for InternalCounter {
    fn clone(&self) -> Self {
        InternalCounter {
            value: AtomicIsize::new(self.read()),
        }
    }
}

impl Default for InternalCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InternalCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read().fmt(f)
    }
}

/// Number of live objects created through a [`crate::dx12::Device`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default)]
pub struct HalCounters {
    pub buffers: InternalCounter,
    pub textures: InternalCounter,
    pub texture_views: InternalCounter,
    pub samplers: InternalCounter,
    pub bind_groups: InternalCounter,
    pub bind_group_layouts: InternalCounter,
    pub pipeline_layouts: InternalCounter,
    pub shader_modules: InternalCounter,
    pub render_pipelines: InternalCounter,
    pub compute_pipelines: InternalCounter,
    pub command_encoders: InternalCounter,
    pub fences: InternalCounter,

    /// Bytes of committed memory attributed to buffers.
    pub buffer_memory: InternalCounter,
}
