use std::{fmt, ops::Range, sync::Arc};

use parking_lot::Mutex;

use crate::native::{
    self, CpuDescriptor, DescriptorHeapType, GpuDescriptor, NativeResultExt as _,
    RawDescriptorHeap as _, RawDevice as _,
};

/// A contiguous run of descriptors handed out by a [`DescriptorHeap`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HeapRange {
    pub index: u32,
    pub count: u32,
    pub cpu: CpuDescriptor,
    /// Only set for shader-visible heaps.
    pub gpu: Option<GpuDescriptor>,
}

impl fmt::Debug for HeapRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRange")
            .field("index", &self.index)
            .field("count", &self.count)
            .field("cpu", &self.cpu.ptr)
            .field("gpu", &self.gpu.map(|gpu| gpu.ptr))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub capacity: u32,
    pub next_free: u32,
    /// Descriptors sitting in the free list.
    pub recycled: u32,
}

#[derive(Debug, Default)]
struct HeapState {
    next_free: u32,
    /// Sorted, non-adjacent ranges returned by `free`.
    free_list: Vec<Range<u32>>,
}

impl HeapState {
    fn take_recycled(&mut self, count: u32) -> Option<u32> {
        let position = self
            .free_list
            .iter()
            .position(|range| range.end - range.start >= count)?;
        let range = &mut self.free_list[position];
        let index = range.start;
        range.start += count;
        if range.start == range.end {
            self.free_list.remove(position);
        }
        Some(index)
    }

    fn recycle(&mut self, freed: Range<u32>) {
        let position = self
            .free_list
            .partition_point(|range| range.start < freed.start);
        self.free_list.insert(position, freed);
        // Coalesce with the right neighbour, then the left one.
        if position + 1 < self.free_list.len()
            && self.free_list[position].end == self.free_list[position + 1].start
        {
            let right = self.free_list.remove(position + 1);
            self.free_list[position].end = right.end;
        }
        if position > 0 && self.free_list[position - 1].end == self.free_list[position].start {
            let current = self.free_list.remove(position);
            self.free_list[position - 1].end = current.end;
        }
        // Ranges touching the bump pointer give their space back to it.
        while let Some(last) = self.free_list.last() {
            if last.end != self.next_free {
                break;
            }
            self.next_free = last.start;
            self.free_list.pop();
        }
    }

    fn recycled(&self) -> u32 {
        self.free_list
            .iter()
            .map(|range| range.end - range.start)
            .sum()
    }
}

/// Fixed-capacity descriptor heap with a bump pointer.
///
/// Shader-visible heaps hand out GPU handles and never recycle. CPU-only heaps
/// keep a first-fit free list that is consulted before bumping.
pub struct DescriptorHeap<N: native::Native> {
    raw: N::DescriptorHeap,
    kind: DescriptorHeapType,
    shader_visible: bool,
    handle_size: u32,
    capacity: u32,
    start_cpu: CpuDescriptor,
    start_gpu: Option<GpuDescriptor>,
    state: Mutex<HeapState>,
}

impl<N: native::Native> DescriptorHeap<N> {
    pub(super) fn new(
        device: &N::Device,
        kind: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Self, crate::DeviceError> {
        let raw = {
            profiling::scope!("ID3D12Device::CreateDescriptorHeap");
            device
                .create_descriptor_heap(kind, capacity, shader_visible)
                .into_device_result("Descriptor heap creation")?
        };
        Ok(Self {
            kind,
            shader_visible,
            handle_size: device.descriptor_increment_size(kind),
            capacity,
            start_cpu: raw.cpu_start(),
            start_gpu: shader_visible.then(|| raw.gpu_start()),
            state: Mutex::new(HeapState::default()),
            raw,
        })
    }

    pub fn raw(&self) -> &N::DescriptorHeap {
        &self.raw
    }

    pub fn kind(&self) -> DescriptorHeapType {
        self.kind
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn handle_size(&self) -> u32 {
        self.handle_size
    }

    pub fn cpu_descriptor_at(&self, index: u32) -> CpuDescriptor {
        CpuDescriptor {
            ptr: self.start_cpu.ptr + (self.handle_size * index) as usize,
        }
    }

    pub fn gpu_descriptor_at(&self, index: u32) -> Option<GpuDescriptor> {
        self.start_gpu.map(|start| GpuDescriptor {
            ptr: start.ptr + self.handle_size as u64 * index as u64,
        })
    }

    fn range_at(&self, index: u32, count: u32) -> HeapRange {
        HeapRange {
            index,
            count,
            cpu: self.cpu_descriptor_at(index),
            gpu: self.gpu_descriptor_at(index),
        }
    }

    fn allocate_range(&self, count: u32) -> Result<HeapRange, crate::DeviceError> {
        if count == 0 {
            return Err(crate::DeviceError::InvalidArgument(
                "descriptor allocation of zero handles".to_string(),
            ));
        }
        let mut state = self.state.lock();
        if !self.shader_visible {
            if let Some(index) = state.take_recycled(count) {
                return Ok(self.range_at(index, count));
            }
        }
        let available = self.capacity - state.next_free;
        if count > available {
            log::error!(
                "Unable to allocate {count} descriptors from the {:?} heap ({available} left)",
                self.kind
            );
            return Err(crate::DeviceError::HeapExhausted {
                kind: self.kind,
                requested: count,
                available,
            });
        }
        let index = state.next_free;
        state.next_free += count;
        Ok(self.range_at(index, count))
    }

    /// Allocates `count` consecutive CPU handles.
    pub fn allocate(&self, count: u32) -> Result<HeapRange, crate::DeviceError> {
        self.allocate_range(count)
    }

    /// Allocates `count` consecutive handles with both CPU and GPU addresses.
    pub fn allocate_gpu(&self, count: u32) -> Result<HeapRange, crate::DeviceError> {
        if !self.shader_visible {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "{:?} heap is not shader visible",
                self.kind
            )));
        }
        self.allocate_range(count)
    }

    /// Gives back `range` if it is still the most recent allocation.
    /// Returns `false` when later allocations sit behind it.
    pub fn rewind(&self, range: &HeapRange) -> bool {
        if !self.shader_visible {
            return self.free(range.index, range.count).is_ok();
        }
        let mut state = self.state.lock();
        if range.index + range.count != state.next_free {
            log::warn!(
                "Leaking {} descriptors at {} in the {:?} heap",
                range.count,
                range.index,
                self.kind
            );
            return false;
        }
        state.next_free = range.index;
        true
    }

    /// Returns handles to the free list. Only CPU-only heaps recycle.
    pub fn free(&self, index: u32, count: u32) -> Result<(), crate::DeviceError> {
        if self.shader_visible {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "{:?} heap is shader visible and does not recycle",
                self.kind
            )));
        }
        let mut state = self.state.lock();
        let end = index.checked_add(count).filter(|&end| end <= state.next_free);
        let Some(end) = end else {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "descriptor range {index}..{} was never allocated",
                index as u64 + count as u64
            )));
        };
        if count == 0 {
            return Ok(());
        }
        let overlaps = state
            .free_list
            .iter()
            .any(|range| range.start < end && index < range.end);
        if overlaps {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "descriptor range {index}..{end} is already free"
            )));
        }
        state.recycle(index..end);
        Ok(())
    }

    pub fn usage(&self) -> HeapUsage {
        let state = self.state.lock();
        HeapUsage {
            capacity: self.capacity,
            next_free: state.next_free,
            recycled: state.recycled(),
        }
    }
}

impl<N: native::Native> fmt::Debug for DescriptorHeap<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("kind", &self.kind)
            .field("shader_visible", &self.shader_visible)
            .field("capacity", &self.capacity)
            .field("usage", &self.usage())
            .finish()
    }
}

/// A single CPU descriptor that returns itself to its heap on drop.
pub struct DescriptorSlot<N: native::Native> {
    heap: Arc<DescriptorHeap<N>>,
    index: u32,
    raw: CpuDescriptor,
}

impl<N: native::Native> DescriptorSlot<N> {
    pub(super) fn new(heap: &Arc<DescriptorHeap<N>>) -> Result<Self, crate::DeviceError> {
        let range = heap.allocate(1)?;
        Ok(Self {
            heap: Arc::clone(heap),
            index: range.index,
            raw: range.cpu,
        })
    }

    pub fn raw(&self) -> CpuDescriptor {
        self.raw
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<N: native::Native> Drop for DescriptorSlot<N> {
    fn drop(&mut self) {
        if let Err(err) = self.heap.free(self.index, 1) {
            log::error!("Leaking descriptor {}: {err}", self.index);
        }
    }
}

impl<N: native::Native> fmt::Debug for DescriptorSlot<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSlot")
            .field("kind", &self.heap.kind)
            .field("index", &self.index)
            .field("ptr", &self.raw.ptr)
            .finish()
    }
}
