use std::sync::Arc;

use parking_lot::RwLock;

use crate::native::{Native, RawInstance};

impl<N: Native> super::Instance<N> {
    /// Loads the native runtime.
    ///
    /// `InstanceFlags::VALIDATION` turns on the debug layer where the backend
    /// has one.
    pub fn init(desc: &crate::InstanceDescriptor) -> Result<Self, crate::InstanceError> {
        profiling::scope!("Init DX12 Backend");
        let raw = <N::Instance as RawInstance<N>>::init(desc)?;
        log::info!(
            "Initialized instance {:?} with {:?}, tearing {}",
            desc.name,
            desc.flags,
            if raw.supports_allow_tearing() {
                "supported"
            } else {
                "unsupported"
            }
        );
        Ok(Self {
            raw: Arc::new(raw),
            flags: desc.flags,
        })
    }

    pub fn raw(&self) -> &N::Instance {
        &self.raw
    }

    pub fn flags(&self) -> crate::InstanceFlags {
        self.flags
    }

    pub fn enumerate_adapters(&self) -> Vec<crate::ExposedAdapter<N>> {
        self.raw
            .enumerate_adapters()
            .into_iter()
            .map(|raw| super::Adapter::expose(raw, &self.raw, self.flags))
            .collect()
    }

    pub fn create_surface(
        &self,
        window_handle: raw_window_handle::RawWindowHandle,
    ) -> Result<super::Surface<N>, crate::InstanceError> {
        let window = self.raw.create_window(window_handle)?;
        Ok(super::Surface {
            instance: Arc::clone(&self.raw),
            window,
            supports_allow_tearing: self.raw.supports_allow_tearing(),
            swap_chain: RwLock::new(None),
        })
    }
}
