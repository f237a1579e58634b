//! Device buffer allocation
//!
//! A `DeviceBuffer` is one fixed-length device allocation. Handles share it
//! through `Arc`, so the bytes are returned to the device budget exactly once,
//! when the last handle (owner or view) lets go.

use crate::{DeviceError, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// One device allocation of `len` elements
pub(crate) struct DeviceBuffer<T> {
    data: RwLock<Box<[T]>>,
    /// Address of the first element (stable for the buffer's lifetime)
    base: usize,
    bytes: usize,
}

impl<T: Copy> DeviceBuffer<T> {
    /// Allocate `len` elements initialised to `value`
    pub(crate) fn allocate(len: usize, value: T) -> Result<Arc<Self>> {
        let mut storage = Self::reserve_storage(len)?;
        storage.resize(len, value);
        Ok(Self::wrap(storage))
    }

    /// Allocate a buffer and upload `src` into it
    pub(crate) fn from_slice(src: &[T]) -> Result<Arc<Self>> {
        let mut storage = Self::reserve_storage(src.len())?;
        storage.extend_from_slice(src);
        Ok(Self::wrap(storage))
    }

    fn reserve_storage(len: usize) -> Result<Vec<T>> {
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| DeviceError::AllocationFailure {
                requested_bytes: usize::MAX,
                reason: format!("{len} elements overflow the address space"),
            })?;

        super::reserve(bytes)?;

        let mut storage = Vec::new();
        if let Err(e) = storage.try_reserve_exact(len) {
            super::release(bytes);
            return Err(DeviceError::AllocationFailure {
                requested_bytes: bytes,
                reason: e.to_string(),
            });
        }
        Ok(storage)
    }

    fn wrap(storage: Vec<T>) -> Arc<Self> {
        let data = storage.into_boxed_slice();
        let bytes = std::mem::size_of_val(&*data);
        let base = data.as_ptr() as usize;
        log::trace!("Allocated device buffer {base:#x} ({bytes} bytes)");
        Arc::new(Self {
            data: RwLock::new(data),
            base,
            bytes,
        })
    }
}

impl<T> DeviceBuffer<T> {
    /// Physical element count
    pub(crate) fn len(&self) -> usize {
        self.data.read_recursive().len()
    }

    /// Device address of element 0
    pub(crate) const fn base_addr(&self) -> usize {
        self.base
    }

    /// Shared access; recursive so aliased kernel inputs can be read together
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Box<[T]>> {
        self.data.read_recursive()
    }

    /// Exclusive access for kernels that write
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Box<[T]>> {
        self.data.write()
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        log::trace!("Freed device buffer {:#x} ({} bytes)", self.base, self.bytes);
        super::release(self.bytes);
    }
}

impl<T> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("base", &format_args!("{:#x}", self.base))
            .field("bytes", &self.bytes)
            .finish()
    }
}
