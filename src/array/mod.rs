//! Device-resident dynamic arrays
//!
//! [`DeviceArray<T>`] is an owning or viewing handle to a contiguous block of
//! device memory.
//!
//! # Ownership modes
//!
//! ```text
//! Empty                      no buffer, null data()
//! Owned { buffer, len }      allocated by this handle, freed when it lets go
//! View  { buffer, offset,    aliases (part of) a buffer owned elsewhere;
//!         len }              writes go straight to the shared memory
//! ```
//!
//! A view must not outlive the owner it was taken from. Buffers are reference
//! counted, so breaking that rule leaves the view pointing at memory that is
//! no longer attached to any owner rather than at freed memory.
//!
//! Single-element [`DeviceArray::get`]/[`DeviceArray::set`] are synchronous
//! host/device transfers. Bulk traffic goes through [`DeviceArray::from_slice`],
//! [`DeviceArray::assign_slice`] and [`DeviceArray::to_vec`].

mod element;
mod io;
mod kernels;

pub use element::{DeviceElement, Label, Scalar};

use crate::memory::DeviceBuffer;
use crate::{DeviceError, Result};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard,
};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Opaque device address
///
/// Only meaningful for building device-side ranges and for identity checks;
/// it is never dereferenced on the host.
pub struct DevicePtr<T> {
    addr: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DevicePtr<T> {
    /// The null device address
    #[must_use]
    pub const fn null() -> Self {
        Self {
            addr: 0,
            _marker: PhantomData,
        }
    }

    const fn from_addr(addr: usize) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// Check for the null address
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// Raw address value
    #[must_use]
    pub const fn addr(self) -> usize {
        self.addr
    }

    /// Address `count` elements further on
    #[must_use]
    pub const fn offset(self, count: usize) -> Self {
        Self::from_addr(self.addr + count * std::mem::size_of::<T>())
    }
}

impl<T> Clone for DevicePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevicePtr<T> {}

impl<T> PartialEq for DevicePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for DevicePtr<T> {}

impl<T> fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr({:#x})", self.addr)
    }
}

/// Read access to the device range of an array
///
/// Hold it only for the duration of a kernel body: a live guard blocks every
/// writer of the same buffer.
pub struct DeviceSlice<'a, T> {
    guard: Option<MappedRwLockReadGuard<'a, [T]>>,
}

impl<T> Deref for DeviceSlice<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.guard.as_deref().unwrap_or(&[])
    }
}

/// Write access to the device range of an array
pub(crate) struct DeviceSliceMut<'a, T> {
    guard: Option<MappedRwLockWriteGuard<'a, [T]>>,
}

impl<T> Deref for DeviceSliceMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.guard.as_deref().unwrap_or(&[])
    }
}

impl<T> DerefMut for DeviceSliceMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.guard.as_deref_mut().unwrap_or(&mut [])
    }
}

enum Storage<T> {
    Empty,
    Owned {
        buffer: Arc<DeviceBuffer<T>>,
        len: usize,
    },
    View {
        buffer: Arc<DeviceBuffer<T>>,
        offset: usize,
        len: usize,
    },
}

/// Dynamic array resident in device memory
///
/// # Example
///
/// ```
/// use trueno_gamg::DeviceArray;
///
/// let mut field = DeviceArray::from_slice(&[1.0_f64, 2.0, 3.0]).unwrap();
/// let tail = DeviceArray::delegate_range(&field, 2, 1).unwrap();
///
/// field.set(2, 5.0).unwrap();
/// assert_eq!(tail.get(1).unwrap(), 5.0); // views alias, no copy
///
/// let moved = field.xfer();
/// assert!(field.is_empty());
/// assert_eq!(moved.to_vec(), vec![1.0, 2.0, 5.0]);
/// ```
pub struct DeviceArray<T> {
    storage: Storage<T>,
}

impl<T: DeviceElement> DeviceArray<T> {
    /// Create an empty array (no allocation)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: Storage::Empty,
        }
    }

    /// Shared immutable empty array for this element type
    #[must_use]
    pub fn null() -> &'static Self {
        T::null_array()
    }

    /// Allocate `len` default-initialised elements
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if device memory is exhausted
    pub fn with_size(len: usize) -> Result<Self> {
        Self::with_value(len, T::default())
    }

    /// Allocate `len` elements set to `value`
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if device memory is exhausted
    pub fn with_value(len: usize, value: T) -> Result<Self> {
        if len == 0 {
            return Ok(Self::new());
        }
        Ok(Self::owned(DeviceBuffer::allocate(len, value)?, len))
    }

    /// Allocate and upload a host sequence
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if device memory is exhausted
    pub fn from_slice(host: &[T]) -> Result<Self> {
        if host.is_empty() {
            return Ok(Self::new());
        }
        Ok(Self::owned(DeviceBuffer::from_slice(host)?, host.len()))
    }

    /// Deep copy into a freshly owned buffer (views are copied too)
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if device memory is exhausted
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_slice(&self.read())
    }

    /// Take over `other`'s buffer when `reuse` is set, otherwise deep copy it
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if a copy is needed and memory is exhausted
    pub fn reuse_or_copy(other: &mut Self, reuse: bool) -> Result<Self> {
        if reuse {
            Ok(other.xfer())
        } else {
            other.try_clone()
        }
    }

    /// Non-owning view over the whole of `source`
    #[must_use]
    pub fn delegate(source: &Self) -> Self {
        match source.parts() {
            Some((buffer, offset, len)) => Self::view(Arc::clone(buffer), offset, len),
            None => Self::new(),
        }
    }

    /// Non-owning view over the first `sub_size` elements of `source`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `sub_size > source.len()`
    pub fn delegate_prefix(source: &Self, sub_size: usize) -> Result<Self> {
        Self::delegate_range(source, sub_size, 0)
    }

    /// Non-owning view over `source[start..start + sub_size]`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the range exceeds `source.len()`
    pub fn delegate_range(source: &Self, sub_size: usize, start: usize) -> Result<Self> {
        let len = source.len();
        match start.checked_add(sub_size) {
            Some(end) if end <= len => {}
            _ => {
                return Err(DeviceError::OutOfRange {
                    index: start.saturating_add(sub_size),
                    len,
                })
            }
        }

        Ok(match source.parts() {
            Some((buffer, offset, _)) => Self::view(Arc::clone(buffer), offset + start, sub_size),
            None => Self::new(),
        })
    }

    /// Reconfigure this handle as a view over the whole of `source`
    pub fn set_delegate(&mut self, source: &Self) {
        *self = Self::delegate(source);
    }

    /// Reconfigure this handle as a view over a prefix of `source`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `sub_size > source.len()`; `self` is unchanged
    pub fn set_delegate_prefix(&mut self, source: &Self, sub_size: usize) -> Result<()> {
        *self = Self::delegate_prefix(source, sub_size)?;
        Ok(())
    }

    /// Reconfigure this handle as a view over `source[start..start + sub_size]`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the range exceeds `source.len()`; `self` is unchanged
    pub fn set_delegate_range(
        &mut self,
        source: &Self,
        sub_size: usize,
        start: usize,
    ) -> Result<()> {
        *self = Self::delegate_range(source, sub_size, start)?;
        Ok(())
    }

    /// Number of elements
    #[must_use]
    pub const fn len(&self) -> usize {
        match &self.storage {
            Storage::Empty => 0,
            Storage::Owned { len, .. } | Storage::View { len, .. } => *len,
        }
    }

    /// Check if the array has no elements
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the logical contents in bytes
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    /// Elements held by the buffer behind an owning handle (0 for views)
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Owned { buffer, .. } => buffer.len(),
            Storage::Empty | Storage::View { .. } => 0,
        }
    }

    /// Check if this handle allocated (and will free) its buffer
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        matches!(self.storage, Storage::Owned { .. })
    }

    /// Check if this handle aliases memory owned elsewhere
    #[must_use]
    pub const fn is_view(&self) -> bool {
        matches!(self.storage, Storage::View { .. })
    }

    /// Device address of the first element (null when empty)
    #[must_use]
    pub fn data(&self) -> DevicePtr<T> {
        match self.parts() {
            Some((buffer, offset, _)) => DevicePtr::from_addr(buffer.base_addr()).offset(offset),
            None => DevicePtr::null(),
        }
    }

    /// Device range of this array, for kernel bodies
    #[must_use]
    pub fn read(&self) -> DeviceSlice<'_, T> {
        let guard = self.parts().map(|(buffer, offset, len)| {
            RwLockReadGuard::map(buffer.read(), |data| &data[offset..offset + len])
        });
        DeviceSlice { guard }
    }

    pub(crate) fn write(&mut self) -> DeviceSliceMut<'_, T> {
        let guard = self.parts().map(|(buffer, offset, len)| {
            RwLockWriteGuard::map(buffer.write(), |data| &mut data[offset..offset + len])
        });
        DeviceSliceMut { guard }
    }

    /// Read one element (synchronous device-to-host transfer)
    ///
    /// Slow path: one transfer per call. Use [`DeviceArray::to_vec`] for bulk reads.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `index >= len()`
    pub fn get(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        let value = self.read()[index];
        log::trace!("Device-to-host transfer of element {index}");
        Ok(value)
    }

    /// Write one element (synchronous host-to-device transfer)
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `index >= len()`
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        self.write()[index] = value;
        log::trace!("Host-to-device transfer of element {index}");
        Ok(())
    }

    /// First element
    ///
    /// # Errors
    ///
    /// Returns `EmptyContainer` if the array is empty
    pub fn first(&self) -> Result<T> {
        if self.is_empty() {
            return Err(DeviceError::EmptyContainer);
        }
        self.get(0)
    }

    /// Broadcast `value` into every element on the device
    pub fn fill(&mut self, value: T) {
        kernels::fill(&mut *self.write(), value);
    }

    /// Copy another device array into this one, resizing if lengths differ
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if resizing needs memory that is not available
    pub fn assign_array(&mut self, source: &Self) -> Result<()> {
        let len = source.len();
        let shares_buffer = matches!(
            (source.parts(), self.parts()),
            (Some((src, ..)), Some((dst, ..))) if Arc::ptr_eq(src, dst)
        );
        // Resizing in place may overwrite slots the source still reads
        if shares_buffer && self.len() != len {
            let staged = source.to_vec();
            return self.assign_slice(&staged);
        }

        self.prepare_len(len)?;
        if len == 0 {
            return Ok(());
        }

        let (Some((src_buffer, src_offset, _)), Some((dst_buffer, dst_offset, _))) =
            (source.parts(), self.parts())
        else {
            return Ok(());
        };

        if Arc::ptr_eq(src_buffer, dst_buffer) {
            if src_offset != dst_offset {
                dst_buffer
                    .write()
                    .copy_within(src_offset..src_offset + len, dst_offset);
            }
        } else {
            let src = src_buffer.read();
            let mut dst = dst_buffer.write();
            kernels::copy(
                &mut dst[dst_offset..dst_offset + len],
                &src[src_offset..src_offset + len],
            );
        }
        Ok(())
    }

    /// Upload a host sequence, resizing if lengths differ
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if resizing needs memory that is not available
    pub fn assign_slice(&mut self, host: &[T]) -> Result<()> {
        self.prepare_len(host.len())?;
        kernels::copy(&mut *self.write(), host);
        Ok(())
    }

    /// Download the whole array to the host
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.read().to_vec()
    }

    /// Download into an existing host buffer of the same length
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if `host.len() != len()`
    pub fn copy_to_host(&self, host: &mut [T]) -> Result<()> {
        if host.len() != self.len() {
            return Err(DeviceError::size_mismatch(format!(
                "host buffer holds {} elements, device array {}",
                host.len(),
                self.len()
            )));
        }
        kernels::copy(host, &*self.read());
        Ok(())
    }

    /// Resize to `len`; new elements are default-initialised
    ///
    /// Growing preserves every existing element at its index. Shrinking keeps
    /// the buffer and only truncates the logical length.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if growing needs memory that is not available
    pub fn set_size(&mut self, len: usize) -> Result<()> {
        self.resize(len, T::default())
    }

    /// Resize to `len`, filling new elements with `value`
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if growing needs memory that is not available
    pub fn set_size_with(&mut self, len: usize, value: T) -> Result<()> {
        self.resize(len, value)
    }

    /// Drop the contents, releasing owned memory
    pub fn clear(&mut self) {
        self.storage = Storage::Empty;
    }

    /// Move the buffer (and its ownership mode) into a new handle, emptying `self`
    #[must_use = "the transferred buffer is freed if the result is dropped"]
    pub fn xfer(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Take over `other`'s buffer, releasing the one held by `self`
    pub fn transfer(&mut self, other: &mut Self) {
        *self = other.xfer();
    }

    fn owned(buffer: Arc<DeviceBuffer<T>>, len: usize) -> Self {
        Self {
            storage: Storage::Owned { buffer, len },
        }
    }

    fn view(buffer: Arc<DeviceBuffer<T>>, offset: usize, len: usize) -> Self {
        Self {
            storage: Storage::View {
                buffer,
                offset,
                len,
            },
        }
    }

    /// Buffer, element offset and logical length, if any buffer is attached
    fn parts(&self) -> Option<(&Arc<DeviceBuffer<T>>, usize, usize)> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Owned { buffer, len } => Some((buffer, 0, *len)),
            Storage::View {
                buffer,
                offset,
                len,
            } => Some((buffer, *offset, *len)),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(DeviceError::OutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    /// Make `len()` equal `len` ahead of a bulk overwrite
    ///
    /// Owners resize in place; views and empty handles get a fresh buffer.
    fn prepare_len(&mut self, len: usize) -> Result<()> {
        if self.len() == len {
            return Ok(());
        }
        if self.is_owner() {
            self.set_size(len)
        } else {
            *self = Self::with_size(len)?;
            Ok(())
        }
    }

    fn resize(&mut self, new_len: usize, value: T) -> Result<()> {
        if new_len == 0 {
            self.clear();
            return Ok(());
        }

        match &mut self.storage {
            Storage::Empty => {
                *self = Self::with_value(new_len, value)?;
            }
            Storage::Owned { buffer, len } => {
                let old_len = *len;
                if new_len <= old_len {
                    *len = new_len;
                } else if new_len <= buffer.len() {
                    kernels::fill(&mut buffer.write()[old_len..new_len], value);
                    *len = new_len;
                } else {
                    let grown = DeviceBuffer::allocate(new_len, value)?;
                    kernels::copy(&mut grown.write()[..old_len], &buffer.read()[..old_len]);
                    log::trace!("Grew device array from {old_len} to {new_len} elements");
                    *self = Self::owned(grown, new_len);
                }
            }
            Storage::View {
                buffer,
                offset,
                len,
            } => {
                if new_len <= *len {
                    *len = new_len;
                } else {
                    let (start, old_len) = (*offset, *len);
                    let grown = DeviceBuffer::allocate(new_len, value)?;
                    kernels::copy(
                        &mut grown.write()[..old_len],
                        &buffer.read()[start..start + old_len],
                    );
                    *self = Self::owned(grown, new_len);
                }
            }
        }
        Ok(())
    }
}

impl<T: DeviceElement> Default for DeviceArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeviceElement> PartialEq for DeviceArray<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.read() == *other.read()
    }
}

impl<T: DeviceElement> TryFrom<&[T]> for DeviceArray<T> {
    type Error = DeviceError;

    fn try_from(host: &[T]) -> Result<Self> {
        Self::from_slice(host)
    }
}

impl<T: DeviceElement> TryFrom<Vec<T>> for DeviceArray<T> {
    type Error = DeviceError;

    fn try_from(host: Vec<T>) -> Result<Self> {
        Self::from_slice(&host)
    }
}

impl<T: DeviceElement> fmt::Debug for DeviceArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceArray")
            .field("len", &self.len())
            .field("owner", &self.is_owner())
            .field("data", &self.data())
            .finish()
    }
}
