//! Native resource handles
//!
//! A [`NativeHandle`] is the single owner of one driver object (a device, a
//! queue, an EGL display...). It is acquired once, handed out as a
//! non-owning [`RawHandle`] as often as needed, and released exactly once.
//! After release the handle holds nothing, so every later [`NativeHandle::raw`]
//! yields [`RawHandle::NULL`] and a second release does nothing.

use std::ffi::c_void;
use std::fmt;

/// Non-owning native pointer copied out of a [`NativeHandle`]
///
/// Encodes `id<MTLDevice>`, `EGLDisplay`, `VkDevice`, `ID3D12Device*` and
/// friends as an untyped pointer. Valid only while the owning handle is
/// unreleased.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(*mut c_void);

impl RawHandle {
    /// The released / never-acquired sentinel
    pub const NULL: Self = Self(std::ptr::null_mut());

    /// Wrap a raw pointer
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Wrap a const pointer, as returned by most Objective-C and EGL getters
    pub const fn from_const_ptr(ptr: *const c_void) -> Self {
        Self(ptr.cast_mut())
    }

    /// Wrap a dispatchable handle stored as an integer (Vulkan's `as_raw()`)
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw as usize as *mut c_void)
    }

    /// The wrapped pointer
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// The wrapped pointer as an integer
    pub fn as_u64(self) -> u64 {
        self.0 as usize as u64
    }

    /// Whether this is the null sentinel
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:p})", self.0)
    }
}

/// A driver object that can be given back to its native API
pub trait NativeObject {
    /// Short name used in log messages ("VkDevice", "MTLCommandQueue")
    const KIND: &'static str;

    /// Non-owning pointer to the native object
    fn raw(&self) -> RawHandle;

    /// Hand the object back to the native API
    ///
    /// Consumes `self`, so a value can only ever be released once.
    fn release(self);
}

/// Single owner of a [`NativeObject`]
///
/// `None` inside is the released sentinel.
pub struct NativeHandle<T: NativeObject> {
    object: Option<T>,
}

impl<T: NativeObject> NativeHandle<T> {
    /// Take ownership of a freshly created native object
    pub const fn acquire(object: T) -> Self {
        Self {
            object: Some(object),
        }
    }

    /// Non-owning pointer, [`RawHandle::NULL`] once released
    pub fn raw(&self) -> RawHandle {
        self.object.as_ref().map_or(RawHandle::NULL, NativeObject::raw)
    }

    /// Borrow the owned object, `None` once released
    pub const fn get(&self) -> Option<&T> {
        self.object.as_ref()
    }

    /// Whether the object has already been given back
    pub const fn is_released(&self) -> bool {
        self.object.is_none()
    }

    /// Give the object back to the native API
    ///
    /// Returns `false` when the handle was already released; nothing is
    /// touched in that case.
    pub fn release(&mut self) -> bool {
        match self.object.take() {
            Some(object) => {
                log::debug!("Releasing {} {:?}", T::KIND, object.raw());
                object.release();
                true
            }
            None => false,
        }
    }
}

impl<T: NativeObject> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            log::warn!(
                "{} {:?} dropped without an explicit release; releasing it now",
                T::KIND,
                object.raw()
            );
            object.release();
        }
    }
}

impl<T: NativeObject> fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &T::KIND)
            .field("raw", &self.raw())
            .finish()
    }
}
