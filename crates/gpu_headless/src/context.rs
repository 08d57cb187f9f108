//! # Headless Context Contract
//!
//! [`Context`] is the lifecycle every backend satisfies:
//!
//! ```text
//! Uninitialized -> Created -> (Current <-> NotCurrent) -> Released
//! ```
//!
//! The `Current`/`NotCurrent` leg only exists on backends whose native API
//! binds contexts to threads ([`Backend::requires_current`]). Everywhere else
//! [`Context::make_current`] and [`Context::release_current`] are no-ops, so
//! callers bracket rendering the same way whatever backend they got.
//!
//! `Released` is terminal and reached only through [`Context::release`].
//! Apart from `api`, `is_released` and another `release`, operating on a
//! released context is a caller error.

use std::thread::{self, ThreadId};

use crate::api::{Api, Backend};
use crate::error::HeadlessResult;

#[cfg(any(test, feature = "testing"))]
use crate::backends::fake::FakeContext;
#[cfg(all(feature = "d3d12", windows))]
use crate::backends::d3d12::D3d12Context;
#[cfg(all(feature = "gl", not(target_vendor = "apple")))]
use crate::backends::gl::GlContext;
#[cfg(all(feature = "metal", target_vendor = "apple"))]
use crate::backends::metal::MetalContext;
#[cfg(feature = "vulkan")]
use crate::backends::vulkan::VulkanContext;

/// Lifecycle contract shared by every headless backend
pub trait Context {
    /// Native API this context is built on
    fn backend(&self) -> Backend;

    /// Descriptor of the native device and queue
    ///
    /// Pure; the descriptor borrows from the context and must not be used
    /// after [`Context::release`].
    fn api(&self) -> Api;

    /// Bind the context to the calling thread
    ///
    /// Only thread-affine backends do anything here.
    fn make_current(&mut self) -> HeadlessResult<()> {
        Ok(())
    }

    /// Unbind the context from the calling thread if it is bound there
    fn release_current(&mut self) {}

    /// Give both native handles back, exactly once
    ///
    /// Leaves the context empty: later [`Context::api`] calls return null
    /// references and a second `release` does nothing.
    fn release(&mut self);

    /// Whether [`Context::release`] already ran
    fn is_released(&self) -> bool;
}

/// Where a thread-affine context is bound, relative to the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    Unbound,
    CurrentHere,
    CurrentElsewhere(ThreadId),
}

/// Tracks which thread a thread-affine context is current on
///
/// Not synchronized: the native APIs it mirrors are thread bound and the
/// caller guarantees exclusive access.
#[derive(Debug, Default)]
pub(crate) struct ThreadBinding {
    owner: Option<ThreadId>,
}

impl ThreadBinding {
    pub(crate) fn binding(&self) -> Binding {
        match self.owner {
            None => Binding::Unbound,
            Some(owner) if owner == thread::current().id() => Binding::CurrentHere,
            Some(owner) => Binding::CurrentElsewhere(owner),
        }
    }

    pub(crate) fn bind_here(&mut self) {
        self.owner = Some(thread::current().id());
    }

    pub(crate) fn clear(&mut self) {
        self.owner = None;
    }
}

/// A headless context for whichever backend the factory picked
///
/// The variant set is closed and fixed per build by target and cargo
/// features.
#[derive(Debug)]
pub enum HeadlessContext {
    /// Metal device and command queue
    #[cfg(all(feature = "metal", target_vendor = "apple"))]
    Metal(MetalContext),
    /// EGL display and context
    #[cfg(all(feature = "gl", not(target_vendor = "apple")))]
    Gl(GlContext),
    /// Vulkan device and graphics queue
    #[cfg(feature = "vulkan")]
    Vulkan(VulkanContext),
    /// Direct3D 12 device and direct command queue
    #[cfg(all(feature = "d3d12", windows))]
    D3d12(D3d12Context),
    /// Fault-injecting fake used by tests
    #[cfg(any(test, feature = "testing"))]
    Fake(FakeContext),
}

// Matches on the place with `ref` bindings so an enum left without variants
// by the enabled features still type-checks.
macro_rules! dispatch {
    (mut $value:expr, |$ctx:ident| $body:expr) => {
        match *$value {
            #[cfg(all(feature = "metal", target_vendor = "apple"))]
            HeadlessContext::Metal(ref mut $ctx) => $body,
            #[cfg(all(feature = "gl", not(target_vendor = "apple")))]
            HeadlessContext::Gl(ref mut $ctx) => $body,
            #[cfg(feature = "vulkan")]
            HeadlessContext::Vulkan(ref mut $ctx) => $body,
            #[cfg(all(feature = "d3d12", windows))]
            HeadlessContext::D3d12(ref mut $ctx) => $body,
            #[cfg(any(test, feature = "testing"))]
            HeadlessContext::Fake(ref mut $ctx) => $body,
        }
    };
    ($value:expr, |$ctx:ident| $body:expr) => {
        match *$value {
            #[cfg(all(feature = "metal", target_vendor = "apple"))]
            HeadlessContext::Metal(ref $ctx) => $body,
            #[cfg(all(feature = "gl", not(target_vendor = "apple")))]
            HeadlessContext::Gl(ref $ctx) => $body,
            #[cfg(feature = "vulkan")]
            HeadlessContext::Vulkan(ref $ctx) => $body,
            #[cfg(all(feature = "d3d12", windows))]
            HeadlessContext::D3d12(ref $ctx) => $body,
            #[cfg(any(test, feature = "testing"))]
            HeadlessContext::Fake(ref $ctx) => $body,
        }
    };
}

impl Context for HeadlessContext {
    fn backend(&self) -> Backend {
        dispatch!(self, |ctx| ctx.backend())
    }

    fn api(&self) -> Api {
        dispatch!(self, |ctx| ctx.api())
    }

    fn make_current(&mut self) -> HeadlessResult<()> {
        dispatch!(mut self, |ctx| ctx.make_current())
    }

    fn release_current(&mut self) {
        dispatch!(mut self, |ctx| ctx.release_current());
    }

    fn release(&mut self) {
        dispatch!(mut self, |ctx| ctx.release());
    }

    fn is_released(&self) -> bool {
        dispatch!(self, |ctx| ctx.is_released())
    }
}

#[cfg(all(feature = "metal", target_vendor = "apple"))]
impl From<MetalContext> for HeadlessContext {
    fn from(ctx: MetalContext) -> Self {
        Self::Metal(ctx)
    }
}

#[cfg(all(feature = "gl", not(target_vendor = "apple")))]
impl From<GlContext> for HeadlessContext {
    fn from(ctx: GlContext) -> Self {
        Self::Gl(ctx)
    }
}

#[cfg(feature = "vulkan")]
impl From<VulkanContext> for HeadlessContext {
    fn from(ctx: VulkanContext) -> Self {
        Self::Vulkan(ctx)
    }
}

#[cfg(all(feature = "d3d12", windows))]
impl From<D3d12Context> for HeadlessContext {
    fn from(ctx: D3d12Context) -> Self {
        Self::D3d12(ctx)
    }
}

#[cfg(any(test, feature = "testing"))]
impl From<FakeContext> for HeadlessContext {
    fn from(ctx: FakeContext) -> Self {
        Self::Fake(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::fake::FakeDriver;

    #[test]
    fn test_thread_binding_tracks_owner() {
        let mut binding = ThreadBinding::default();
        assert_eq!(binding.binding(), Binding::Unbound);

        binding.bind_here();
        assert_eq!(binding.binding(), Binding::CurrentHere);

        let seen_elsewhere = thread::scope(|s| s.spawn(|| binding.binding()).join().unwrap());
        assert!(matches!(seen_elsewhere, Binding::CurrentElsewhere(_)));

        binding.clear();
        assert_eq!(binding.binding(), Binding::Unbound);
    }

    #[test]
    fn test_enum_dispatches_to_backend() {
        let driver = FakeDriver::new(Backend::Vulkan);
        let mut ctx = HeadlessContext::from(driver.open().unwrap());

        assert_eq!(ctx.backend(), Backend::Vulkan);
        assert!(!ctx.api().is_null());
        assert!(ctx.make_current().is_ok());
        ctx.release_current();

        ctx.release();
        assert!(ctx.is_released());
        assert!(ctx.api().is_null());
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_enum_forwards_mutable_state_to_backend() {
        let driver = FakeDriver::new(Backend::Gl);
        let mut ctx = HeadlessContext::from(driver.open().unwrap());
        let by_ref: &HeadlessContext = &ctx;
        assert!(!by_ref.is_released());

        let by_mut: &mut HeadlessContext = &mut ctx;
        by_mut.make_current().unwrap();
        by_mut.make_current().unwrap();
        assert_eq!(driver.binds(), 1);

        by_mut.release();
        assert_eq!(driver.unbinds(), 1);
        assert!(ctx.is_released());
        assert!(matches!(ctx.make_current(), Err(crate::HeadlessError::ContextReleased(Backend::Gl))));
    }
}
