//! Fault-injecting fake backend
//!
//! Impersonates any [`Backend`] tag without touching a GPU. Every "native"
//! object it hands out is counted by its [`FakeDriver`], so tests can check
//! that failed constructions leave nothing allocated and that release
//! happens exactly once. When impersonating a thread-affine backend (GL) it
//! also enforces the current-thread rules.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{Api, Backend};
use crate::context::{Binding, Context, ThreadBinding};
use crate::error::{HeadlessError, HeadlessResult};
use crate::handle::{NativeHandle, NativeObject, RawHandle};

/// Which native call the fake driver should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    /// Every call succeeds
    #[default]
    None,
    /// Device creation returns null
    Device,
    /// Device creation succeeds, queue creation returns null
    Queue,
    /// Binding the context to a thread fails
    MakeCurrent,
}

#[derive(Debug)]
struct DriverState {
    live: AtomicUsize,
    device_creations: AtomicUsize,
    queue_creations: AtomicUsize,
    releases: AtomicUsize,
    binds: AtomicUsize,
    unbinds: AtomicUsize,
    next_address: AtomicU64,
    allocated: Mutex<Vec<u64>>,
}

impl Default for DriverState {
    fn default() -> Self {
        Self {
            live: AtomicUsize::new(0),
            device_creations: AtomicUsize::new(0),
            queue_creations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            binds: AtomicUsize::new(0),
            unbinds: AtomicUsize::new(0),
            next_address: AtomicU64::new(0x1000),
            allocated: Mutex::default(),
        }
    }
}

impl DriverState {
    fn allocate(self: &Arc<Self>) -> Allocation {
        self.live.fetch_add(1, Ordering::SeqCst);
        let address = self.next_address.fetch_add(0x100, Ordering::SeqCst);
        self.allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address);
        Allocation {
            address,
            state: Arc::clone(self),
        }
    }
}

/// Shared allocation ledger and fault plan for fake contexts
///
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    backend: Backend,
    fault: Fault,
    state: Arc<DriverState>,
}

impl FakeDriver {
    /// Driver impersonating `backend`, with no faults
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            fault: Fault::None,
            state: Arc::default(),
        }
    }

    /// Fail the given native call
    #[must_use]
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Backend tag this driver impersonates
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Native objects currently allocated and not yet released
    pub fn live_objects(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Device creation calls observed
    pub fn device_creations(&self) -> usize {
        self.state.device_creations.load(Ordering::SeqCst)
    }

    /// Queue creation calls observed
    pub fn queue_creations(&self) -> usize {
        self.state.queue_creations.load(Ordering::SeqCst)
    }

    /// Native release calls observed
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Native bind calls observed
    pub fn binds(&self) -> usize {
        self.state.binds.load(Ordering::SeqCst)
    }

    /// Native unbind calls observed
    pub fn unbinds(&self) -> usize {
        self.state.unbinds.load(Ordering::SeqCst)
    }

    /// Every native address handed out so far, in creation order
    ///
    /// A successful [`FakeDriver::open`] adds the device, then the queue.
    pub fn allocations(&self) -> Vec<RawHandle> {
        self.state
            .allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|&address| RawHandle::from_u64(address))
            .collect()
    }

    /// Create a fake context, following the same acquisition order as the
    /// real backends
    pub fn open(&self) -> HeadlessResult<FakeContext> {
        let backend = self.backend;

        self.state.device_creations.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Device {
            return Err(HeadlessError::device(backend, "fake driver returned a null device"));
        }
        let mut device = NativeHandle::acquire(FakeDevice(self.state.allocate()));

        self.state.queue_creations.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Queue {
            device.release();
            return Err(HeadlessError::queue(backend, "fake driver returned a null queue"));
        }
        let queue = NativeHandle::acquire(FakeQueue(self.state.allocate()));

        log::debug!("Opened fake {backend} context");
        Ok(FakeContext {
            backend,
            device,
            queue,
            pixel_format: backend.srgb_format(),
            binding: ThreadBinding::default(),
            driver: self.clone(),
        })
    }
}

#[derive(Debug)]
struct Allocation {
    address: u64,
    state: Arc<DriverState>,
}

impl Allocation {
    fn free(self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct FakeDevice(Allocation);

impl NativeObject for FakeDevice {
    const KIND: &'static str = "FakeDevice";

    fn raw(&self) -> RawHandle {
        RawHandle::from_u64(self.0.address)
    }

    fn release(self) {
        self.0.free();
    }
}

#[derive(Debug)]
struct FakeQueue(Allocation);

impl NativeObject for FakeQueue {
    const KIND: &'static str = "FakeQueue";

    fn raw(&self) -> RawHandle {
        RawHandle::from_u64(self.0.address)
    }

    fn release(self) {
        self.0.free();
    }
}

/// Context handed out by [`FakeDriver::open`]
#[derive(Debug)]
pub struct FakeContext {
    backend: Backend,
    device: NativeHandle<FakeDevice>,
    queue: NativeHandle<FakeQueue>,
    pixel_format: i32,
    binding: ThreadBinding,
    driver: FakeDriver,
}

impl FakeContext {
    /// Driver that created this context
    pub const fn driver(&self) -> &FakeDriver {
        &self.driver
    }
}

impl Context for FakeContext {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn api(&self) -> Api {
        Api::paired(self.backend, self.device.raw(), self.queue.raw(), self.pixel_format)
    }

    fn make_current(&mut self) -> HeadlessResult<()> {
        if !self.backend.requires_current() {
            return Ok(());
        }
        if self.is_released() {
            return Err(HeadlessError::ContextReleased(self.backend));
        }

        match self.binding.binding() {
            Binding::CurrentHere => Ok(()),
            Binding::CurrentElsewhere(owner) => Err(HeadlessError::make_current(
                self.backend,
                format!("already current on thread {owner:?}"),
            )),
            Binding::Unbound => {
                if self.driver.fault == Fault::MakeCurrent {
                    return Err(HeadlessError::make_current(self.backend, "fake driver refused to bind"));
                }
                self.driver.state.binds.fetch_add(1, Ordering::SeqCst);
                self.binding.bind_here();
                Ok(())
            }
        }
    }

    fn release_current(&mut self) {
        if self.binding.binding() == Binding::CurrentHere {
            self.driver.state.unbinds.fetch_add(1, Ordering::SeqCst);
            self.binding.clear();
        }
    }

    fn release(&mut self) {
        self.release_current();
        self.queue.release();
        self.device.release();
        self.pixel_format = 0;
        self.binding.clear();
    }

    fn is_released(&self) -> bool {
        self.device.is_released() && self.queue.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_allocates_device_and_queue() {
        let driver = FakeDriver::new(Backend::Metal);
        let ctx = driver.open().unwrap();

        assert_eq!(driver.live_objects(), 2);
        assert_eq!(driver.device_creations(), 1);
        assert_eq!(driver.queue_creations(), 1);
        assert_eq!(driver.allocations(), vec![ctx.api().device(), ctx.api().queue()]);
        drop(ctx);
        // Backstop in NativeHandle::drop
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_device_fault_skips_queue_creation() {
        let driver = FakeDriver::new(Backend::Vulkan).with_fault(Fault::Device);
        let error = driver.open().unwrap_err();

        assert!(error.to_string().contains("device"));
        assert_eq!(driver.queue_creations(), 0);
        assert_eq!(driver.live_objects(), 0);
        assert_eq!(driver.releases(), 0);
    }

    #[test]
    fn test_queue_fault_releases_device_first() {
        let driver = FakeDriver::new(Backend::D3d12).with_fault(Fault::Queue);
        let error = driver.open().unwrap_err();

        assert!(matches!(error, HeadlessError::QueueCreation { backend: Backend::D3d12, .. }));
        assert_eq!(driver.device_creations(), 1);
        assert_eq!(driver.releases(), 1);
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_release_is_exactly_once() {
        let driver = FakeDriver::new(Backend::Metal);
        let mut ctx = driver.open().unwrap();

        ctx.release();
        ctx.release();

        assert_eq!(driver.releases(), 2);
        assert_eq!(driver.live_objects(), 0);
        assert!(ctx.is_released());
    }

    #[test]
    fn test_release_unbinds_current_context() {
        let driver = FakeDriver::new(Backend::Gl);
        let mut ctx = driver.open().unwrap();

        ctx.make_current().unwrap();
        ctx.release();

        assert_eq!(driver.binds(), 1);
        assert_eq!(driver.unbinds(), 1);
        assert!(matches!(ctx.make_current(), Err(HeadlessError::ContextReleased(Backend::Gl))));
    }

    #[test]
    fn test_make_current_fault() {
        let driver = FakeDriver::new(Backend::Gl).with_fault(Fault::MakeCurrent);
        let mut ctx = driver.open().unwrap();

        let error = ctx.make_current().unwrap_err();
        assert!(matches!(error, HeadlessError::MakeCurrent { .. }));
        assert_eq!(driver.binds(), 0);

        // Nothing was bound, so unbinding does nothing
        ctx.release_current();
        assert_eq!(driver.unbinds(), 0);
        ctx.release();
    }
}
