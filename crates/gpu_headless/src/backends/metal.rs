//! Metal headless context
//!
//! System default device plus one command queue. Metal has no notion of a
//! current context, so binding is a no-op.

use std::ffi::c_void;

use objc2::rc::{autoreleasepool, Retained};
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLCommandQueue, MTLCreateSystemDefaultDevice, MTLDevice};

use crate::api::{Api, Backend};
use crate::context::Context;
use crate::error::{HeadlessError, HeadlessResult};
use crate::handle::{NativeHandle, NativeObject, RawHandle};

// MTLCreateSystemDefaultDevice needs CoreGraphics linked in
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {}

struct MetalDevice(Retained<ProtocolObject<dyn MTLDevice>>);

impl NativeObject for MetalDevice {
    const KIND: &'static str = "MTLDevice";

    fn raw(&self) -> RawHandle {
        RawHandle::from_const_ptr(Retained::as_ptr(&self.0).cast::<c_void>())
    }

    fn release(self) {
        drop(self.0);
    }
}

struct MetalQueue(Retained<ProtocolObject<dyn MTLCommandQueue>>);

impl NativeObject for MetalQueue {
    const KIND: &'static str = "MTLCommandQueue";

    fn raw(&self) -> RawHandle {
        RawHandle::from_const_ptr(Retained::as_ptr(&self.0).cast::<c_void>())
    }

    fn release(self) {
        drop(self.0);
    }
}

/// Headless Metal context
pub struct MetalContext {
    queue: NativeHandle<MetalQueue>,
    device: NativeHandle<MetalDevice>,
    pixel_format: i32,
}

impl MetalContext {
    /// Acquire the system default device and a command queue on it
    pub fn new() -> HeadlessResult<Self> {
        autoreleasepool(|_| {
            let device = MTLCreateSystemDefaultDevice()
                .map(MetalDevice)
                .ok_or_else(|| HeadlessError::device(Backend::Metal, "MTLCreateSystemDefaultDevice returned nil"))?;

            let Some(queue) = device.0.newCommandQueue() else {
                device.release();
                return Err(HeadlessError::queue(Backend::Metal, "newCommandQueue returned nil"));
            };

            log::info!("Created headless Metal context");
            Ok(Self {
                queue: NativeHandle::acquire(MetalQueue(queue)),
                device: NativeHandle::acquire(device),
                pixel_format: Backend::Metal.srgb_format(),
            })
        })
    }

    /// The Metal device, `None` once released
    pub fn device(&self) -> Option<&ProtocolObject<dyn MTLDevice>> {
        self.device.get().map(|d| &*d.0)
    }

    /// The command queue, `None` once released
    pub fn queue(&self) -> Option<&ProtocolObject<dyn MTLCommandQueue>> {
        self.queue.get().map(|q| &*q.0)
    }
}

impl Context for MetalContext {
    fn backend(&self) -> Backend {
        Backend::Metal
    }

    fn api(&self) -> Api {
        Api::Metal {
            device: self.device.raw(),
            queue: self.queue.raw(),
            pixel_format: self.pixel_format,
        }
    }

    fn release(&mut self) {
        autoreleasepool(|_| {
            self.queue.release();
            self.device.release();
        });
        self.pixel_format = 0;
    }

    fn is_released(&self) -> bool {
        self.device.is_released() && self.queue.is_released()
    }
}

impl std::fmt::Debug for MetalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetalContext")
            .field("device", &self.device.raw())
            .field("queue", &self.queue.raw())
            .field("pixel_format", &self.pixel_format)
            .finish()
    }
}
