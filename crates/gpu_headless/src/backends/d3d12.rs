//! Direct3D 12 headless context
//!
//! First hardware adapter that supports feature level 12.0, or WARP when
//! none does and the config allows it. One direct command queue.

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_12_0;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateDevice, ID3D12CommandQueue, ID3D12Device, D3D12_COMMAND_LIST_TYPE_DIRECT,
    D3D12_COMMAND_QUEUE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIAdapter, IDXGIAdapter1, IDXGIFactory4, DXGI_ADAPTER_FLAG_SOFTWARE,
    DXGI_CREATE_FACTORY_FLAGS,
};

use crate::api::{Api, Backend};
use crate::config::HeadlessConfig;
use crate::context::Context;
use crate::error::{HeadlessError, HeadlessResult};
use crate::handle::{NativeHandle, NativeObject, RawHandle};

struct D3d12Device(ID3D12Device);

impl NativeObject for D3d12Device {
    const KIND: &'static str = "ID3D12Device";

    fn raw(&self) -> RawHandle {
        RawHandle::from_ptr(self.0.as_raw())
    }

    fn release(self) {
        drop(self.0);
    }
}

struct D3d12Queue(ID3D12CommandQueue);

impl NativeObject for D3d12Queue {
    const KIND: &'static str = "ID3D12CommandQueue";

    fn raw(&self) -> RawHandle {
        RawHandle::from_ptr(self.0.as_raw())
    }

    fn release(self) {
        drop(self.0);
    }
}

fn adapter_name(adapter: &IDXGIAdapter1) -> String {
    unsafe { adapter.GetDesc1() }.map_or_else(
        |_| "unknown adapter".to_string(),
        |desc| {
            let len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());
            String::from_utf16_lossy(&desc.Description[..len])
        },
    )
}

fn is_software(adapter: &IDXGIAdapter1) -> bool {
    unsafe { adapter.GetDesc1() }
        .map(|desc| desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0)
        .unwrap_or(true)
}

fn try_create_device<P>(adapter: P) -> Option<ID3D12Device>
where
    P: windows::core::Param<windows::core::IUnknown>,
{
    let mut device: Option<ID3D12Device> = None;
    match unsafe { D3D12CreateDevice(adapter, D3D_FEATURE_LEVEL_12_0, &mut device) } {
        Ok(()) => device,
        Err(e) => {
            log::debug!("D3D12CreateDevice rejected adapter: {e}");
            None
        }
    }
}

fn create_device(config: &HeadlessConfig) -> HeadlessResult<ID3D12Device> {
    let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0)) }
        .map_err(|e| HeadlessError::device(Backend::D3d12, format!("CreateDXGIFactory2: {e}")))?;

    let mut index = 0;
    while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
        index += 1;
        if is_software(&adapter) {
            continue;
        }
        if let Some(device) = try_create_device(&adapter) {
            log::info!("Selected GPU: {}", adapter_name(&adapter));
            return Ok(device);
        }
    }

    if config.d3d12.allow_software_adapter {
        log::warn!("No hardware adapter supports feature level 12.0, trying WARP");
        if let Ok(warp) = unsafe { factory.EnumWarpAdapter::<IDXGIAdapter>() } {
            if let Some(device) = try_create_device(&warp) {
                return Ok(device);
            }
        }
    }

    Err(HeadlessError::device(
        Backend::D3d12,
        format!("none of {index} adapters supports feature level 12.0"),
    ))
}

/// Headless Direct3D 12 context
#[derive(Debug)]
pub struct D3d12Context {
    queue: NativeHandle<D3d12Queue>,
    device: NativeHandle<D3d12Device>,
    pixel_format: i32,
}

impl D3d12Context {
    /// Create a device and a direct command queue
    pub fn new(config: &HeadlessConfig) -> HeadlessResult<Self> {
        let device = D3d12Device(create_device(config)?);

        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            ..Default::default()
        };
        let queue = match unsafe { device.0.CreateCommandQueue::<ID3D12CommandQueue>(&desc) } {
            Ok(queue) => queue,
            Err(e) => {
                device.release();
                return Err(HeadlessError::queue(Backend::D3d12, format!("CreateCommandQueue: {e}")));
            }
        };

        log::info!("Created headless Direct3D 12 context");
        Ok(Self {
            queue: NativeHandle::acquire(D3d12Queue(queue)),
            device: NativeHandle::acquire(device),
            pixel_format: Backend::D3d12.srgb_format(),
        })
    }

    /// The device, `None` once released
    pub fn device(&self) -> Option<&ID3D12Device> {
        self.device.get().map(|d| &d.0)
    }

    /// The direct command queue, `None` once released
    pub fn queue(&self) -> Option<&ID3D12CommandQueue> {
        self.queue.get().map(|q| &q.0)
    }
}

impl Context for D3d12Context {
    fn backend(&self) -> Backend {
        Backend::D3d12
    }

    fn api(&self) -> Api {
        Api::Direct3D12 {
            device: self.device.raw(),
            queue: self.queue.raw(),
            pixel_format: self.pixel_format,
        }
    }

    fn release(&mut self) {
        self.queue.release();
        self.device.release();
        self.pixel_format = 0;
    }

    fn is_released(&self) -> bool {
        self.device.is_released() && self.queue.is_released()
    }
}
