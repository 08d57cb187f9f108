//! Vulkan headless context
//!
//! Instance, physical device, logical device and one graphics queue. No
//! surface or swapchain extensions are requested, so this works on machines
//! without a display server.

use std::ffi::{CStr, CString};

use ash::vk::{self, Handle};
use ash::{Device, Entry, Instance};

use crate::api::{Api, Backend};
use crate::config::HeadlessConfig;
use crate::context::Context;
use crate::error::{HeadlessError, HeadlessResult};
use crate::handle::{NativeHandle, NativeObject, RawHandle};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"gpu_headless";

/// Loader plus instance; released after the device
struct VulkanInstance {
    instance: Instance,
    _entry: Entry,
}

impl VulkanInstance {
    fn new(config: &HeadlessConfig) -> HeadlessResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| HeadlessError::device(Backend::Vulkan, format!("failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| HeadlessError::device(Backend::Vulkan, format!("invalid application name: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let layer_names = if config.validation_enabled() && validation_layer_available(&entry) {
            log::debug!("Enabling {}", VALIDATION_LAYER.to_string_lossy());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| HeadlessError::device(Backend::Vulkan, format!("vkCreateInstance: {e}")))?;

        Ok(Self {
            instance,
            _entry: entry,
        })
    }
}

impl NativeObject for VulkanInstance {
    const KIND: &'static str = "VkInstance";

    fn raw(&self) -> RawHandle {
        RawHandle::from_u64(self.instance.handle().as_raw())
    }

    fn release(self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let layers = match entry.enumerate_instance_layer_properties() {
        Ok(layers) => layers,
        Err(e) => {
            log::warn!("Could not enumerate Vulkan layers: {e}");
            return false;
        }
    };
    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !available {
        log::warn!("Validation requested but {} is not installed", VALIDATION_LAYER.to_string_lossy());
    }
    available
}

struct VulkanDevice {
    device: Device,
}

impl NativeObject for VulkanDevice {
    const KIND: &'static str = "VkDevice";

    fn raw(&self) -> RawHandle {
        RawHandle::from_u64(self.device.handle().as_raw())
    }

    fn release(self) {
        unsafe {
            teardown_step("vkDeviceWaitIdle", self.device.device_wait_idle());
            self.device.destroy_device(None);
        }
    }
}

/// Log a failed teardown call; release carries on regardless
fn teardown_step(call: &str, result: ash::prelude::VkResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{call} failed during release: {e}");
            false
        }
    }
}

/// Queues belong to their device; releasing one only drops the reference
struct VulkanQueue {
    queue: vk::Queue,
}

impl NativeObject for VulkanQueue {
    const KIND: &'static str = "VkQueue";

    fn raw(&self) -> RawHandle {
        RawHandle::from_u64(self.queue.as_raw())
    }

    fn release(self) {}
}

/// Physical device chosen for the context
struct SelectedDevice {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
}

fn select_physical_device(instance: &Instance) -> HeadlessResult<SelectedDevice> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| HeadlessError::device(Backend::Vulkan, format!("vkEnumeratePhysicalDevices: {e}")))?;

    for physical_device in physical_devices {
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let graphics_family = families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .and_then(|index| u32::try_from(index).ok());

        if let Some(queue_family) = graphics_family {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            log::info!(
                "Selected GPU: {} ({:?})",
                unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
                properties.device_type
            );
            return Ok(SelectedDevice {
                physical_device,
                queue_family,
            });
        }
    }

    Err(HeadlessError::device(
        Backend::Vulkan,
        "no physical device with a graphics queue family",
    ))
}

fn create_logical_device(instance: &Instance, selected: &SelectedDevice) -> HeadlessResult<VulkanDevice> {
    let priorities = [1.0_f32];
    let queue_infos = [vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(selected.queue_family)
        .queue_priorities(&priorities)
        .build()];
    let create_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos);

    let device = unsafe { instance.create_device(selected.physical_device, &create_info, None) }
        .map_err(|e| HeadlessError::device(Backend::Vulkan, format!("vkCreateDevice: {e}")))?;
    Ok(VulkanDevice { device })
}

/// Headless Vulkan context
#[derive(Debug)]
pub struct VulkanContext {
    queue: NativeHandle<VulkanQueue>,
    device: NativeHandle<VulkanDevice>,
    instance: NativeHandle<VulkanInstance>,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    pixel_format: i32,
}

impl VulkanContext {
    /// Create instance, device and graphics queue
    ///
    /// On failure everything created so far is destroyed before returning.
    pub fn new(config: &HeadlessConfig) -> HeadlessResult<Self> {
        let instance = VulkanInstance::new(config)?;

        let selected = match select_physical_device(&instance.instance) {
            Ok(selected) => selected,
            Err(error) => {
                instance.release();
                return Err(error);
            }
        };

        let device = match create_logical_device(&instance.instance, &selected) {
            Ok(device) => device,
            Err(error) => {
                instance.release();
                return Err(error);
            }
        };

        let queue = unsafe { device.device.get_device_queue(selected.queue_family, 0) };
        if queue == vk::Queue::null() {
            device.release();
            instance.release();
            return Err(HeadlessError::queue(
                Backend::Vulkan,
                format!("no queue 0 in family {}", selected.queue_family),
            ));
        }

        log::info!("Created headless Vulkan context (queue family {})", selected.queue_family);
        Ok(Self {
            queue: NativeHandle::acquire(VulkanQueue { queue }),
            device: NativeHandle::acquire(device),
            instance: NativeHandle::acquire(instance),
            physical_device: selected.physical_device,
            queue_family: selected.queue_family,
            pixel_format: Backend::Vulkan.srgb_format(),
        })
    }

    /// The ash instance, `None` once released
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.get().map(|i| &i.instance)
    }

    /// The ash device, `None` once released
    pub fn device(&self) -> Option<&Device> {
        self.device.get().map(|d| &d.device)
    }

    /// Graphics queue, null once released
    pub fn queue(&self) -> vk::Queue {
        self.queue.get().map_or_else(vk::Queue::null, |q| q.queue)
    }

    /// Queue family the queue was taken from
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }
}

impl Context for VulkanContext {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn api(&self) -> Api {
        Api::Vulkan {
            instance: self.instance.raw(),
            physical_device: RawHandle::from_u64(self.physical_device.as_raw()),
            device: self.device.raw(),
            queue: self.queue.raw(),
            queue_family: self.queue_family,
            queue_index: 0,
            pixel_format: self.pixel_format,
        }
    }

    fn release(&mut self) {
        // Device before instance
        self.queue.release();
        self.device.release();
        self.instance.release();
        self.physical_device = vk::PhysicalDevice::null();
        self.queue_family = 0;
        self.pixel_format = 0;
    }

    fn is_released(&self) -> bool {
        self.device.is_released() && self.queue.is_released() && self.instance.is_released()
    }
}
