//! Vulkan context management
//!
//! Instance, physical device selection and logical device creation. The
//! objects here are assembled into an [`AshDevice`](super::ash_device::AshDevice),
//! which the rest of the backend reaches through the `GpuDevice` seam.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A shader stage is missing or failed to compile
    #[error("Shader compilation failed ({stage}): {reason}")]
    ShaderCompilation {
        /// Stage name
        stage: &'static str,
        /// Failure description
        reason: String,
    },

    /// SPIR-V reflection failed
    #[error("Shader reflection failed: {0}")]
    Reflection(String),

    /// Image decoding or validation failed
    #[error("Image load failed: {0}")]
    ImageLoad(String),

    /// A named resource does not exist
    #[error("Resource not found: {name}")]
    ResourceNotFound {
        /// Resource name
        name: String,
    },
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Platform window that can host a Vulkan surface
pub trait SurfaceProvider {
    /// Instance extensions required to create the surface
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create the surface for `instance`
    fn create_surface(&mut self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);
}

fn c_string(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|e| VulkanError::InitializationFailed(format!("invalid name {value:?}: {e}")))
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, with validation layers when requested in debug builds
    pub fn new(required_extensions: &[String], app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name_cstr = c_string(app_name)?;
        let engine_name_cstr = c_string("VulkanBackend")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| c_string(ext))
            .collect::<VulkanResult<Vec<_>>>()?;

        #[allow(unused_mut)]
        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let validation = cfg!(debug_assertions) && enable_validation;

        #[cfg(debug_assertions)]
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if validation {
            vec![c_string("VK_LAYER_KHRONOS_validation")?]
        } else {
            Vec::new()
        };
        let layer_names_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation: {})",
            app_name,
            validation
        );

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { Ok(debug_utils.create_debug_utils_messenger(&create_info, None)?) }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) = (&self.debug_utils, &self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first physical device that can render to `surface`
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(device_info) => {
                    log::info!("Selected GPU: {}", unsafe {
                        CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(device_info);
                }
                Err(err) => log::debug!("Skipping physical device: {}", err),
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support =
                unsafe { surface_loader.get_physical_device_surface_support(device, index, surface)? };

            // Prefer a family that does both
            if present_support && (present_family.is_none() || graphics_family == Some(index)) {
                present_family = Some(index);
            }

            if graphics_family.is_some() && graphics_family == present_family {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
        let has_swapchain = extensions.iter().any(|available| {
            let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            extension_name == SwapchainLoader::name()
        });

        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with required queues
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let mut families = vec![physical_device_info.graphics_family];
        if physical_device_info.present_family != physical_device_info.graphics_family {
            families.push(physical_device_info.present_family);
        }

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical_device_info.features.sampler_anisotropy == vk::TRUE)
            .fill_mode_non_solid(physical_device_info.features.fill_mode_non_solid == vk::TRUE)
            .depth_clamp(physical_device_info.features.depth_clamp == vk::TRUE)
            .sample_rate_shading(physical_device_info.features.sample_rate_shading == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device_info.device, &create_info, None)? };

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
