//! Window management using GLFW
//!
//! Provides window creation, event polling and Vulkan surface creation for the
//! ash device.

use super::context::{SurfaceProvider, VulkanError, VulkanResult};
use ash::{vk, Entry, Instance};
use vk::Handle;

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window without a client API
    pub fn new(title: &str, width: u32, height: u32) -> VulkanResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| VulkanError::InitializationFailed(format!("GLFW initialization failed: {e:?}")))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or_else(|| VulkanError::InitializationFailed("Window creation failed".to_string()))?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self { glfw, window, events })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the platform event queue
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain pending events; returns the last framebuffer resize, if any
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        let mut resize = None;
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    resize = Some((width.max(0) as u32, height.max(0) as u32));
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                _ => {}
            }
        }
        resize
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::InitializationFailed("Failed to get required extensions".to_string()))
    }

    fn create_surface(&mut self, _entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            log::debug!("Created window surface {:#x}", surface.as_raw());
            Ok(surface)
        } else {
            Err(VulkanError::InitializationFailed(format!(
                "Failed to create Vulkan surface: {result:?}"
            )))
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}
