//! Windowing layer for the Borealis renderer.
//!
//! Window creation via winit. The GPU layer never talks to winit directly;
//! it only consumes the raw display and window handles a `Window` exposes.

use thiserror::Error;
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Borealis".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Create the main window from a running event loop.
pub fn create_window(event_loop: &ActiveEventLoop, config: &PlatformConfig) -> Result<Window> {
    let attributes = Window::default_attributes()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_resizable(config.resizable);

    let window = event_loop
        .create_window(attributes)
        .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

    info!("Created window: {} ({}x{})", config.title, config.width, config.height);
    Ok(window)
}

/// Current framebuffer size of a window.
pub fn window_extent(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    (size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_resizable_hd() {
        let config = PlatformConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert!(config.resizable);
    }
}
