//! Borealis demo viewer.
//!
//! Brings the render driver up against a real window: device selection,
//! queue acquisition, swapchain and command recording setup, then tracks
//! window resizes until close. Run with `RUST_LOG=debug` for the full
//! negotiation log.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use borealis_gpu::{
    create_driver, CommandBufferId, CommandPoolId, DriverConfig, QueueCaps, QueueId, RenderApi,
    RenderDriver, SurfaceId, SwapchainId,
};
use borealis_platform::{create_window, window_extent, PlatformConfig};

/// Everything the viewer holds once the driver is up.
struct RenderState {
    driver: Box<dyn RenderDriver>,
    surface: SurfaceId,
    queue: QueueId,
    swapchain: SwapchainId,
    command_pool: CommandPoolId,
    #[allow(dead_code)]
    command_buffer: CommandBufferId,
}

impl RenderState {
    fn new(window: &Window) -> anyhow::Result<Self> {
        let (width, height) = window_extent(window);

        let mut driver = create_driver(
            RenderApi::Vulkan,
            DriverConfig {
                app_name: "Borealis Viewer".to_string(),
                ..Default::default()
            },
            window,
        )
        .context("driver construction")?;

        info!(
            "{} {} with {} device(s)",
            driver.api_name(),
            driver.api_version_string(),
            driver.device_count()
        );

        let surface = driver
            .create_surface(window, width, height)
            .context("surface creation")?;

        let device_index = driver
            .choose_device(&[surface])
            .context("device selection")?;
        driver.select_device(device_index)?;

        let family = driver
            .choose_queue_family(QueueCaps::GRAPHICS, Some(surface))
            .context("no graphics+present queue family")?;
        let queue = driver.get_queue(family)?;

        let swapchain = driver.create_swapchain(surface).context("swapchain creation")?;
        let command_pool = driver.create_command_pool(queue)?;
        let command_buffer = driver.create_command_buffer(command_pool)?;

        // Smoke-test a recording session; real frame recording comes later.
        driver.begin_command_buffer(command_buffer)?;
        driver.end_command_buffer(command_buffer)?;

        Ok(Self {
            driver,
            surface,
            queue,
            swapchain,
            command_pool,
            command_buffer,
        })
    }

    fn teardown(mut self) {
        self.driver.destroy_command_pool(self.command_pool);
        self.driver.destroy_swapchain(self.swapchain);
        self.driver.destroy_surface(self.surface);
        self.driver.free_queue(self.queue);
    }
}

#[derive(Default)]
struct Viewer {
    window: Option<Window>,
    state: Option<RenderState>,
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let config = PlatformConfig {
            title: "Borealis Viewer".to_string(),
            ..Default::default()
        };
        let window = match create_window(event_loop, &config) {
            Ok(window) => window,
            Err(e) => {
                error!("{e}");
                event_loop.exit();
                return;
            }
        };

        match RenderState::new(&window) {
            Ok(state) => {
                self.state = Some(state);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Renderer initialization failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = self.state.take() {
                    state.teardown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = self.state.as_mut() {
                    if let Err(e) = state.driver.resize_swapchain(state.swapchain) {
                        error!("Swapchain resize failed: {e}");
                    } else {
                        info!("Resized to {}x{}", size.width, size.height);
                    }
                }
            }
            _ => (),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Borealis viewer starting...");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer::default();
    event_loop.run_app(&mut viewer)?;
    Ok(())
}
