//! Deferred renderer demo.
//!
//! Usage: `deferred [config.toml]`. A missing config file means defaults.

use anyhow::{Context, Result};
use tracing::{error, info, trace};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use deferred_core::Config;
use deferred_platform::{KeyAction, Window, extent_of};
use deferred_renderer::FrameOrchestrator;
use deferred_scene::DemoScene;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Render continuously, but sleep until the next event while minimized.
fn control_flow_for(minimized: bool) -> ControlFlow {
    if minimized {
        ControlFlow::Wait
    } else {
        ControlFlow::Poll
    }
}

struct App {
    config: Config,
    // Dropped before the window it renders to.
    renderer: Option<FrameOrchestrator<DemoScene>>,
    window: Option<Window>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let scene = DemoScene::new(&self.config.scene);
        let renderer = FrameOrchestrator::new(&window, &self.config, scene)
            .context("initializing renderer")?;
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn handle_event(&mut self, event_loop: &ActiveEventLoop, event: WindowEvent) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                renderer
                    .on_resize(extent_of(size))
                    .context("resizing swapchain")?;
            }
            WindowEvent::KeyboardInput { event, .. } => match KeyAction::from_event(&event) {
                Some(KeyAction::Down(key)) => renderer.key_down(key),
                Some(KeyAction::Up(key)) => renderer.key_up(key),
                None => {}
            },
            WindowEvent::RedrawRequested => {
                let status = renderer.draw_frame().context("drawing frame")?;
                trace!("Frame {:?}", status);
            }
            _ => {}
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("Startup failed: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.handle_event(event_loop, event) {
            error!("Fatal renderer error: {:#}", e);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let minimized = window.is_minimized();
        event_loop.set_control_flow(control_flow_for(minimized));
        if !minimized {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    deferred_core::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;
    info!("Starting deferred renderer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimized_window_waits_for_events() {
        assert_eq!(control_flow_for(true), ControlFlow::Wait);
        assert_eq!(control_flow_for(false), ControlFlow::Poll);
    }
}
