//! The windowed run loop.

use std::thread;

use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use renderer_core::EngineConfig;
use renderer_platform::{EngineEvent, LoopControl, Window, translate_window_event};

use crate::engine::{Engine, EngineError};

/// Opens the window, initializes the engine and draws until quit.
///
/// # Errors
///
/// Returns the first fatal error: window or engine creation, a failed
/// frame, or the event loop itself.
pub fn run(config: EngineConfig) -> Result<(), EngineError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.shutdown();
    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct App {
    config: EngineConfig,
    control: LoopControl,
    // Dropped before the window its surface was created from.
    engine: Option<Engine>,
    window: Option<Window>,
    error: Option<EngineError>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            control: LoopControl::new(),
            engine: None,
            window: None,
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        let window = Window::new(
            event_loop,
            self.config.window.width,
            self.config.window.height,
            &self.config.window.title,
        )?;
        let engine = Engine::init(&self.config, &window)?;

        info!("Initialization complete, entering main loop");
        self.engine = Some(engine);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: EngineError) {
        error!("Fatal error: {}", e);
        self.shutdown();
        self.error.get_or_insert(e);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.cleanup();
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let event = translate_window_event(&event, self.control.is_suspended());
        self.control.apply(event);

        if self.control.should_quit() {
            info!("Quit requested, shutting down");
            event_loop.exit();
            return;
        }

        if event != EngineEvent::Redraw || self.control.is_suspended() {
            return;
        }

        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Err(e) = engine.draw() {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.control.is_suspended() {
            thread::sleep(self.config.frame.suspended_sleep());
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
