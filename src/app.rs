use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::OrbitCamera;
use crate::config::AppConfig;
use crate::demo::DemoScene;
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::mesh::MeshLibrary;
use crate::method::TransparencyMethod;
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::shader_types::ViewMode;

/// Radians the orbit moves per arrow key press.
const ROTATE_STEP: f32 = 0.08;

/// What a key press asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Action {
    SetMethod(TransparencyMethod),
    CycleMethod,
    CycleViewMode,
    TogglePause,
    Rotate { azimuth: f32, elevation: f32 },
    Quit,
}

impl Action {
    fn from_key(key: KeyCode) -> Option<Self> {
        let action = match key {
            KeyCode::Digit1 | KeyCode::Numpad1 => {
                Action::SetMethod(TransparencyMethod::AlphaBlending)
            }
            KeyCode::Digit2 | KeyCode::Numpad2 => Action::SetMethod(TransparencyMethod::KBuffer2),
            KeyCode::Digit4 | KeyCode::Numpad4 => Action::SetMethod(TransparencyMethod::KBuffer4),
            KeyCode::Space => Action::CycleMethod,
            KeyCode::KeyV => Action::CycleViewMode,
            KeyCode::KeyP => Action::TogglePause,
            KeyCode::ArrowLeft => Action::Rotate {
                azimuth: -ROTATE_STEP,
                elevation: 0.0,
            },
            KeyCode::ArrowRight => Action::Rotate {
                azimuth: ROTATE_STEP,
                elevation: 0.0,
            },
            KeyCode::ArrowUp => Action::Rotate {
                azimuth: 0.0,
                elevation: ROTATE_STEP,
            },
            KeyCode::ArrowDown => Action::Rotate {
                azimuth: 0.0,
                elevation: -ROTATE_STEP,
            },
            KeyCode::Escape => Action::Quit,
            _ => return None,
        };
        Some(action)
    }

    /// Only orbit nudges follow key repeat.
    fn repeats(self) -> bool {
        matches!(self, Action::Rotate { .. })
    }
}

fn window_title(base: &str, method: TransparencyMethod, view_mode: ViewMode) -> String {
    match view_mode {
        ViewMode::Final => format!("{base} | {}", method.label()),
        mode => format!("{base} | {} ({})", method.label(), mode.label()),
    }
}

/// Everything alive while the window is open.
struct Running {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: Renderer,
    meshes: MeshLibrary,
    demo: DemoScene,
    scene: Scene,
    orbit: OrbitCamera,
    title: String,
    paused: bool,
    time: f32,
    last_frame: Instant,
}

impl Running {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig) -> Result<Self> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContext::new(window.clone(), config.vsync)?;
        let renderer = Renderer::new(&gpu, config)?;
        let mut meshes = MeshLibrary::new();
        let demo = DemoScene::new(&gpu, &mut meshes);

        let running = Self {
            window,
            gpu,
            renderer,
            meshes,
            demo,
            scene: Scene::new(),
            orbit: OrbitCamera::new().target([0.0, 0.0, 0.0]).distance(6.5).elevation(0.4),
            title: config.title.clone(),
            paused: false,
            time: 0.0,
            last_frame: Instant::now(),
        };
        running.update_title();
        Ok(running)
    }

    fn update_title(&self) {
        let title = window_title(&self.title, self.renderer.method(), self.renderer.view_mode());
        self.window.set_title(&title);
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(action) = Action::from_key(code) else {
            return;
        };
        if event.repeat && !action.repeats() {
            return;
        }

        match action {
            Action::SetMethod(method) => {
                self.renderer.set_method(method);
            }
            Action::CycleMethod => {
                let next = self.renderer.method().next();
                self.renderer.set_method(next);
            }
            Action::CycleViewMode => {
                let next = self.renderer.view_mode().next();
                self.renderer.set_view_mode(next);
            }
            Action::TogglePause => {
                self.paused = !self.paused;
                self.orbit.paused = self.paused;
                log::info!("animation {}", if self.paused { "paused" } else { "resumed" });
            }
            Action::Rotate { azimuth, elevation } => self.orbit.rotate(azimuth, elevation),
            Action::Quit => event_loop.exit(),
        }
        self.update_title();
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if !self.paused {
            self.time += dt;
        }
        self.orbit.update(dt);
        self.demo.populate(&mut self.scene, self.time);

        let camera = self.orbit.camera();
        self.renderer.render(&self.gpu, &self.scene, &self.meshes, &camera)?;
        self.window.request_redraw();
        Ok(())
    }

    fn handle_event(&mut self, event_loop: &ActiveEventLoop, event: WindowEvent) -> Result<()> {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                self.renderer.resize(&mut self.gpu, size.width, size.height)?;
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw()?,
            _ => {}
        }
        Ok(())
    }
}

enum StrataApp {
    Pending { config: AppConfig },
    Running(Box<Running>),
    Failed(Error),
}

impl StrataApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Error) {
        log::error!("{err}");
        *self = StrataApp::Failed(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for StrataApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let StrataApp::Pending { config } = self {
            match Running::new(event_loop, config) {
                Ok(running) => *self = StrataApp::Running(Box::new(running)),
                Err(err) => self.fail(event_loop, err),
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let StrataApp::Running(running) = self else {
            return;
        };
        if let Err(err) = running.handle_event(event_loop, event) {
            self.fail(event_loop, err);
        }
    }
}

/// Opens the sample window and runs until it is closed.
///
/// Returns the first error that stopped the event loop.
pub fn run(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    log::info!("starting with {}", config.method);
    let mut app = StrataApp::Pending { config };
    event_loop.run_app(&mut app)?;

    match app {
        StrataApp::Failed(err) => Err(err),
        _ => Ok(()),
    }
}
