use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use volumetric_clouds::{Downsample, ViewerConfig};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event::{DeviceEvent, DeviceId};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::camera::{Camera, CameraController};
use crate::input::Input;
use crate::wgpu_ctx::WgpuCtx;

pub struct App<'window> {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    wgpu_ctx: Option<WgpuCtx<'window>>,
    input_system: Input,
    camera: Camera,
    camera_controller: CameraController,
    show_gizmo: bool,
    last_frame_time: Option<Instant>,
}

impl<'window> App<'window> {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            window: None,
            wgpu_ctx: None,
            input_system: Input::default(),
            camera: Camera::default(),
            camera_controller: CameraController::default(),
            show_gizmo: true,
            last_frame_time: None,
        }
    }

    fn handle_hotkeys(&mut self) {
        if self.input_system.is_key_pressed(KeyCode::F1) {
            self.show_gizmo = !self.show_gizmo;
        }

        let Some(wgpu_ctx) = self.wgpu_ctx.as_mut() else {
            return;
        };
        let settings = wgpu_ctx.clouds_mut().settings_mut();

        if self.input_system.is_key_pressed(KeyCode::F2) {
            let enabled = !settings.enabled();
            settings.set_enabled(enabled);
            info!("Clouds {}", if enabled { "enabled" } else { "disabled" });
        }
        if self.input_system.is_key_pressed(KeyCode::F3) {
            let downsample = next_downsample(settings.downsample());
            settings.set_downsample(downsample);
            info!("Clouds downsample x{}", downsample.factor());
        }
    }
}

/// X1 -> X2 -> ... -> X32 -> X1
fn next_downsample(current: Downsample) -> Downsample {
    match current {
        Downsample::X32 => Downsample::X1,
        other => Downsample::from_factor(other.factor() * 2),
    }
}

impl<'window> ApplicationHandler for App<'window> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let win_attr = Window::default_attributes().with_title("Volumetric Clouds");
            let window = match event_loop.create_window(win_attr) {
                Ok(window) => Arc::new(window),
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                    return;
                }
            };
            match WgpuCtx::new(Arc::clone(&window), &self.config) {
                Ok(ctx) => self.wgpu_ctx = Some(ctx),
                Err(e) => {
                    error!("Failed to initialise renderer: {:#}", e);
                    event_loop.exit();
                    return;
                }
            }
            self.window = Some(window);
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
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
                if let Some(wgpu_ctx) = self.wgpu_ctx.as_mut() {
                    wgpu_ctx.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(wgpu_ctx), Some(window)) =
                    (self.wgpu_ctx.as_mut(), self.window.as_ref())
                {
                    wgpu_ctx.resize((new_size.width, new_size.height));
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = self
                    .last_frame_time
                    .map_or(0.0, |t| now.duration_since(t).as_secs_f32());
                self.last_frame_time = Some(now);

                self.handle_hotkeys();
                self.camera_controller
                    .update_camera(&self.input_system, &mut self.camera, dt);

                if let Some(wgpu_ctx) = self.wgpu_ctx.as_mut() {
                    wgpu_ctx.draw(&self.camera, self.show_gizmo);
                }
                self.input_system.update();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input_system.handle_key_input(key, event.state);
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                self.input_system.handle_mouse_button(button, state);
            }
            _ => (),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input_system.handle_mouse_motion((delta.0, delta.1));
        }
    }
}
