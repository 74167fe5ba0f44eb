use cgmath::{
    perspective, InnerSpace, Matrix4, Point3, Quaternion, Rad, Rotation, Vector3, Zero,
};
use volumetric_clouds::CameraPose;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::input::Input;

pub struct Camera {
    pub position: Point3<f32>,
    yaw: Rad<f32>,   // Rotation around Y axis
    pitch: Rad<f32>, // Rotation around X axis
}

impl Default for Camera {
    fn default() -> Self {
        Camera::new(Point3::new(0.0, 20.0, 0.0))
    }
}

impl Camera {
    pub const NEAR: f32 = 0.5;
    pub const FAR: f32 = 5000.0;

    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position,
            yaw: Rad(0.0),
            pitch: Rad(0.15),
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward_vector(), Vector3::unit_y())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        perspective(Rad(std::f32::consts::FRAC_PI_3), aspect, Self::NEAR, Self::FAR)
    }

    /// Position and orientation in the form the cloud renderer compares
    /// between frames.
    pub fn pose(&self) -> CameraPose {
        let rotation = Quaternion::look_at(self.forward_vector(), Vector3::unit_y());
        CameraPose::new(
            Vector3::new(self.position.x, self.position.y, self.position.z),
            rotation,
        )
    }

    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += Rad(delta_yaw);
        self.pitch += Rad(-delta_pitch); // Invert pitch for intuitive mouse control

        // Clamp pitch to prevent camera flipping
        self.pitch.0 = self.pitch.0.clamp(
            -std::f32::consts::FRAC_PI_2 + 0.1,
            std::f32::consts::FRAC_PI_2 - 0.1,
        );
    }

    pub fn forward_vector(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_yaw * cos_pitch, sin_pitch, sin_yaw * cos_pitch).normalize()
    }

    pub fn right_vector(&self) -> Vector3<f32> {
        self.forward_vector().cross(Vector3::unit_y()).normalize()
    }

    pub fn up_vector(&self) -> Vector3<f32> {
        self.right_vector().cross(self.forward_vector()).normalize()
    }
}

pub struct CameraController {
    speed: f32,
    sensitivity: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        CameraController::new(60.0, 0.003)
    }
}

impl CameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self { speed, sensitivity }
    }

    pub fn update_camera(&self, input: &Input, camera: &mut Camera, dt: f32) {
        // Mouse look only while the left button is held
        let mouse_delta = input.mouse_delta();
        if input.is_mouse_button_down(MouseButton::Left) {
            camera.rotate(
                mouse_delta.0 as f32 * self.sensitivity,
                mouse_delta.1 as f32 * self.sensitivity,
            );
        }

        let forward = camera.forward_vector();
        let right = camera.right_vector();
        let up = camera.up_vector();

        let mut movement = Vector3::zero();
        if input.is_key_down(KeyCode::KeyW) {
            movement += forward;
        }
        if input.is_key_down(KeyCode::KeyS) {
            movement -= forward;
        }
        if input.is_key_down(KeyCode::KeyA) {
            movement -= right;
        }
        if input.is_key_down(KeyCode::KeyD) {
            movement += right;
        }
        if input.is_key_down(KeyCode::Space) {
            movement += up;
        }
        if input.is_key_down(KeyCode::ShiftLeft) {
            movement -= up;
        }

        // Leaving the position untouched when idle keeps the pose bit-identical,
        // which is what lets the clouds accumulate.
        if movement != Vector3::zero() {
            let movement = movement.normalize() * self.speed * dt;
            camera.position += movement;
        }
    }
}
