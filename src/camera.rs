use glam::{Mat4, Vec2, Vec3, Vec4};
use std::cell::RefCell;
use std::rc::Rc;

const DEFAULT_UP: Vec3 = Vec3::Y;

/// Size of the render surface in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Converts a pointer position to normalized device coordinates (`-1..1`, y up).
    pub fn to_ndc(&self, screen: Vec2) -> Option<Vec2> {
        if self.is_empty() {
            return None;
        }
        Some(Vec2::new((2.0 * screen.x / self.width) - 1.0, 1.0 - (2.0 * screen.y / self.height)))
    }
}

#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: Viewport) -> Mat4 {
        self.projection_matrix(viewport.aspect()) * self.view_matrix()
    }

    /// World-space ray from the camera through a screen-space position.
    pub fn screen_ray(&self, screen: Vec2, viewport: Viewport) -> Option<(Vec3, Vec3)> {
        let ndc = viewport.to_ndc(screen)?;
        let clip = Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        let inv_view_proj = self.view_projection(viewport).inverse();
        let world = inv_view_proj * clip;
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let dir = ((world.truncate() / world.w) - self.position).normalize_or_zero();
        if dir.length_squared() <= f32::EPSILON {
            return None;
        }
        Some((self.position, dir))
    }

    pub fn project_point(&self, point: Vec3, viewport: Viewport) -> Option<Vec2> {
        if viewport.is_empty() {
            return None;
        }
        let clip = self.view_projection(viewport) * point.extend(1.0);
        if clip.w.abs() < f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * viewport.width;
        let y = (1.0 - ndc.y) * 0.5 * viewport.height;
        Some(Vec2::new(x, y))
    }
}

impl Default for Camera3D {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 8.0, 9.0), Vec3::ZERO, 60.0_f32.to_radians(), 0.1, 1000.0)
    }
}

/// Pause/resume capability of the externally owned camera controller. The selection engine pauses
/// it for the duration of a drag.
pub trait CameraControl {
    fn pause(&mut self);
    fn resume(&mut self);
}

pub type SharedCameraControl = Rc<RefCell<dyn CameraControl>>;

/// Holds the camera controller paused; resumes it when dropped.
pub struct CameraPause {
    control: SharedCameraControl,
}

impl CameraPause {
    pub fn acquire(control: &SharedCameraControl) -> Self {
        control.borrow_mut().pause();
        Self { control: Rc::clone(control) }
    }
}

impl Drop for CameraPause {
    fn drop(&mut self) {
        match self.control.try_borrow_mut() {
            Ok(mut control) => control.resume(),
            Err(_) => tracing::warn!("camera control busy while releasing drag pause"),
        }
    }
}

/// Orbit controller storing yaw/pitch around a target.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub radius: f32,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    enabled: bool,
}

impl OrbitControls {
    pub fn new(target: Vec3, radius: f32) -> Self {
        Self {
            target,
            radius: radius.max(0.01),
            yaw_radians: 0.0,
            pitch_radians: -0.6,
            enabled: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `false` while paused.
    pub fn orbit(&mut self, delta: Vec2) -> bool {
        if !self.enabled {
            return false;
        }
        self.yaw_radians += delta.x;
        self.pitch_radians = (self.pitch_radians + delta.y)
            .clamp(-std::f32::consts::FRAC_PI_2 + 0.01, std::f32::consts::FRAC_PI_2 - 0.01);
        true
    }
}

impl CameraControl for OrbitControls {
    fn pause(&mut self) {
        self.enabled = false;
    }

    fn resume(&mut self) {
        self.enabled = true;
    }
}
