use glam::{Mat4, Vec3};

const ELEVATION_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// A perspective camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    /// World to view space, right handed, looking down -Z.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// View to clip space with wgpu's `[0, 1]` depth range.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect.max(f32::EPSILON), self.near, self.far)
    }
}

/// A camera that circles a target point.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    /// Point the camera orbits around.
    pub target: Vec3,
    /// Distance from target.
    pub distance: f32,
    /// Horizontal angle in radians (yaw).
    pub azimuth: f32,
    /// Vertical angle in radians (pitch), clamped short of the poles.
    pub elevation: f32,
    /// Field of view in radians.
    pub fov: f32,
    /// Auto-rotation speed in radians per second.
    pub speed: f32,
    pub paused: bool,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 6.0,
            azimuth: 0.0,
            elevation: 0.35,
            fov: 60f32.to_radians(),
            speed: 0.3,
            paused: false,
        }
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl Into<Vec3>) -> Self {
        self.target = target.into();
        self
    }

    pub fn distance(mut self, distance: f32) -> Self {
        self.distance = distance.max(0.1);
        self
    }

    pub fn elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation.clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Advances the auto-rotation.
    pub fn update(&mut self, dt: f32) {
        if !self.paused {
            self.azimuth = (self.azimuth + self.speed * dt) % std::f32::consts::TAU;
        }
    }

    /// Nudges the orbit, e.g. from arrow keys.
    pub fn rotate(&mut self, d_azimuth: f32, d_elevation: f32) {
        self.azimuth += d_azimuth;
        self.elevation = (self.elevation + d_elevation).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
    }

    pub fn camera(&self) -> Camera {
        // Spherical to Cartesian conversion
        let offset = Vec3::new(
            self.distance * self.elevation.cos() * self.azimuth.sin(),
            self.distance * self.elevation.sin(),
            self.distance * self.elevation.cos() * self.azimuth.cos(),
        );

        Camera {
            position: self.target + offset,
            target: self.target,
            up: Vec3::Y,
            fov: self.fov,
            ..Camera::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn target_projects_to_screen_center() {
        let camera = Camera::new().at(Vec3::new(3.0, 2.0, 4.0));
        let clip_space = camera.projection_matrix(16.0 / 9.0) * camera.view_matrix();
        let clip = clip_space * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn nearer_points_get_smaller_depth() {
        let camera = Camera::new();
        let clip_space = camera.projection_matrix(1.0) * camera.view_matrix();
        let depth = |z: f32| {
            let clip = clip_space * Vec4::new(0.0, 0.0, z, 1.0);
            clip.z / clip.w
        };
        assert!(depth(1.0) < depth(-1.0));
    }

    #[test]
    fn orbit_keeps_distance_and_looks_at_target() {
        let mut orbit = OrbitCamera::new().target(Vec3::new(1.0, 0.0, 0.0)).distance(4.0);
        orbit.update(1.7);
        let camera = orbit.camera();
        assert!((camera.position.distance(orbit.target) - 4.0).abs() < 1e-4);
        assert_eq!(camera.target, orbit.target);
    }

    #[test]
    fn paused_orbit_does_not_move() {
        let mut orbit = OrbitCamera::new();
        orbit.paused = true;
        orbit.update(10.0);
        assert_eq!(orbit.azimuth, 0.0);
    }

    #[test]
    fn elevation_is_clamped() {
        let mut orbit = OrbitCamera::new();
        orbit.rotate(0.0, 10.0);
        assert!(orbit.elevation < std::f32::consts::FRAC_PI_2);
        assert!(orbit.camera().position.y < orbit.distance);
    }
}
