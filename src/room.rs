use crate::config::RoomConfig;
use glam::{Vec2, Vec3};

/// Read-only interior rectangle of the room, centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomBounds {
    pub half_width: f32,
    pub half_depth: f32,
    pub wall_margin: f32,
    pub placement_margin: f32,
    pub floor_y: f32,
}

impl RoomBounds {
    pub fn from_config(config: &RoomConfig) -> Self {
        Self {
            half_width: config.width.abs() * 0.5,
            half_depth: config.depth.abs() * 0.5,
            wall_margin: config.wall_margin.max(0.0),
            placement_margin: config.placement_margin.max(0.0),
            floor_y: config.floor_y,
        }
    }

    /// Coarse placement check against the margin-inset rectangle; ignores the object's footprint.
    pub fn accepts_placement(&self, point: Vec3) -> bool {
        let limit_x = self.half_width - self.placement_margin;
        let limit_z = self.half_depth - self.placement_margin;
        point.is_finite() && point.x.abs() <= limit_x && point.z.abs() <= limit_z
    }

    /// Clamps a candidate `(x, z)` so an object with the given footprint half extents stays inside
    /// the walls. Collapses to the room center on an axis the object cannot fit along.
    pub fn clamp(&self, candidate: Vec2, half_extents: Vec2) -> Vec2 {
        Vec2::new(
            clamp_axis(candidate.x, self.half_width - self.wall_margin - half_extents.x.abs()),
            clamp_axis(candidate.y, self.half_depth - self.wall_margin - half_extents.y.abs()),
        )
    }

    /// Whether `(x, z)` satisfies the footprint clamp, within `epsilon`.
    pub fn contains_footprint(&self, position: Vec2, half_extents: Vec2, epsilon: f32) -> bool {
        let limit_x = (self.half_width - self.wall_margin - half_extents.x.abs()).max(0.0);
        let limit_z = (self.half_depth - self.wall_margin - half_extents.y.abs()).max(0.0);
        position.x.abs() <= limit_x + epsilon && position.y.abs() <= limit_z + epsilon
    }
}

fn clamp_axis(value: f32, limit: f32) -> f32 {
    if !limit.is_finite() || limit <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    value.clamp(-limit, limit)
}
