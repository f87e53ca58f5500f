//! Core of a browser-hosted 3D room layout editor: placing catalog furniture on a floor plane,
//! selecting and dragging it inside the room, editing its appearance, and persisting the layout.
//!
//! [`RoomEditor`] wires every component together; hosts feed it pointer and key events and UI
//! commands, and render from its [`scene::SceneIndex`] and [`state::ObservableState`].

pub mod appearance;
pub mod assets;
pub mod camera;
pub mod catalog;
pub mod config;
pub mod editor;
pub mod input;
pub mod layout;
pub mod mesh;
pub mod picking;
pub mod placement;
pub mod room;
pub mod scene;
pub mod selection;
pub mod state;
pub mod storage;

pub use editor::RoomEditor;

/// Wraps an angle into `(-π, π]`. Non-finite input is returned unchanged.
pub(crate) fn wrap_angle(radians: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if !radians.is_finite() {
        return radians;
    }
    let mut wrapped = if radians.abs() > 2.0 * TAU { radians.rem_euclid(TAU) } else { radians };
    while wrapped > PI {
        wrapped -= TAU;
    }
    while wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::wrap_angle;
    use std::f32::consts::PI;

    #[test]
    fn wrap_angle_stays_in_half_open_range() {
        assert_eq!(wrap_angle(PI), PI);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!(wrap_angle(0.25).eq(&0.25));
        assert!(wrap_angle(1.0e9).abs() <= PI);
    }
}
