//! Preview Surface Capability
//!
//! The compositor owns the native windows. The session only needs to attach to
//! the caller's window, put a backdrop behind the viewfinder, and adjust the
//! viewfinder window once it posts its first frame. Geometry is computed here
//! so it can be tested without a compositor.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Z-order of the backdrop window placed behind the viewfinder.
pub const BACKDROP_Z_ORDER: i32 = 1;

/// Z-order of the viewfinder window once it is visible.
pub const VIEWFINDER_Z_ORDER: i32 = 100;

/// Backdrop fill colour (RGB).
pub const BACKDROP_COLOR: u32 = 0x0033_3333;

/// Caller-provided rendering destination (native window handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

impl FromStr for SurfaceHandle {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(SurfaceHandle)
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compositor window identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// Display properties seen from a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    /// Native display width in pixels
    pub width: u32,
    /// Native display height in pixels
    pub height: u32,
    /// Current display rotation in degrees
    pub rotation: u32,
}

impl DisplayInfo {
    /// Display size as seen by a window: native buffers ignore rotation, so
    /// width and height swap at 90 and 270 degrees.
    pub fn oriented_size(&self) -> (u32, u32) {
        match self.rotation % 360 {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// Window properties the session writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewGeometry {
    /// Window width in pixels
    pub width: u32,
    /// Window height in pixels
    pub height: u32,
    /// Window rotation in degrees
    pub rotation: u32,
    /// Stacking order
    pub z_order: i32,
    /// Visibility
    pub visible: bool,
}

impl PreviewGeometry {
    /// Full-screen viewfinder geometry, counter-rotating the camera's native
    /// viewfinder rotation.
    pub fn viewfinder(display: &DisplayInfo, viewfinder_rotation: u32) -> Self {
        let (width, height) = display.oriented_size();
        Self {
            width,
            height,
            rotation: (360 - viewfinder_rotation % 360) % 360,
            z_order: VIEWFINDER_Z_ORDER,
            visible: true,
        }
    }

    /// Backdrop geometry sitting just above the application window.
    pub fn backdrop(display: &DisplayInfo) -> Self {
        let (width, height) = display.oriented_size();
        Self {
            width,
            height,
            rotation: 0,
            z_order: BACKDROP_Z_ORDER,
            visible: true,
        }
    }
}

/// Compositor failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface error: {0}")]
pub struct SurfaceError(pub String);

/// Capability: native window management for the preview.
///
/// Only the session worker thread calls the window-mutating methods.
pub trait Compositor: Send + Sync {
    /// Resolve the caller's window and its context.
    fn attach(&self, target: SurfaceHandle) -> Result<(), SurfaceError>;

    /// Create a backdrop child window in `group`, filled with `color`.
    fn create_backdrop(&self, group: &str, color: u32) -> Result<WindowId, SurfaceError>;

    /// Display the window is on, if any.
    fn display_info(&self, window: WindowId) -> Option<DisplayInfo>;

    /// Write size, rotation, z-order and visibility.
    fn apply_geometry(&self, window: WindowId, geometry: &PreviewGeometry)
        -> Result<(), SurfaceError>;

    /// Destroy a window created by `create_backdrop`.
    fn destroy(&self, window: WindowId);
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT: DisplayInfo = DisplayInfo {
        width: 768,
        height: 1280,
        rotation: 0,
    };

    #[test]
    fn test_surface_handle_parsing() {
        assert_eq!("12345".parse::<SurfaceHandle>(), Ok(SurfaceHandle(12345)));
        assert_eq!(" 42 ".parse::<SurfaceHandle>(), Ok(SurfaceHandle(42)));
        assert!("".parse::<SurfaceHandle>().is_err());
        assert!("0x1f".parse::<SurfaceHandle>().is_err());
        assert!("-1".parse::<SurfaceHandle>().is_err());
    }

    #[test]
    fn test_viewfinder_counter_rotates() {
        let geometry = PreviewGeometry::viewfinder(&PORTRAIT, 90);
        assert_eq!(geometry.rotation, 270);
        assert_eq!(geometry.z_order, VIEWFINDER_Z_ORDER);
        assert!(geometry.visible);

        assert_eq!(PreviewGeometry::viewfinder(&PORTRAIT, 0).rotation, 0);
        assert_eq!(PreviewGeometry::viewfinder(&PORTRAIT, 270).rotation, 90);
    }

    #[test]
    fn test_size_swaps_for_rotated_display() {
        let landscape = DisplayInfo {
            rotation: 90,
            ..PORTRAIT
        };
        let geometry = PreviewGeometry::viewfinder(&landscape, 0);
        assert_eq!((geometry.width, geometry.height), (1280, 768));

        let upside_down = DisplayInfo {
            rotation: 180,
            ..PORTRAIT
        };
        let geometry = PreviewGeometry::backdrop(&upside_down);
        assert_eq!((geometry.width, geometry.height), (768, 1280));
        assert_eq!(geometry.z_order, BACKDROP_Z_ORDER);
    }
}
