//! Viewer state consumed by tile selection.

use std::sync::Arc;

use crate::config::LatLon;
use crate::geometry::{DMat4, DVec3, Frustum};
use crate::globe::Globe;
use crate::sector::{MercatorSector, MAX_MERCATOR_LATITUDE};

/// Per-frame viewing geometry
pub trait Viewer {
    /// Globe the tiles are draped over
    fn globe(&self) -> &dyn Globe;

    /// Eye position in Cartesian coordinates
    fn eye_point(&self) -> DVec3;

    /// View frustum in Cartesian coordinates
    fn frustum(&self) -> &Frustum;

    /// Geographic region that can be seen, if known
    fn visible_sector(&self) -> Option<MercatorSector>;

    /// Horizontal field of view in degrees
    fn field_of_view(&self) -> f64;

    /// Offscreen capture passes want every tile at full detail
    fn is_capture_mode(&self) -> bool {
        false
    }

    /// Scale applied to terrain elevations
    fn vertical_exaggeration(&self) -> f64 {
        1.0
    }

    /// Geographic position under the center of the viewport, if it hits the globe
    fn viewport_center(&self) -> Option<LatLon>;
}

/// Concrete [`Viewer`] built from a camera
#[derive(Clone)]
pub struct ViewState {
    globe: Arc<dyn Globe>,
    eye_point: DVec3,
    frustum: Frustum,
    visible_sector: Option<MercatorSector>,
    field_of_view: f64,
    capture_mode: bool,
    vertical_exaggeration: f64,
    viewport_center: Option<LatLon>,
}

impl ViewState {
    /// Camera at `altitude` meters above a position, looking straight down
    /// at the globe center with north up.
    pub fn looking_down(
        globe: Arc<dyn Globe>,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        field_of_view: f64,
        aspect_ratio: f64,
    ) -> Self {
        let radius = globe.radius();
        let altitude = altitude.max(1.0);
        let eye_point = globe.compute_point(latitude, longitude, altitude);

        let (lat, lon) = (latitude.to_radians(), longitude.to_radians());
        let north = DVec3::new(-lat.sin() * lon.sin(), lat.cos(), -lat.sin() * lon.cos());

        let horizon = (altitude * (2.0 * radius + altitude)).sqrt();
        let near = (altitude * 0.5).max(1.0);
        let far = horizon + radius;

        let aspect_ratio = aspect_ratio.max(f64::EPSILON);
        let vertical_fov = 2.0 * ((field_of_view.to_radians() * 0.5).tan() / aspect_ratio).atan();
        let projection = DMat4::perspective_rh_gl(vertical_fov, aspect_ratio, near, far);
        let view = DMat4::look_at_rh(eye_point, DVec3::ZERO, north);

        Self {
            eye_point,
            frustum: Frustum::from_matrix(projection * view),
            visible_sector: Some(horizon_sector(radius, latitude, longitude, altitude)),
            field_of_view,
            capture_mode: false,
            vertical_exaggeration: 1.0,
            viewport_center: Some(LatLon::new(latitude, longitude)),
            globe,
        }
    }

    /// Replace the frustum
    pub fn with_frustum(mut self, frustum: Frustum) -> Self {
        self.frustum = frustum;
        self
    }

    /// Replace the visible sector
    pub fn with_visible_sector(mut self, sector: Option<MercatorSector>) -> Self {
        self.visible_sector = sector;
        self
    }

    /// Enable or disable capture mode
    pub fn with_capture_mode(mut self, capture_mode: bool) -> Self {
        self.capture_mode = capture_mode;
        self
    }

    /// Set the vertical exaggeration
    pub fn with_vertical_exaggeration(mut self, exaggeration: f64) -> Self {
        self.vertical_exaggeration = exaggeration;
        self
    }

    /// Replace the viewport center
    pub fn with_viewport_center(mut self, center: Option<LatLon>) -> Self {
        self.viewport_center = center;
        self
    }
}

impl Viewer for ViewState {
    fn globe(&self) -> &dyn Globe {
        self.globe.as_ref()
    }

    fn eye_point(&self) -> DVec3 {
        self.eye_point
    }

    fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    fn visible_sector(&self) -> Option<MercatorSector> {
        self.visible_sector
    }

    fn field_of_view(&self) -> f64 {
        self.field_of_view
    }

    fn is_capture_mode(&self) -> bool {
        self.capture_mode
    }

    fn vertical_exaggeration(&self) -> f64 {
        self.vertical_exaggeration
    }

    fn viewport_center(&self) -> Option<LatLon> {
        self.viewport_center
    }
}

impl std::fmt::Debug for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewState")
            .field("eye_point", &self.eye_point)
            .field("visible_sector", &self.visible_sector)
            .field("field_of_view", &self.field_of_view)
            .field("capture_mode", &self.capture_mode)
            .field("vertical_exaggeration", &self.vertical_exaggeration)
            .field("viewport_center", &self.viewport_center)
            .finish_non_exhaustive()
    }
}

/// Sector bounding the cap of the globe above the horizon
fn horizon_sector(radius: f64, latitude: f64, longitude: f64, altitude: f64) -> MercatorSector {
    let angle = (radius / (radius + altitude)).clamp(-1.0, 1.0).acos().to_degrees();
    let min_lat = (latitude - angle).max(-90.0);
    let max_lat = (latitude + angle).min(90.0);

    // A cap reaching a pole, or one wider than the parallel it sits on, spans every longitude
    let spans_pole = min_lat <= -MAX_MERCATOR_LATITUDE || max_lat >= MAX_MERCATOR_LATITUDE;
    let ratio = angle.to_radians().sin() / latitude.to_radians().cos();
    let (min_lon, max_lon) = if spans_pole || ratio.is_nan() || ratio >= 1.0 {
        (-180.0, 180.0)
    } else {
        let half_width = ratio.asin().to_degrees();
        let (west, east) = (longitude - half_width, longitude + half_width);
        if west < -180.0 || east > 180.0 {
            (-180.0, 180.0)
        } else {
            (west, east)
        }
    };

    MercatorSector::from_degrees(min_lat, max_lat, min_lon, max_lon)
}
