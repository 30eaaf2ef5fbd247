//! Conversions between mount axes, the home-relative spherical frame and its Cartesian plane.
//!
//! The spherical frame replaces the axes by the Alt/Az they point at, re-centred on the home
//! position, so that corrections can be interpolated without the discontinuities of the pole and
//! the meridian flip. The Cartesian frame flattens it to the plane used by the triangle search.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::angle::{range_24, range_360};
use crate::astro::AstroConverter;
use crate::config::{Hemisphere, Site};
use crate::coordinates::{
    AxisPosition, CartesianCoordinate, PoleSide, SphericalCoordinate, TimeRecord,
};

/// Site, home position and converter needed for every conversion.
#[derive(Clone, Debug)]
pub struct Projection {
    site: Site,
    home: AxisPosition,
    converter: Arc<dyn AstroConverter>,
}

impl Projection {
    /// Create a new projection.
    pub fn new(site: Site, home: AxisPosition, converter: Arc<dyn AstroConverter>) -> Self {
        Self {
            site,
            home,
            converter,
        }
    }

    /// Observing site.
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Home axis position.
    pub fn home(&self) -> AxisPosition {
        self.home
    }

    /// Astronomy converter in use.
    pub fn converter(&self) -> &Arc<dyn AstroConverter> {
        &self.converter
    }

    pub(crate) fn set_site(&mut self, site: Site) {
        self.site = site;
    }

    pub(crate) fn set_home(&mut self, home: AxisPosition) {
        self.home = home;
    }

    pub(crate) fn set_converter(&mut self, converter: Arc<dyn AstroConverter>) {
        self.converter = converter;
    }

    /// Pair `utc` with the local sidereal time at the site.
    pub fn time_record(&self, utc: DateTime<Utc>) -> TimeRecord {
        TimeRecord::new(
            utc,
            self.converter.local_sidereal_time(utc, self.site.longitude),
        )
    }

    /// `[alt, az]` of a target given in RA hours and Dec degrees.
    pub fn ra_dec_to_alt_az(&self, ra_dec: [f64; 2], time: &TimeRecord) -> [f64; 2] {
        self.converter.ra_dec_to_alt_az(
            ra_dec[0],
            ra_dec[1],
            time.local_sidereal_time,
            self.site.latitude,
        )
    }

    /// `[ra_hours, dec]` the axes point at.
    pub fn axes_to_ra_dec(&self, axes: &AxisPosition, time: &TimeRecord) -> [f64; 2] {
        let (mut hour_angle, mut dec) = (axes.ra_axis, axes.dec_axis);
        if dec > 90. {
            hour_angle += 180.;
            dec = 180. - dec;
        }
        if self.site.hemisphere() == Hemisphere::Southern {
            dec = -dec;
        }
        let ra = range_24(time.local_sidereal_time - hour_angle / 15.);
        [ra, dec]
    }

    /// `[alt, az]` the axes point at.
    pub fn axes_to_alt_az(&self, axes: &AxisPosition, time: &TimeRecord) -> [f64; 2] {
        self.ra_dec_to_alt_az(self.axes_to_ra_dec(axes, time), time)
    }

    /// Axes pointing at `alt_az` on the requested side of the pole.
    pub fn alt_az_to_axes(
        &self,
        alt_az: [f64; 2],
        side: PoleSide,
        time: &TimeRecord,
    ) -> AxisPosition {
        let lst = time.local_sidereal_time;
        let [alt, az] = alt_az;
        let [ra, mut dec] = self.converter.alt_az_to_ra_dec(alt, az, self.site.latitude, lst);
        if self.site.hemisphere() == Hemisphere::Southern {
            dec = -dec;
        }

        let mut hour_angle = range_360((lst - ra) * 15.);
        if hour_angle > 180. {
            hour_angle = range_360(hour_angle + 180.);
            dec = range_360(180. - dec);
        }

        let axes = AxisPosition::new(hour_angle, dec);
        if axes.pole_side(&self.home) == side {
            axes
        } else {
            axes.flip()
        }
    }

    /// Map axes into the home-centred spherical frame.
    pub fn axes_to_spherical(&self, axes: &AxisPosition, time: &TimeRecord) -> SphericalCoordinate {
        let [alt, az] = self.axes_to_alt_az(axes, time);
        SphericalCoordinate::new(
            az - 180. + self.home.ra_axis,
            (alt + 90.) * 2. + self.home.dec_axis,
            axes.pole_side(&self.home),
        )
    }

    /// Inverse of [`axes_to_spherical`](Projection::axes_to_spherical).
    pub fn spherical_to_axes(
        &self,
        spherical: &SphericalCoordinate,
        time: &TimeRecord,
    ) -> AxisPosition {
        let az = spherical.x - self.home.ra_axis + 180.;
        let alt = (spherical.y - self.home.dec_axis) / 2. - 90.;
        self.alt_az_to_axes([alt, range_360(az)], spherical.side, time)
    }

    /// Flatten a spherical coordinate to the plane around home.
    pub fn polar_to_cartesian(&self, spherical: &SphericalCoordinate) -> CartesianCoordinate {
        let theta = range_360(spherical.x - self.home.ra_axis).to_radians();
        let mut radius = spherical.y - self.home.dec_axis;
        let zero_radius = radius == 0.;
        if zero_radius {
            radius = 1.;
        }

        CartesianCoordinate {
            x: theta.cos() * radius,
            y: theta.sin() * radius,
            side: spherical.side,
            zero_radius,
        }
    }

    /// Inverse of [`polar_to_cartesian`](Projection::polar_to_cartesian).
    pub fn cartesian_to_polar(&self, cartesian: &CartesianCoordinate) -> SphericalCoordinate {
        let radius = if cartesian.zero_radius {
            0.
        } else {
            cartesian.x.hypot(cartesian.y)
        };
        let theta = range_360(cartesian.y.atan2(cartesian.x).to_degrees());
        let theta = if theta > 180. { theta - 360. } else { theta };

        SphericalCoordinate::new(
            self.home.ra_axis + theta,
            radius + self.home.dec_axis,
            cartesian.side,
        )
    }

    /// Axes straight to the Cartesian plane.
    pub fn axes_to_cartesian(&self, axes: &AxisPosition, time: &TimeRecord) -> CartesianCoordinate {
        self.polar_to_cartesian(&self.axes_to_spherical(axes, time))
    }

    /// Cartesian plane straight back to axes.
    pub fn cartesian_to_axes(
        &self,
        cartesian: &CartesianCoordinate,
        time: &TimeRecord,
    ) -> AxisPosition {
        self.spherical_to_axes(&self.cartesian_to_polar(cartesian), time)
    }
}
