//! Spherical astronomy needed by the coordinate conversions.
//!
//! The model only depends on the [`AstroConverter`] trait, so a host application can plug in a
//! converter with refraction, nutation or a better sidereal time. [`StandardConverter`] is a
//! plain, stateless implementation that is good to a few arcseconds.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::angle::{range_24, range_360, range_90};

/// Julian date of the J2000.0 epoch.
const J2000: f64 = 2_451_545.0;

/// Julian date of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

const MILLIS_PER_DAY: f64 = 86_400_000.;

/// Conversions between the equatorial and horizontal frames.
pub trait AstroConverter: Debug + Send + Sync {
    /// Convert right ascension (hours) and declination (degrees) to `[altitude, azimuth]` in
    /// degrees, for a local sidereal time in hours and a latitude in degrees.
    fn ra_dec_to_alt_az(&self, ra: f64, dec: f64, lst: f64, latitude: f64) -> [f64; 2];

    /// Inverse of [`ra_dec_to_alt_az`](AstroConverter::ra_dec_to_alt_az), returning
    /// `[ra_hours, dec_degrees]`.
    fn alt_az_to_ra_dec(&self, alt: f64, az: f64, latitude: f64, lst: f64) -> [f64; 2];

    /// Local mean sidereal time in hours.
    fn local_sidereal_time(&self, utc: DateTime<Utc>, longitude: f64) -> f64;
}

/// Textbook conversions without refraction or nutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StandardConverter;

impl StandardConverter {
    /// Hour angle (hours) and declination (degrees) to `[alt, az]`.
    pub fn ha_dec_to_alt_az(hour_angle: f64, dec: f64, latitude: f64) -> [f64; 2] {
        let (sin_h, cos_h) = (hour_angle * 15.).to_radians().sin_cos();
        let (sin_d, cos_d) = dec.to_radians().sin_cos();
        let (sin_l, cos_l) = latitude.to_radians().sin_cos();

        let x = sin_d * cos_l - cos_h * cos_d * sin_l;
        let y = -(sin_h * cos_d);
        let z = cos_h * cos_d * cos_l + sin_d * sin_l;

        let az = y.atan2(x).to_degrees();
        let alt = z.atan2(x.hypot(y)).to_degrees();
        [range_90(alt), range_360(az)]
    }
}

/// Julian date of a UTC instant.
pub fn julian_date(utc: DateTime<Utc>) -> f64 {
    utc.timestamp_millis() as f64 / MILLIS_PER_DAY + UNIX_EPOCH_JD
}

impl AstroConverter for StandardConverter {
    fn ra_dec_to_alt_az(&self, ra: f64, dec: f64, lst: f64, latitude: f64) -> [f64; 2] {
        Self::ha_dec_to_alt_az(lst - ra, dec, latitude)
    }

    fn alt_az_to_ra_dec(&self, alt: f64, az: f64, latitude: f64, lst: f64) -> [f64; 2] {
        let (sin_a, cos_a) = az.to_radians().sin_cos();
        let (sin_e, cos_e) = alt.to_radians().sin_cos();
        let (sin_l, cos_l) = latitude.to_radians().sin_cos();

        let dec = (cos_a * cos_l * cos_e + sin_l * sin_e)
            .clamp(-1., 1.)
            .asin()
            .to_degrees();

        let y = -sin_a * cos_e;
        let x = -cos_a * sin_l * cos_e + sin_e * cos_l;
        let hour_angle = y.atan2(x).to_degrees() / 15.;

        [range_24(lst - hour_angle), range_90(dec)]
    }

    fn local_sidereal_time(&self, utc: DateTime<Utc>, longitude: f64) -> f64 {
        let days = julian_date(utc) - J2000;
        let gmst = 18.697_374_558 + 24.065_709_824_419_08 * days;
        range_24(gmst + longitude / 15.)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use rand::Rng;

    use super::*;

    #[test]
    fn julian_date_of_j2000() {
        let utc = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_abs_diff_eq!(julian_date(utc), J2000, epsilon = 1e-9);
    }

    #[test]
    fn sidereal_time() {
        let converter = StandardConverter;

        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_abs_diff_eq!(
            converter.local_sidereal_time(j2000, 0.),
            18.697374558,
            epsilon = 1e-9
        );

        let utc = Utc
            .with_ymd_and_hms(2009, 6, 19, 4, 40, 5)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(230))
            .unwrap();
        assert_abs_diff_eq!(
            converter.local_sidereal_time(utc, 81.),
            3.9042962940932857,
            epsilon = 1e-3
        );
    }

    #[test]
    fn meridian_transit() {
        // On the meridian, a star at the latitude's declination is at the zenith.
        let [alt, _] = StandardConverter::ha_dec_to_alt_az(0., 52., 52.);
        assert_abs_diff_eq!(alt, 90., epsilon = 1e-9);

        // The celestial equator culminates due south at 90 - latitude.
        let [alt, az] = StandardConverter::ha_dec_to_alt_az(0., 0., 52.);
        assert_abs_diff_eq!(alt, 38., epsilon = 1e-9);
        assert_abs_diff_eq!(az, 180., epsilon = 1e-9);

        // The pole sits due north at the latitude's altitude.
        let [alt, az] = StandardConverter::ha_dec_to_alt_az(3., 90., 52.);
        assert_abs_diff_eq!(alt, 52., epsilon = 1e-9);
        assert_abs_diff_eq!(crate::angle::range_plus_minus_180(az), 0., epsilon = 1e-6);
    }

    #[test]
    fn alt_az_round_trip() {
        let mut rng = rand::rng();
        let converter = StandardConverter;

        for _ in 0..100 {
            let ra = rng.random_range(0.0..24.0);
            let dec = rng.random_range(-85.0..85.0);
            let lst = rng.random_range(0.0..24.0);
            let latitude = rng.random_range(-70.0..70.0);

            let [alt, az] = converter.ra_dec_to_alt_az(ra, dec, lst, latitude);
            let [ra2, dec2] = converter.alt_az_to_ra_dec(alt, az, latitude, lst);

            assert_abs_diff_eq!(crate::angle::range_12(ra2 - ra), 0., epsilon = 1e-8);
            assert_abs_diff_eq!(dec2, dec, epsilon = 1e-8);
        }
    }
}
