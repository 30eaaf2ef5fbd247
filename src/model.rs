//! The alignment model: calibration points, settings and the correction entry points.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;

use crate::angle::range_plus_minus_180;
use crate::astro::{AstroConverter, StandardConverter};
use crate::config::{
    AlignmentAlgorithm, AlignmentSettings, PointFilterMode, Site, ThreePointMode, TriangleDistance,
};
use crate::coordinates::{
    AxisPosition, CartesianCoordinate, PierSide, SphericalCoordinate, TimeRecord,
};
use crate::error::{AlignmentError, PersistenceError, Result};
use crate::nearest::{SpatialIndex, Space};
use crate::notification::{LogSink, Notification, NotificationKind, NotificationSink};
use crate::persistence::{self, AccessTimestamp};
use crate::point::{AlignmentPoint, AlignmentPointCollection};
use crate::projection::Projection;
use crate::regression::LocalRegression;
use crate::triangles::{TriangleMapping, TriangleSearch, TriangulatedAffine};

/// Which way a correction goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Raw mount axes to the axes that actually point at the sky position.
    MountToSky,
    /// Sky axes to the mount axes to command.
    SkyToMount,
}

impl Direction {
    /// Space the query position is given in.
    pub fn source(self) -> Space {
        match self {
            Direction::MountToSky => Space::Mount,
            Direction::SkyToMount => Space::Sky,
        }
    }

    /// Space the corrected position is in.
    pub fn destination(self) -> Space {
        match self {
            Direction::MountToSky => Space::Sky,
            Direction::SkyToMount => Space::Mount,
        }
    }

    /// Turn a `sky - mount` offset into an offset in this direction.
    pub fn orient(self, mount_to_sky: AxisPosition) -> AxisPosition {
        match self {
            Direction::MountToSky => mount_to_sky,
            Direction::SkyToMount => {
                AxisPosition::new(-mount_to_sky.ra_axis, -mount_to_sky.dec_axis)
            }
        }
    }

    /// Offset of a single point in this direction.
    pub fn delta(self, point: &AlignmentPoint) -> AxisPosition {
        self.orient(point.mount_to_sky_delta())
    }

    pub(crate) fn method(self) -> &'static str {
        match self {
            Direction::MountToSky => "GetObservedAxes",
            Direction::SkyToMount => "GetMountAxes",
        }
    }

    pub(crate) fn map_method(self) -> &'static str {
        match self {
            Direction::MountToSky => "DeltaMatrixMap",
            Direction::SkyToMount => "DeltaMatrixReverseMap",
        }
    }
}

/// A correction algorithm.
pub(crate) trait Corrector {
    /// Corrected position for `target`. Called only with alignment on, at least one point and the
    /// target away from home.
    fn correct(
        &self,
        state: &mut ModelState,
        target: AxisPosition,
        pier_side: PierSide,
        direction: Direction,
        time: &TimeRecord,
    ) -> AxisPosition;
}

/// Derived per-space data of all points.
pub(crate) struct SpaceCache {
    xy: Vec<CartesianCoordinate>,
    axes: Vec<AxisPosition>,
    index: SpatialIndex,
}

impl SpaceCache {
    fn build(points: &AlignmentPointCollection, projection: &Projection, space: Space) -> Self {
        let axes = points.iter().map(|p| space.axes(p)).collect::<Vec<_>>();
        let xy = points
            .iter()
            .zip(&axes)
            .map(|(p, a)| projection.axes_to_cartesian(a, &p.sync_time))
            .collect();

        Self {
            xy,
            axes,
            index: SpatialIndex::build(points, space),
        }
    }
}

/// Everything rebuilt after the points, site or home position change.
pub(crate) struct DerivedCache {
    mount: SpaceCache,
    sky: SpaceCache,
}

impl DerivedCache {
    fn build(points: &AlignmentPointCollection, projection: &Projection) -> Self {
        Self {
            mount: SpaceCache::build(points, projection, Space::Mount),
            sky: SpaceCache::build(points, projection, Space::Sky),
        }
    }

    fn space(&self, space: Space) -> &SpaceCache {
        match space {
            Space::Mount => &self.mount,
            Space::Sky => &self.sky,
        }
    }

    pub(crate) fn xy(&self, space: Space) -> &[CartesianCoordinate] {
        &self.space(space).xy
    }

    pub(crate) fn axes(&self, space: Space) -> &[AxisPosition] {
        &self.space(space).axes
    }

    pub(crate) fn index(&self, space: Space) -> &SpatialIndex {
        &self.space(space).index
    }
}

struct Storage {
    points_path: PathBuf,
    timestamp: AccessTimestamp,
}

/// State guarded by the model's lock.
pub(crate) struct ModelState {
    pub(crate) points: AlignmentPointCollection,
    pub(crate) settings: AlignmentSettings,
    pub(crate) projection: Projection,
    pub(crate) one_star_adjustment: AxisPosition,
    pub(crate) cache: DerivedCache,
    sink: Arc<dyn NotificationSink>,
    storage: Option<Storage>,
}

impl ModelState {
    pub(crate) fn notify(&self, kind: NotificationKind, method: &str, message: impl Into<String>) {
        self.sink.notify(Notification::new(kind, method, message));
    }

    pub(crate) fn triangle_search(&self, space: Space) -> TriangleSearch<'_> {
        TriangleSearch::new(self.cache.xy(space), self.cache.axes(space))
            .with_filter(self.settings.point_filter_mode)
            .with_mode(self.settings.three_point_mode)
            .with_distance(self.settings.triangle_distance)
            .with_max_combinations(self.settings.maximum_combination_count)
    }

    fn rebuild(&mut self) {
        self.cache = DerivedCache::build(&self.points, &self.projection);
        debug!("Rebuilt alignment cache for {} points.", self.points.len());
    }

    fn reset_one_star_adjustment(&mut self) {
        self.one_star_adjustment = self
            .points
            .last()
            .map(AlignmentPoint::mount_to_sky_delta)
            .unwrap_or_default();
    }

    fn report(&self) {
        self.notify(NotificationKind::Data, "AlignmentPoints", self.points.report());
    }

    /// Write the points to the configured file, if any.
    fn persist(&self) -> std::result::Result<(), PersistenceError> {
        if let Some(storage) = &self.storage {
            persistence::save_points(&storage.points_path, &self.points)?;
            self.report();
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        let Some(storage) = &mut self.storage else {
            return;
        };
        if let Err(e) = storage.timestamp.touch(now) {
            self.notify(NotificationKind::Warning, "Timestamp", e.to_string());
        }
    }

    fn set_points(&mut self, points: AlignmentPointCollection) {
        self.points = points;
        self.reset_one_star_adjustment();
        self.rebuild();
    }
}

/// Pointing model built from calibration points.
///
/// All state sits behind one lock, so the model can be shared between the threads reading
/// positions and the one adding syncs.
pub struct AlignmentModel {
    state: Mutex<ModelState>,
}

impl AlignmentModel {
    /// Create an empty model using [`StandardConverter`] and notifications through `log`.
    pub fn new(site: Site, settings: AlignmentSettings) -> Self {
        let projection = Projection::new(site, settings.home_position, Arc::new(StandardConverter));
        let points = AlignmentPointCollection::new();
        let cache = DerivedCache::build(&points, &projection);

        Self {
            state: Mutex::new(ModelState {
                points,
                settings,
                projection,
                one_star_adjustment: AxisPosition::default(),
                cache,
                sink: Arc::new(LogSink),
                storage: None,
            }),
        }
    }

    /// Use a different astronomy converter.
    pub fn with_converter(mut self, converter: Arc<dyn AstroConverter>) -> Self {
        let state = self.state.get_mut();
        state.projection.set_converter(converter);
        state.rebuild();
        self
    }

    /// Send notifications to `sink` instead of the log.
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.state.get_mut().sink = sink;
        self
    }

    /// Keep the points in `path`, loading what is already there.
    ///
    /// If `clear_points_on_startup` is set and the points were last used more than an hour ago,
    /// they are discarded instead.
    pub fn with_points_file(self, path: impl AsRef<Path>) -> Result<Self> {
        self.open_points_file(path.as_ref(), Utc::now())
    }

    pub(crate) fn open_points_file(mut self, path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let state = self.state.get_mut();
        let timestamp = AccessTimestamp::beside(path);
        let clear = state.settings.clear_points_on_startup;
        let stale = persistence::is_stale(clear, timestamp.read(), now);

        let points = if stale {
            info!("Alignment points in {} are stale, starting empty.", path.display());
            AlignmentPointCollection::new()
        } else {
            persistence::load_points_or_default(path)?
        };

        state.storage = Some(Storage {
            points_path: path.to_path_buf(),
            timestamp,
        });
        state.set_points(points);
        if stale {
            state.persist()?;
        } else {
            state.report();
        }
        Ok(self)
    }

    /// Record a sync and return the new point's id.
    ///
    /// Points whose sky axes are within the proximity limit of the new one on both axes are
    /// replaced, once more than two points exist. If saving fails the point is still added.
    pub fn add_alignment_point(
        &self,
        target_ra_dec: [f64; 2],
        mount_axes: AxisPosition,
        sky_axes: AxisPosition,
        pier_side: PierSide,
        utc: DateTime<Utc>,
    ) -> Result<u32> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let dec = target_ra_dec[1];
        let limit = state.settings.declination_limit;
        if dec.abs() > limit {
            state.notify(
                NotificationKind::Warning,
                "AddAlignmentPoint",
                format!("Target declination {dec:.4} is too close to the pole."),
            );
            return Err(AlignmentError::OutOfRange { dec, limit });
        }

        let proximity = state.settings.proximity_limit;
        if state.points.len() > 2 && proximity > 0. {
            let removed = state.points.remove_where(|p| {
                range_plus_minus_180(p.sky_axes.ra_axis - sky_axes.ra_axis).abs() <= proximity
                    && (p.sky_axes.dec_axis - sky_axes.dec_axis).abs() <= proximity
            });
            for id in removed {
                state.notify(
                    NotificationKind::Information,
                    "AddAlignmentPoint",
                    format!("Point {id:03} superseded by the new sync."),
                );
            }
        }

        let sync_time = state.projection.time_record(utc);
        let id = state.points.next_id();
        let point = AlignmentPoint {
            id,
            target_ra_dec,
            alt_az: state.projection.ra_dec_to_alt_az(target_ra_dec, &sync_time),
            mount_axes,
            sky_axes,
            pier_side,
            sync_time,
            selected: false,
        };
        state.notify(
            NotificationKind::Information,
            "AddAlignmentPoint",
            format!("Point {id:03}: mount {mount_axes}, sky {sky_axes}, {pier_side}"),
        );

        state.one_star_adjustment = point.mount_to_sky_delta();
        state.points.push(point);
        state.rebuild();
        state.persist()?;
        Ok(id)
    }

    /// Remove the point with `id`. `Ok(false)` if there is none.
    pub fn remove_alignment_point(&self, id: u32) -> Result<bool> {
        let mut state = self.state.lock();
        if state.points.remove_by_id(id).is_none() {
            return Ok(false);
        }
        state.notify(
            NotificationKind::Information,
            "RemoveAlignmentPoint",
            format!("Point {id:03} removed."),
        );
        state.reset_one_star_adjustment();
        state.rebuild();
        state.persist()?;
        Ok(true)
    }

    /// Remove every point.
    pub fn clear_alignment_points(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.set_points(AlignmentPointCollection::new());
        state.notify(NotificationKind::Information, "ClearAlignmentPoints", "All points removed.");
        state.persist()?;
        Ok(())
    }

    /// Snapshot of the points.
    pub fn alignment_points(&self) -> AlignmentPointCollection {
        self.state.lock().points.clone()
    }

    /// Number of points.
    pub fn point_count(&self) -> usize {
        self.state.lock().points.len()
    }

    /// Offset applied when only one point exists: `sky - mount` of the latest sync.
    pub fn one_star_adjustment(&self) -> AxisPosition {
        self.state.lock().one_star_adjustment
    }

    /// Export the points to `path`.
    pub fn save_alignment_points_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state.lock();
        persistence::save_points(path.as_ref(), &state.points)?;
        state.report();
        Ok(())
    }

    /// Replace the points with those in `path`. They are saved to the model's own file, if any.
    pub fn load_alignment_points_from(&self, path: impl AsRef<Path>) -> Result<usize> {
        let points = persistence::load_points(path.as_ref())?;
        let mut state = self.state.lock();
        state.set_points(points);
        if state.storage.is_some() {
            state.persist()?;
        } else {
            state.report();
        }
        Ok(state.points.len())
    }

    /// Emit the point table as a data notification.
    pub fn report_alignment_points(&self) {
        self.state.lock().report();
    }

    /// Sky axes for the raw `mount_axes`.
    pub fn get_observed_axes(&self, mount_axes: AxisPosition, pier_side: PierSide) -> AxisPosition {
        self.correct(mount_axes, pier_side, Direction::MountToSky, Utc::now())
    }

    /// Mount axes to command for the wanted `observed_axes`.
    pub fn get_mount_axes(&self, observed_axes: AxisPosition, pier_side: PierSide) -> AxisPosition {
        self.correct(observed_axes, pier_side, Direction::SkyToMount, Utc::now())
    }

    fn correct(
        &self,
        target: AxisPosition,
        pier_side: PierSide,
        direction: Direction,
        utc: DateTime<Utc>,
    ) -> AxisPosition {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let settings = &state.settings;
        if !settings.is_alignment_on
            || state.points.is_empty()
            || target.included_angle_to(&settings.home_position) < settings.proximity_limit
        {
            return target;
        }

        let time = state.projection.time_record(utc);
        state.notify(
            NotificationKind::Information,
            direction.method(),
            format!("{} for {target} ({pier_side})", direction.method()),
        );

        let corrector: &dyn Corrector = match state.settings.alignment_algorithm {
            AlignmentAlgorithm::LocalRegression => &LocalRegression,
            AlignmentAlgorithm::TriangulatedAffine => &TriangulatedAffine,
        };
        let corrected = corrector.correct(state, target, pier_side, direction, &time);
        state.touch(utc);
        corrected
    }

    fn map(
        &self,
        target: AxisPosition,
        direction: Direction,
        time: &TimeRecord,
    ) -> Option<TriangleMapping> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.points.clear_selection();
        match TriangulatedAffine::delta_matrix(state, target, direction, time) {
            Ok(mapping) => mapping,
            Err(e) => {
                state.notify(NotificationKind::Warning, direction.map_method(), e.to_string());
                None
            }
        }
    }

    /// Map mount axes to sky axes through the surrounding triangle of points.
    pub fn delta_matrix_map(
        &self,
        target: AxisPosition,
        time: &TimeRecord,
    ) -> Option<TriangleMapping> {
        self.map(target, Direction::MountToSky, time)
    }

    /// Map sky axes to mount axes through the surrounding triangle of points.
    pub fn delta_matrix_reverse_map(
        &self,
        target: AxisPosition,
        time: &TimeRecord,
    ) -> Option<TriangleMapping> {
        self.map(target, Direction::SkyToMount, time)
    }

    /// Pair `utc` with the site's local sidereal time.
    pub fn time_record(&self, utc: DateTime<Utc>) -> TimeRecord {
        self.state.lock().projection.time_record(utc)
    }

    /// See [`Projection::axes_to_spherical`].
    pub fn axes_to_spherical(&self, axes: &AxisPosition, time: &TimeRecord) -> SphericalCoordinate {
        self.state.lock().projection.axes_to_spherical(axes, time)
    }

    /// See [`Projection::spherical_to_axes`].
    pub fn spherical_to_axes(
        &self,
        spherical: &SphericalCoordinate,
        time: &TimeRecord,
    ) -> AxisPosition {
        self.state.lock().projection.spherical_to_axes(spherical, time)
    }

    /// See [`Projection::axes_to_cartesian`].
    pub fn axes_to_cartesian(&self, axes: &AxisPosition, time: &TimeRecord) -> CartesianCoordinate {
        self.state.lock().projection.axes_to_cartesian(axes, time)
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> AlignmentSettings {
        self.state.lock().settings.clone()
    }

    /// Replace all settings at once.
    pub fn set_settings(&self, settings: AlignmentSettings) {
        let mut state = self.state.lock();
        let home = settings.home_position;
        state.settings = settings;
        if home != state.projection.home() {
            state.projection.set_home(home);
            state.rebuild();
        }
    }

    /// Observing site.
    pub fn site(&self) -> Site {
        *self.state.lock().projection.site()
    }

    /// Move the site. Cached projections are recomputed.
    pub fn set_site(&self, site: Site) {
        let mut state = self.state.lock();
        state.projection.set_site(site);
        state.rebuild();
    }

    /// Home axis position.
    pub fn home_position(&self) -> AxisPosition {
        self.state.lock().settings.home_position
    }

    /// Change the home position. Cached projections are recomputed.
    pub fn set_home_position(&self, home: AxisPosition) {
        let mut state = self.state.lock();
        state.settings.home_position = home;
        state.projection.set_home(home);
        state.rebuild();
    }

    /// Whether corrections are applied.
    pub fn is_alignment_on(&self) -> bool {
        self.state.lock().settings.is_alignment_on
    }

    /// Enable or disable corrections.
    pub fn set_alignment_on(&self, on: bool) {
        self.state.lock().settings.is_alignment_on = on;
    }

    /// Correction algorithm in use.
    pub fn alignment_algorithm(&self) -> AlignmentAlgorithm {
        self.state.lock().settings.alignment_algorithm
    }

    /// Select the correction algorithm.
    pub fn set_alignment_algorithm(&self, algorithm: AlignmentAlgorithm) {
        self.state.lock().settings.alignment_algorithm = algorithm;
    }

    /// Point filter of the triangle search.
    pub fn point_filter_mode(&self) -> PointFilterMode {
        self.state.lock().settings.point_filter_mode
    }

    /// Set the point filter of the triangle search.
    pub fn set_point_filter_mode(&self, mode: PointFilterMode) {
        self.state.lock().settings.point_filter_mode = mode;
    }

    /// Triangle choice heuristic.
    pub fn three_point_mode(&self) -> ThreePointMode {
        self.state.lock().settings.three_point_mode
    }

    /// Set the triangle choice heuristic.
    pub fn set_three_point_mode(&self, mode: ThreePointMode) {
        self.state.lock().settings.three_point_mode = mode;
    }

    /// Distance used to rank triangle candidates.
    pub fn triangle_distance(&self) -> TriangleDistance {
        self.state.lock().settings.triangle_distance
    }

    /// Set the distance used to rank triangle candidates.
    pub fn set_triangle_distance(&self, distance: TriangleDistance) {
        self.state.lock().settings.triangle_distance = distance;
    }

    /// Proximity limit in degrees.
    pub fn proximity_limit(&self) -> f64 {
        self.state.lock().settings.proximity_limit
    }

    /// Set the proximity limit in degrees.
    pub fn set_proximity_limit(&self, limit: f64) {
        self.state.lock().settings.proximity_limit = limit;
    }

    /// Search radius of the regression in degrees.
    pub fn nearby_limit(&self) -> f64 {
        self.state.lock().settings.nearby_limit
    }

    /// Set the search radius of the regression in degrees.
    pub fn set_nearby_limit(&self, limit: f64) {
        self.state.lock().settings.nearby_limit = limit;
    }

    /// Maximum points per regression.
    pub fn sample_size(&self) -> usize {
        self.state.lock().settings.sample_size
    }

    /// Set the maximum points per regression.
    pub fn set_sample_size(&self, size: usize) {
        self.state.lock().settings.sample_size = size;
    }

    /// Nearest points considered by the triangle search.
    pub fn maximum_combination_count(&self) -> usize {
        self.state.lock().settings.maximum_combination_count
    }

    /// Set the nearest points considered by the triangle search.
    pub fn set_maximum_combination_count(&self, count: usize) {
        self.state.lock().settings.maximum_combination_count = count;
    }

    /// Whether the triangle path falls back to the nearest point.
    pub fn nearest_fallback(&self) -> bool {
        self.state.lock().settings.nearest_fallback
    }

    /// Let the triangle path fall back to the nearest point.
    pub fn set_nearest_fallback(&self, fallback: bool) {
        self.state.lock().settings.nearest_fallback = fallback;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::notification::tests::CollectingSink;

    fn utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 11, 21, 21, 30, 0).unwrap()
    }

    fn model(settings: AlignmentSettings) -> (AlignmentModel, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let model = AlignmentModel::new(Site::new(52., -1.5, 100.), settings)
            .with_notification_sink(sink.clone());
        (model, sink)
    }

    fn add(model: &AlignmentModel, mount: [f64; 2], sky: [f64; 2]) -> u32 {
        model
            .add_alignment_point([10., 20.], mount.into(), sky.into(), PierSide::East, utc())
            .unwrap()
    }

    fn scenario(settings: AlignmentSettings) -> (AlignmentModel, Arc<CollectingSink>) {
        let (model, sink) = model(settings);
        add(&model, [10., 20.], [10.5, 20.3]);
        add(&model, [50., 60.], [49.6, 60.4]);
        add(&model, [100., 40.], [100.7, 39.5]);
        (model, sink)
    }

    fn on() -> AlignmentSettings {
        AlignmentSettings::default().with_alignment_on(true)
    }

    #[test]
    fn identity_when_off_or_empty() {
        let target = AxisPosition::new(30., 40.);

        let (model, _) = model(on());
        assert_eq!(model.get_observed_axes(target, PierSide::East), target);
        assert_eq!(model.get_mount_axes(target, PierSide::East), target);

        let (model, _) = scenario(AlignmentSettings::default());
        assert!(!model.is_alignment_on());
        assert_eq!(model.get_observed_axes(target, PierSide::East), target);

        // Home is never corrected.
        let (model, _) = scenario(on());
        let home = model.home_position();
        assert_eq!(model.get_observed_axes(home, PierSide::East), home);
    }

    #[test]
    fn single_point_is_exact() {
        let (model, _) = model(on());
        add(&model, [10., 20.], [10.5, 20.3]);
        assert!(model.one_star_adjustment().approx_eq(&AxisPosition::new(0.5, 0.3), 1e-9));

        let observed = model.get_observed_axes(AxisPosition::new(120., 70.), PierSide::West);
        assert_abs_diff_eq!(observed.ra_axis, 120.5, epsilon = 1e-9);
        assert_abs_diff_eq!(observed.dec_axis, 70.3, epsilon = 1e-9);

        let mount = model.get_mount_axes(observed, PierSide::West);
        assert!(mount.approx_eq(&AxisPosition::new(120., 70.), 1e-9));
    }

    #[test]
    fn three_point_regression() {
        let (model, sink) = scenario(on().with_nearby_limit(90.));
        let observed = model.get_observed_axes(AxisPosition::new(30., 40.), PierSide::East);
        assert_abs_diff_eq!(observed.ra_axis, 30.156528, epsilon = 1e-4);
        assert_abs_diff_eq!(observed.dec_axis, 40.346806, epsilon = 1e-4);

        // Within the range of the three offsets.
        assert!((-0.4..=0.7).contains(&(observed.ra_axis - 30.)));
        assert!((-0.5..=0.4).contains(&(observed.dec_axis - 40.)));

        assert!(model.alignment_points().iter().all(|p| p.selected));
        let data = sink.of_kind(NotificationKind::Data);
        assert!(data.iter().any(|n| n.message.contains("Theta")));
        assert!(
            sink.of_kind(NotificationKind::Information)
                .iter()
                .any(|n| n.method == "GetObservedAxes")
        );
    }

    #[test]
    fn nearby_limit_uses_nearest_point() {
        // Only the first two points are within 45°.
        let (model, _) = scenario(on());
        let observed = model.get_observed_axes(AxisPosition::new(30., 40.), PierSide::East);
        assert_abs_diff_eq!(observed.ra_axis, 29.6, epsilon = 1e-9);
        assert_abs_diff_eq!(observed.dec_axis, 40.4, epsilon = 1e-9);
        let selected = model
            .alignment_points()
            .iter()
            .filter(|p| p.selected)
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(selected, vec![2]);

        // Nothing on the other pier side.
        let target = AxisPosition::new(30., 40.);
        assert_eq!(model.get_observed_axes(target, PierSide::West), target);
    }

    #[test]
    fn round_trip() {
        let (model, _) = scenario(on().with_nearby_limit(90.));
        for target in [[30., 40.], [60., 45.], [80., 30.]] {
            let target = AxisPosition::from(target);
            let observed = model.get_observed_axes(target, PierSide::East);
            let back = model.get_mount_axes(observed, PierSide::East);
            assert!(back.approx_eq(&target, 0.05), "{target} -> {observed} -> {back}");
        }
    }

    #[test]
    fn ill_conditioned_fit_falls_back() {
        let (model, sink) = model(on().with_nearby_limit(90.));
        add(&model, [40., 20.], [40.5, 20.3]);
        add(&model, [40., 30.], [40.6, 30.3]);
        add(&model, [40., 40.], [40.7, 40.3]);

        let observed = model.get_observed_axes(AxisPosition::new(40., 32.), PierSide::East);
        assert_abs_diff_eq!(observed.ra_axis, 40.6, epsilon = 1e-9);
        assert_abs_diff_eq!(observed.dec_axis, 32.3, epsilon = 1e-9);
        assert_eq!(sink.of_kind(NotificationKind::Warning).len(), 1);
    }

    #[test]
    fn ids_and_removal() {
        let (model, _) = scenario(on());
        assert_eq!(
            model.alignment_points().iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        assert!(model.remove_alignment_point(3).unwrap());
        assert!(!model.remove_alignment_point(3).unwrap());
        assert!(model.one_star_adjustment().approx_eq(&AxisPosition::new(-0.4, 0.4), 1e-9));
        assert_eq!(add(&model, [120., 30.], [120.1, 30.1]), 3);

        model.clear_alignment_points().unwrap();
        assert_eq!(model.point_count(), 0);
        assert_eq!(model.one_star_adjustment(), AxisPosition::default());
        assert_eq!(add(&model, [120., 30.], [120.1, 30.1]), 1);
    }

    #[test]
    fn proximity_deduplication() {
        let (model, _) = scenario(on());
        assert_eq!(add(&model, [50.1, 60.1], [49.8, 60.2]), 4);
        assert_eq!(model.point_count(), 3);
        assert!(model.alignment_points().get_by_id(2).is_none());

        // A distant point is simply added.
        add(&model, [150., 20.], [150.2, 20.1]);
        assert_eq!(model.point_count(), 4);
    }

    #[test]
    fn deduplication_limit_is_inclusive() {
        let (model, _) = model(on());
        add(&model, [10., 20.], [10.5, 20.5]);
        add(&model, [50., 60.], [49.5, 60.5]);
        add(&model, [100., 40.], [100.5, 40.5]);

        // Exactly the proximity limit away on both axes.
        add(&model, [50., 60.], [50., 61.]);
        assert_eq!(model.point_count(), 3);
        assert!(model.alignment_points().get_by_id(2).is_none());

        add(&model, [100., 40.], [101.25, 40.5]);
        assert_eq!(model.point_count(), 4);
    }

    #[test]
    fn no_deduplication_with_few_points() {
        let (model, _) = model(on());
        add(&model, [10., 20.], [10.5, 20.3]);
        add(&model, [10.1, 20.1], [10.6, 20.4]);
        assert_eq!(model.point_count(), 2);
    }

    #[test]
    fn pole_rejection() {
        let (model, sink) = model(on());
        let axes = AxisPosition::new(0., 89.);
        let err = model
            .add_alignment_point([1., 89.95], axes, axes, PierSide::East, utc())
            .unwrap_err();
        assert!(matches!(err, AlignmentError::OutOfRange { .. }));
        assert_eq!(model.point_count(), 0);
        assert_eq!(sink.of_kind(NotificationKind::Warning).len(), 1);

        model
            .add_alignment_point([1., -89.8], axes, axes, PierSide::East, utc())
            .unwrap();
        assert_eq!(model.point_count(), 1);
    }

    #[test]
    fn alt_az_recorded() {
        let (model, _) = model(on());
        let time = model.time_record(utc());
        add(&model, [10., 20.], [10.5, 20.3]);
        let point = model.alignment_points()[0].clone();
        let expected = StandardConverter.ra_dec_to_alt_az(10., 20., time.local_sidereal_time, 52.);
        assert_abs_diff_eq!(point.alt_az[0], expected[0], epsilon = 1e-9);
        assert_abs_diff_eq!(point.alt_az[1], expected[1], epsilon = 1e-9);
        assert_eq!(point.sync_time, time);
    }

    fn triangulated() -> AlignmentSettings {
        on().with_algorithm(AlignmentAlgorithm::TriangulatedAffine)
    }

    #[test]
    fn triangle_maps_vertices_exactly() {
        let (model, _) = model(triangulated());
        add(&model, [60., 50.], [60.4, 50.2]);
        add(&model, [110., 40.], [110.3, 39.7]);
        add(&model, [85., 70.], [85.2, 70.5]);

        for p in model.alignment_points().iter() {
            let observed = model.get_observed_axes(p.mount_axes, PierSide::Unknown);
            assert!(observed.approx_eq(&p.sky_axes, 1e-6), "{} -> {observed}", p.mount_axes);
            let mount = model.get_mount_axes(p.sky_axes, PierSide::Unknown);
            assert!(mount.approx_eq(&p.mount_axes, 1e-6), "{} -> {mount}", p.sky_axes);
        }
        assert!(model.alignment_points().iter().all(|p| p.selected));
    }

    #[test]
    fn triangle_without_offsets_is_identity() {
        let (model, _) = model(triangulated());
        for axes in [[60., 50.], [110., 40.], [85., 70.], [70., 20.]] {
            add(&model, axes, axes);
        }
        let time = model.time_record(utc());
        let target = AxisPosition::new(80., 50.);

        let mapping = model.delta_matrix_map(target, &time).unwrap();
        assert!(mapping.axes.approx_eq(&target, 1e-6));
        let reverse = model.delta_matrix_reverse_map(target, &time).unwrap();
        assert!(reverse.axes.approx_eq(&target, 1e-6));
        assert_eq!(model.alignment_points().iter().filter(|p| p.selected).count(), 3);
    }

    #[test]
    fn triangle_keeps_pole_side_at_meridian() {
        let (model, _) = model(triangulated());
        for axes in [[60., 50.], [110., 40.], [85., 70.]] {
            add(&model, axes, axes);
        }
        let time = model.time_record(utc());

        // RA axis 0 with the Dec axis past the pole, and its counterweight-up twin.
        for target in [[0., 120.], [0., 150.], [0., 180.], [0., 240.], [180., 60.]] {
            let target = AxisPosition::from(target);
            let mapping = model.delta_matrix_map(target, &time).unwrap();
            assert!(mapping.axes.approx_eq(&target, 1e-6), "{target} -> {}", mapping.axes);
            let reverse = model.delta_matrix_reverse_map(target, &time).unwrap();
            assert!(reverse.axes.approx_eq(&target, 1e-6), "{target} -> {}", reverse.axes);

            let observed = model.get_observed_axes(target, PierSide::Unknown);
            assert!(observed.approx_eq(&target, 1e-6), "{target} -> {observed}");
        }
    }

    #[test]
    fn triangle_fallbacks() {
        let (model, _) = model(triangulated());
        add(&model, [60., 50.], [60.4, 50.2]);
        let target = AxisPosition::new(100., 30.);
        let observed = model.get_observed_axes(target, PierSide::East);
        assert!(observed.approx_eq(&AxisPosition::new(100.4, 30.2), 1e-9));

        add(&model, [110., 40.], [110.3, 39.7]);
        let observed = model.get_observed_axes(target, PierSide::East);
        assert!(observed.approx_eq(&AxisPosition::new(100.3, 29.7), 1e-9));
        let time = model.time_record(utc());
        assert_eq!(model.delta_matrix_map(target, &time), None);
    }

    #[test]
    fn triangle_outside_hull() {
        let (model, _) = model(triangulated());
        for (mount, sky) in [
            ([60., 50.], [60.4, 50.2]),
            ([110., 40.], [110.3, 39.7]),
            ([85., 70.], [85.2, 70.5]),
            ([75., 45.], [75.1, 45.1]),
        ] {
            add(&model, mount, sky);
        }
        let far = AxisPosition::new(170., -30.);
        assert_eq!(model.get_observed_axes(far, PierSide::East), far);

        model.set_nearest_fallback(true);
        let observed = model.get_observed_axes(far, PierSide::East);
        assert!(!observed.approx_eq(&far, 1e-6));
        assert_eq!(model.alignment_points().iter().filter(|p| p.selected).count(), 1);
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alignment").join("points.json");

        let (model, sink) = model(on());
        let model = model.with_points_file(&path).unwrap();
        add(&model, [10., 20.], [10.5, 20.3]);
        add(&model, [50., 60.], [49.6, 60.4]);
        assert!(path.exists());
        assert!(
            sink.of_kind(NotificationKind::Data)
                .iter()
                .any(|n| n.method == "AlignmentPoints")
        );

        let reopened = AlignmentModel::new(Site::new(52., -1.5, 100.), on())
            .with_points_file(&path)
            .unwrap();
        assert_eq!(reopened.alignment_points(), model.alignment_points());
        assert!(reopened.one_star_adjustment().approx_eq(&AxisPosition::new(-0.4, 0.4), 1e-9));

        let export = dir.path().join("export.json");
        model.save_alignment_points_to(&export).unwrap();
        model.clear_alignment_points().unwrap();
        assert_eq!(model.load_alignment_points_from(&export).unwrap(), 2);
        assert_eq!(
            persistence::load_points(&path).unwrap().len(),
            2,
            "import is saved to the model's own file"
        );
    }

    #[test]
    fn startup_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        let stamp = AccessTimestamp::beside(&path);
        let now = utc();

        let (seed, _) = model(on());
        let seed = seed.open_points_file(&path, now - TimeDelta::hours(2)).unwrap();
        add(&seed, [10., 20.], [10.5, 20.3]);

        // Without the clear flag, old points are kept.
        let kept = AlignmentModel::new(Site::new(52., -1.5, 100.), on())
            .open_points_file(&path, now)
            .unwrap();
        assert_eq!(kept.point_count(), 1);
        assert_eq!(stamp.read(), None, "opening is not an access");

        // Recent access keeps them even with the flag.
        AccessTimestamp::beside(&path).write(now).unwrap();
        let settings = on().with_clear_points_on_startup(true);
        let recent = AlignmentModel::new(Site::new(52., -1.5, 100.), settings.clone())
            .open_points_file(&path, now + TimeDelta::minutes(30))
            .unwrap();
        assert_eq!(recent.point_count(), 1);
        assert_eq!(stamp.read(), Some(now));

        // Measured from the last correction, not from the previous start.
        let stale = AlignmentModel::new(Site::new(52., -1.5, 100.), settings)
            .open_points_file(&path, now + TimeDelta::minutes(90))
            .unwrap();
        assert_eq!(stale.point_count(), 0);
        assert!(persistence::load_points(&path).unwrap().is_empty());
    }

    #[test]
    fn corrections_touch_the_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");

        let (model, _) = model(on());
        let model = model.with_points_file(&path).unwrap();
        add(&model, [10., 20.], [10.5, 20.3]);
        assert_eq!(AccessTimestamp::beside(&path).read(), None);

        model.get_observed_axes(AxisPosition::new(30., 40.), PierSide::East);
        assert!(AccessTimestamp::beside(&path).read().is_some());
    }

    #[test]
    fn failed_save_keeps_the_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");

        let (model, _) = model(on());
        let model = model.with_points_file(&path).unwrap();
        add(&model, [10., 20.], [10.5, 20.3]);

        // A directory in place of the file makes every save fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let sky = AxisPosition::new(49.6, 60.4);
        let result =
            model.add_alignment_point([10., 20.], [50., 60.].into(), sky, PierSide::East, utc());
        assert!(matches!(result, Err(AlignmentError::Persistence(_))));
        assert_eq!(model.point_count(), 2);
        assert!(model.one_star_adjustment().approx_eq(&AxisPosition::new(-0.4, 0.4), 1e-9));

        // The new point already takes part in corrections.
        let observed = model.get_observed_axes(AxisPosition::new(45., 55.), PierSide::East);
        assert!(observed.approx_eq(&AxisPosition::new(44.6, 55.4), 1e-9), "{observed}");
    }

    #[test]
    fn settings_accessors() {
        let (model, _) = model(AlignmentSettings::default());
        model.set_alignment_on(true);
        model.set_alignment_algorithm(AlignmentAlgorithm::TriangulatedAffine);
        model.set_point_filter_mode(PointFilterMode::Meridian);
        model.set_three_point_mode(ThreePointMode::NearestTriangle);
        model.set_triangle_distance(TriangleDistance::Polar);
        model.set_proximity_limit(0.25);
        model.set_nearby_limit(60.);
        model.set_sample_size(5);
        model.set_maximum_combination_count(20);
        model.set_nearest_fallback(true);

        let settings = model.settings();
        assert!(settings.is_alignment_on);
        assert_eq!(settings.alignment_algorithm, AlignmentAlgorithm::TriangulatedAffine);
        assert_eq!(settings.point_filter_mode, PointFilterMode::Meridian);
        assert_eq!(settings.three_point_mode, ThreePointMode::NearestTriangle);
        assert_eq!(settings.triangle_distance, TriangleDistance::Polar);
        assert_eq!(model.proximity_limit(), 0.25);
        assert_eq!(model.nearby_limit(), 60.);
        assert_eq!(model.sample_size(), 5);
        assert_eq!(model.maximum_combination_count(), 20);
        assert!(model.nearest_fallback());

        model.set_home_position(AxisPosition::new(0., 90.));
        assert_eq!(model.home_position(), AxisPosition::new(0., 90.));
        assert_eq!(model.settings().home_position, AxisPosition::new(0., 90.));

        model.set_site(Site::new(-33., 151., 20.));
        assert_eq!(model.site().latitude, -33.);
    }

    #[test]
    fn conversions_delegate_to_projection() {
        let (model, _) = model(on());
        let time = model.time_record(utc());
        let axes = AxisPosition::new(45., 60.);
        let spherical = model.axes_to_spherical(&axes, &time);
        assert!(model.spherical_to_axes(&spherical, &time).approx_eq(&axes, 1e-6));
        let cartesian = model.axes_to_cartesian(&axes, &time);
        assert_abs_diff_eq!(cartesian.x.hypot(cartesian.y), spherical.y - 90., epsilon = 1e-9);
    }
}
