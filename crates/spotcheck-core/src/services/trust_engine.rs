//! Registration and validation orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tokio::sync::Mutex;

use super::notify::{StageNotifier, TracingNotifier};
use crate::config::TrustConfig;
use crate::db::{
    Database, GeoIndex, NearbyLocation, SqliteLocationRepository, SqliteValidationRepository,
    ValidationStore,
};
use crate::error::{Error, Result};
use crate::geo::Coordinates;
use crate::models::{
    Category, Evidence, EvidenceInput, Location, LocationId, Stage, ValidationRecord,
};
use crate::trust::{
    ConfidenceScorer, DuplicateGuard, DuplicateVerdict, NearbyMatch, ProximityOutcome,
    ProximityValidator, StageMachine, StageTransition, ValidationAttempt,
};
use crate::util::unix_millis_now;

/// Device clocks may run this far ahead of the server (5 minutes).
const MAX_CAPTURE_SKEW_MS: i64 = 5 * 60 * 1000;

/// A request to add a new location to the map.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub name: String,
    pub category: Category,
    pub coordinates: Coordinates,
    pub creator_id: String,
    pub evidence: Vec<EvidenceInput>,
    /// Create even when similar locations are nearby (never overrides a block)
    pub force_proceed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// Nothing nearby; only produced by [`TrustEngine::check_duplicates`]
    Clear,
    /// Similar locations nearby; nothing was written
    Ambiguous { nearby_matches: Vec<NearbyMatch> },
    /// Area is saturated; nothing was written
    Blocked { nearby_matches: Vec<NearbyMatch> },
    /// The location was stored in the ghost stage
    Created {
        location: Location,
        /// Nearby locations the caller chose to override, if any
        nearby_matches: Vec<NearbyMatch>,
    },
}

impl From<DuplicateVerdict> for RegisterOutcome {
    fn from(verdict: DuplicateVerdict) -> Self {
        match verdict {
            DuplicateVerdict::Clear => Self::Clear,
            DuplicateVerdict::Ambiguous(nearby_matches) => Self::Ambiguous { nearby_matches },
            DuplicateVerdict::Blocked(nearby_matches) => Self::Blocked { nearby_matches },
        }
    }
}

/// A user's claim to be standing at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRequest {
    pub location_id: LocationId,
    pub validator_id: String,
    pub coordinates: Coordinates,
    /// Device capture time (Unix ms); defaults to now
    pub captured_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidateOutcome {
    Accepted {
        distance_m: f64,
        validation_count: u32,
        stage: Stage,
        stage_change: Option<StageTransition>,
    },
    AlreadyValidated {
        validation_count: u32,
    },
    TooFar {
        distance_m: f64,
    },
}

/// Thread-safe entry point for all trust operations.
///
/// Holds no state of its own besides configuration; every write runs in one
/// immediate `SQLite` transaction, so engines on separate connections to the
/// same file serialize correctly.
#[derive(Clone)]
pub struct TrustEngine {
    db: Arc<Mutex<Database>>,
    config: TrustConfig,
    notifier: Arc<dyn StageNotifier>,
}

impl TrustEngine {
    /// Wrap an open database. Fails if `config` is inconsistent.
    pub fn new(db: Database, config: TrustConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            config,
            notifier: Arc::new(TracingNotifier),
        })
    }

    /// Open an engine over a database file, creating parent directories.
    pub fn open_path(db_path: impl Into<PathBuf>, config: TrustConfig) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %db_path.display(), "Opening trust database");
        Self::new(Database::open(&db_path)?, config)
    }

    /// Open an in-memory engine (primarily for tests).
    pub fn open_in_memory(config: TrustConfig) -> Result<Self> {
        Self::new(Database::open_in_memory()?, config)
    }

    /// Replace the stage notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn StageNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub const fn config(&self) -> &TrustConfig {
        &self.config
    }

    fn guard(&self) -> DuplicateGuard {
        DuplicateGuard::new(self.config.dedup)
    }

    fn scorer(&self) -> ConfidenceScorer {
        ConfidenceScorer::new(self.config.scoring)
    }

    fn stages(&self) -> StageMachine {
        StageMachine::new(self.config.stages)
    }

    /// Run `work` against the database on the blocking pool.
    ///
    /// The connection lock is held for the whole closure, so a transaction
    /// opened inside it never interleaves with another one from this engine.
    async fn with_db<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Self, &mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        let mut db = Arc::clone(&self.db).lock_owned().await;
        tokio::task::spawn_blocking(move || work(&engine, &mut *db)).await?
    }

    /// Classify a position on behalf of `requester` without writing anything.
    pub async fn check_duplicates(
        &self,
        coordinates: Coordinates,
        requester: Option<&str>,
    ) -> Result<RegisterOutcome> {
        let coordinates = coordinates.validated()?;
        let requester = requester.map(str::to_string);

        self.with_db(move |engine, db| {
            let guard = engine.guard();
            let nearby = SqliteLocationRepository::new(db.connection())
                .find_within_radius(coordinates, guard.radius_km())?;
            Ok(guard.classify(&nearby, requester.as_deref()).into())
        })
        .await
    }

    /// Run the duplicate check and, when permitted, store a ghost location.
    pub async fn register_location(&self, request: RegisterRequest) -> Result<RegisterOutcome> {
        let mut candidate = Location::new(
            &request.name,
            request.category,
            request.coordinates,
            &request.creator_id,
            self.scorer().base_score(),
        )?;
        candidate.evidence = request
            .evidence
            .into_iter()
            .map(Evidence::new)
            .collect::<Result<Vec<_>>>()?;
        candidate.confidence_score = self.scorer().rescore(&candidate, candidate.created_at);
        let force_proceed = request.force_proceed;

        let outcome = self
            .with_db(move |engine, db| -> Result<RegisterOutcome> {
                let guard = engine.guard();
                let tx = db
                    .connection_mut()
                    .transaction_with_behavior(TransactionBehavior::Immediate)?;
                let locations = SqliteLocationRepository::new(&tx);

                let nearby =
                    locations.find_within_radius(candidate.coordinates, guard.radius_km())?;
                let verdict = guard.classify(&nearby, Some(candidate.creator_id.as_str()));
                if !verdict.permits_creation(force_proceed) {
                    return Ok(verdict.into());
                }

                let location = locations.insert(&candidate)?;
                tx.commit()?;
                Ok(RegisterOutcome::Created {
                    location,
                    nearby_matches: verdict.into_matches(),
                })
            })
            .await?;

        if let RegisterOutcome::Created {
            location,
            nearby_matches,
        } = &outcome
        {
            tracing::info!(
                location = %location.id,
                category = location.category.as_str(),
                confidence_score = location.confidence_score,
                overridden = nearby_matches.len(),
                "Registered location"
            );
        }
        Ok(outcome)
    }

    /// Record a proximity validation and update score and stage.
    pub async fn validate_location(&self, request: ValidateRequest) -> Result<ValidateOutcome> {
        let validator_id = request.validator_id.trim();
        if validator_id.is_empty() {
            return Err(Error::InvalidInput("Validator cannot be empty".to_string()));
        }
        let attempt = ValidationAttempt {
            validator_id: validator_id.to_string(),
            reported: request.coordinates.validated()?,
            attempted_at: capture_time(request.captured_at, unix_millis_now())?,
        };
        let location_id = request.location_id;

        let (outcome, accepted) = self
            .with_db(move |engine, db| -> Result<(ValidateOutcome, Option<Location>)> {
                let tx = db
                    .connection_mut()
                    .transaction_with_behavior(TransactionBehavior::Immediate)?;
                let locations = SqliteLocationRepository::new(&tx);
                let location = locations
                    .get(&location_id)?
                    .ok_or_else(|| Error::NotFound(location_id.to_string()))?;

                let record = match ProximityValidator::new(engine.config.proximity).attempt(
                    &SqliteValidationRepository::new(&tx),
                    &location,
                    &attempt,
                )? {
                    ProximityOutcome::Recorded(record) => record,
                    ProximityOutcome::AlreadyValidated => {
                        let outcome = ValidateOutcome::AlreadyValidated {
                            validation_count: location.validation_count,
                        };
                        return Ok((outcome, None));
                    }
                    ProximityOutcome::TooFar { distance_m } => {
                        return Ok((ValidateOutcome::TooFar { distance_m }, None));
                    }
                };

                let (location, stage_change) = engine.refresh_trust(&locations, &location_id)?;
                tx.commit()?;

                let outcome = ValidateOutcome::Accepted {
                    distance_m: record.distance_m,
                    validation_count: location.validation_count,
                    stage: location.stage,
                    stage_change,
                };
                Ok((outcome, Some(location)))
            })
            .await?;

        if let (
            ValidateOutcome::Accepted {
                distance_m,
                stage_change,
                ..
            },
            Some(location),
        ) = (&outcome, &accepted)
        {
            tracing::info!(
                location = %location.id,
                distance_m,
                validation_count = location.validation_count,
                confidence_score = location.confidence_score,
                "Accepted validation"
            );
            if let Some(transition) = stage_change {
                self.notifier.stage_changed(location, *transition);
            }
        }
        Ok(outcome)
    }

    /// Add evidence to an existing location.
    ///
    /// Ghost locations only accept evidence from their creator.
    pub async fn attach_evidence(
        &self,
        location_id: &LocationId,
        requester_id: &str,
        input: EvidenceInput,
    ) -> Result<Location> {
        let evidence = Evidence::new(input)?;
        let provenance = evidence.provenance;
        let location_id = *location_id;
        let requester_id = requester_id.to_string();

        let (location, stage_change) = self
            .with_db(move |engine, db| {
                let tx = db
                    .connection_mut()
                    .transaction_with_behavior(TransactionBehavior::Immediate)?;
                let locations = SqliteLocationRepository::new(&tx);
                let location = locations
                    .get(&location_id)?
                    .ok_or_else(|| Error::NotFound(location_id.to_string()))?;

                if location.stage == Stage::Ghost && !location.is_created_by(&requester_id) {
                    return Err(Error::Forbidden(
                        "Only the creator can add evidence before the first validation"
                            .to_string(),
                    ));
                }

                locations.attach_evidence(&location_id, &evidence)?;
                let refreshed = engine.refresh_trust(&locations, &location_id)?;
                tx.commit()?;
                Ok(refreshed)
            })
            .await?;

        tracing::info!(
            location = %location.id,
            provenance = provenance.as_str(),
            confidence_score = location.confidence_score,
            "Attached evidence"
        );
        if let Some(transition) = stage_change {
            self.notifier.stage_changed(&location, transition);
        }
        Ok(location)
    }

    /// Locations around `center` that `viewer` may see, nearest first.
    pub async fn find_nearby(
        &self,
        center: Coordinates,
        radius_km: f64,
        viewer: Option<&str>,
    ) -> Result<Vec<NearbyLocation>> {
        let center = center.validated()?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(Error::InvalidInput(
                "Radius must be a positive number".to_string(),
            ));
        }
        if radius_km > self.config.max_query_radius_km {
            return Err(Error::InvalidInput(format!(
                "Radius cannot exceed {} km",
                self.config.max_query_radius_km
            )));
        }
        let viewer = viewer.map(str::to_string);

        self.with_db(move |_, db| {
            let nearby = SqliteLocationRepository::new(db.connection())
                .find_within_radius(center, radius_km)?;
            Ok(nearby
                .into_iter()
                .filter(|found| found.location.is_visible_to(viewer.as_deref()))
                .collect())
        })
        .await
    }

    /// A location by ID, if it exists and `viewer` may see it.
    pub async fn get_location(
        &self,
        id: &LocationId,
        viewer: Option<&str>,
    ) -> Result<Option<Location>> {
        let id = *id;
        let viewer = viewer.map(str::to_string);

        self.with_db(move |_, db| {
            let location = SqliteLocationRepository::new(db.connection()).get(&id)?;
            Ok(location.filter(|location| location.is_visible_to(viewer.as_deref())))
        })
        .await
    }

    /// Validation history of a visible location, oldest first.
    pub async fn list_validations(
        &self,
        id: &LocationId,
        viewer: Option<&str>,
    ) -> Result<Vec<ValidationRecord>> {
        let id = *id;
        let viewer = viewer.map(str::to_string);

        self.with_db(move |_, db| {
            let visible = SqliteLocationRepository::new(db.connection())
                .get(&id)?
                .is_some_and(|location| location.is_visible_to(viewer.as_deref()));
            if !visible {
                return Err(Error::NotFound(id.to_string()));
            }
            SqliteValidationRepository::new(db.connection()).list_for_location(&id)
        })
        .await
    }

    /// Re-read a location, rescore it and persist any promotion.
    fn refresh_trust(
        &self,
        locations: &SqliteLocationRepository<'_>,
        id: &LocationId,
    ) -> Result<(Location, Option<StageTransition>)> {
        let mut location = locations
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let score = self.scorer().rescore(&location, unix_millis_now());
        let (stage, stage_change) =
            self.stages()
                .advance(location.stage, score, location.validation_count);

        if score != location.confidence_score || stage != location.stage {
            locations.update_trust(id, score, stage)?;
            location.confidence_score = score;
            location.stage = stage;
        }
        Ok((location, stage_change))
    }
}

/// Resolve a device capture time, rejecting values before the epoch or
/// further than [`MAX_CAPTURE_SKEW_MS`] ahead of `now`.
fn capture_time(captured_at: Option<i64>, now: i64) -> Result<i64> {
    match captured_at {
        None => Ok(now),
        Some(at) if at < 0 => Err(Error::InvalidInput(
            "Capture time cannot be negative".to_string(),
        )),
        Some(at) if at > now.saturating_add(MAX_CAPTURE_SKEW_MS) => Err(Error::InvalidInput(
            "Capture time is in the future".to_string(),
        )),
        Some(at) => Ok(at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingNotifier {
        transitions: StdMutex<Vec<StageTransition>>,
    }

    impl StageNotifier for RecordingNotifier {
        fn stage_changed(&self, _location: &Location, transition: StageTransition) {
            self.transitions.lock().unwrap().push(transition);
        }
    }

    const PLAZA: (f64, f64) = (4.6097, -74.0818);

    fn at(latitude: f64, longitude: f64) -> Coordinates {
        Coordinates::new(latitude, longitude).unwrap()
    }

    fn engine() -> TrustEngine {
        TrustEngine::open_in_memory(TrustConfig::default()).unwrap()
    }

    fn register_request(name: &str, coordinates: Coordinates, force_proceed: bool) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            category: Category::InformalSpot,
            coordinates,
            creator_id: "ana".to_string(),
            evidence: Vec::new(),
            force_proceed,
        }
    }

    fn validate_request(location_id: LocationId, validator: &str, coordinates: Coordinates) -> ValidateRequest {
        ValidateRequest {
            location_id,
            validator_id: validator.to_string(),
            coordinates,
            captured_at: None,
        }
    }

    async fn create(engine: &TrustEngine, name: &str, coordinates: Coordinates) -> Location {
        match engine
            .register_location(register_request(name, coordinates, true))
            .await
            .unwrap()
        {
            RegisterOutcome::Created { location, .. } => location,
            other => panic!("expected created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_registration_creates_ghost_at_base_score() {
        let engine = engine();
        let outcome = engine
            .register_location(register_request("Plaza ledges", at(PLAZA.0, PLAZA.1), false))
            .await
            .unwrap();

        let RegisterOutcome::Created {
            location,
            nearby_matches,
        } = outcome
        else {
            panic!("expected created, got {outcome:?}");
        };
        assert_eq!(location.stage, Stage::Ghost);
        assert_eq!(location.confidence_score, 10);
        assert_eq!(location.validation_count, 0);
        assert!(nearby_matches.is_empty());
    }

    #[tokio::test]
    async fn registration_evidence_counts_toward_score() {
        let engine = engine();
        let mut request = register_request("Skate shop", at(PLAZA.0, PLAZA.1), false);
        request.evidence = vec![
            EvidenceInput::new("media/live-1.jpg", Provenance::LiveCapture),
            EvidenceInput::new("media/upload-1.jpg", Provenance::UploadedFile),
        ];

        let RegisterOutcome::Created { location, .. } =
            engine.register_location(request).await.unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(location.confidence_score, 18);
        assert_eq!(location.evidence.len(), 2);
    }

    #[tokio::test]
    async fn nearby_registration_is_ambiguous_and_writes_nothing() {
        let engine = engine();
        let first = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;

        // ~110 m away, a different category.
        let mut request = register_request("Plaza park", at(4.6107, -74.0818), false);
        request.category = Category::Park;
        let outcome = engine.register_location(request).await.unwrap();

        let RegisterOutcome::Ambiguous { nearby_matches } = outcome else {
            panic!("expected ambiguous, got {outcome:?}");
        };
        assert_eq!(nearby_matches.len(), 1);
        assert_eq!(nearby_matches[0].id, first.id);

        let visible = engine
            .find_nearby(at(PLAZA.0, PLAZA.1), 1.0, Some("ana"))
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[tokio::test]
    async fn force_proceed_creates_and_reports_overridden_matches() {
        let engine = engine();
        create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;

        let outcome = engine
            .register_location(register_request("Plaza stairs", at(4.6100, -74.0818), true))
            .await
            .unwrap();

        let RegisterOutcome::Created { nearby_matches, .. } = outcome else {
            panic!("expected created, got {outcome:?}");
        };
        assert_eq!(nearby_matches.len(), 1);
    }

    #[tokio::test]
    async fn saturated_area_is_blocked_even_when_forced() {
        let engine = engine();
        for index in 0..5 {
            let offset = f64::from(index) * 0.0005;
            create(&engine, &format!("Spot {index}"), at(PLAZA.0 + offset, PLAZA.1)).await;
        }

        let outcome = engine
            .register_location(register_request("One more", at(PLAZA.0, PLAZA.1), true))
            .await
            .unwrap();

        let RegisterOutcome::Blocked { nearby_matches } = outcome else {
            panic!("expected blocked, got {outcome:?}");
        };
        assert_eq!(nearby_matches.len(), 5);
    }

    #[tokio::test]
    async fn check_duplicates_reports_clear_then_ambiguous() {
        let engine = engine();
        let plaza = at(PLAZA.0, PLAZA.1);

        assert_eq!(
            engine.check_duplicates(plaza, Some("bruno")).await.unwrap(),
            RegisterOutcome::Clear
        );
        create(&engine, "Plaza ledges", plaza).await;
        assert!(matches!(
            engine.check_duplicates(plaza, Some("bruno")).await.unwrap(),
            RegisterOutcome::Ambiguous { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_matches_hide_foreign_ghost_names() {
        let engine = engine();
        let plaza = at(PLAZA.0, PLAZA.1);
        let ghost = create(&engine, "Secret ledges", plaza).await;

        let RegisterOutcome::Ambiguous { nearby_matches } =
            engine.check_duplicates(plaza, Some("bruno")).await.unwrap()
        else {
            panic!("expected ambiguous");
        };
        assert_eq!(nearby_matches[0].id, ghost.id);
        assert_eq!(nearby_matches[0].name, None);

        let mut request = register_request("Plaza rails", plaza, false);
        request.creator_id = "bruno".to_string();
        let RegisterOutcome::Ambiguous { nearby_matches } =
            engine.register_location(request).await.unwrap()
        else {
            panic!("expected ambiguous");
        };
        assert_eq!(nearby_matches[0].name, None);

        let RegisterOutcome::Ambiguous { nearby_matches } =
            engine.check_duplicates(plaza, Some("ana")).await.unwrap()
        else {
            panic!("expected ambiguous");
        };
        assert_eq!(nearby_matches[0].name.as_deref(), Some("Secret ledges"));

        engine
            .validate_location(validate_request(ghost.id, "bruno", plaza))
            .await
            .unwrap();
        let RegisterOutcome::Ambiguous { nearby_matches } =
            engine.check_duplicates(plaza, None).await.unwrap()
        else {
            panic!("expected ambiguous");
        };
        assert_eq!(nearby_matches[0].name.as_deref(), Some("Secret ledges"));
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected_before_writing() {
        let engine = engine();

        let short = engine
            .register_location(register_request("ab", at(PLAZA.0, PLAZA.1), false))
            .await
            .unwrap_err();
        assert!(matches!(short, Error::InvalidInput(_)));

        let off_planet = Coordinates {
            latitude: 91.0,
            longitude: 0.0,
        };
        let err = engine
            .register_location(register_request("North pole+", off_planet, false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(
            engine.check_duplicates(at(PLAZA.0, PLAZA.1), None).await.unwrap(),
            RegisterOutcome::Clear
        );
    }

    #[tokio::test]
    async fn bogota_walkthrough_promotes_through_stages() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine().with_notifier(notifier.clone());
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;
        let nearby = at(4.6102, -74.0818);

        let first = engine
            .validate_location(validate_request(location.id, "bruno", nearby))
            .await
            .unwrap();
        let ValidateOutcome::Accepted {
            distance_m,
            validation_count,
            stage,
            stage_change,
        } = first
        else {
            panic!("expected accepted, got {first:?}");
        };
        assert!(distance_m < 100.0);
        assert_eq!(validation_count, 1);
        assert_eq!(stage, Stage::Review);
        assert_eq!(
            stage_change,
            Some(StageTransition {
                from: Stage::Ghost,
                to: Stage::Review
            })
        );

        engine
            .validate_location(validate_request(location.id, "carla", nearby))
            .await
            .unwrap();
        let third = engine
            .validate_location(validate_request(location.id, "diego", nearby))
            .await
            .unwrap();
        assert!(matches!(
            third,
            ValidateOutcome::Accepted {
                validation_count: 3,
                stage: Stage::Verified,
                ..
            }
        ));

        let stored = engine
            .get_location(&location.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.confidence_score, 58);
        assert_eq!(stored.stage, Stage::Verified);

        // ~5 km north.
        let far = engine
            .validate_location(validate_request(location.id, "elena", at(4.6547, -74.0818)))
            .await
            .unwrap();
        assert!(matches!(far, ValidateOutcome::TooFar { distance_m } if distance_m > 4_000.0));

        let repeat = engine
            .validate_location(validate_request(location.id, "bruno", nearby))
            .await
            .unwrap();
        assert_eq!(
            repeat,
            ValidateOutcome::AlreadyValidated {
                validation_count: 3
            }
        );

        assert_eq!(
            *notifier.transitions.lock().unwrap(),
            vec![
                StageTransition {
                    from: Stage::Ghost,
                    to: Stage::Review
                },
                StageTransition {
                    from: Stage::Review,
                    to: Stage::Verified
                },
            ]
        );
        assert_eq!(
            engine
                .list_validations(&location.id, None)
                .await
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn creator_cannot_validate_own_location() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;

        let err = engine
            .validate_location(validate_request(location.id, "ana", at(PLAZA.0, PLAZA.1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SelfValidation));
    }

    #[tokio::test]
    async fn out_of_range_capture_times_are_rejected() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;
        let an_hour_ahead = unix_millis_now() + 60 * 60 * 1000;

        for captured_at in [-1, an_hour_ahead] {
            let mut request = validate_request(location.id, "bruno", at(PLAZA.0, PLAZA.1));
            request.captured_at = Some(captured_at);
            let err = engine.validate_location(request).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{captured_at}");
        }
        assert!(engine
            .list_validations(&location.id, Some("ana"))
            .await
            .unwrap()
            .is_empty());

        let mut request = validate_request(location.id, "bruno", at(PLAZA.0, PLAZA.1));
        request.captured_at = Some(1_700_000_000_000);
        engine.validate_location(request).await.unwrap();
        let records = engine.list_validations(&location.id, None).await.unwrap();
        assert_eq!(records[0].validated_at, 1_700_000_000_000);
    }

    #[test]
    fn capture_time_allows_small_clock_skew() {
        let now = 1_700_000_000_000;
        assert_eq!(capture_time(None, now).unwrap(), now);
        assert_eq!(capture_time(Some(now + 60_000), now).unwrap(), now + 60_000);
        assert!(capture_time(Some(now + MAX_CAPTURE_SKEW_MS + 1), now).is_err());
    }

    #[tokio::test]
    async fn validating_unknown_location_is_not_found() {
        let err = engine()
            .validate_location(validate_request(LocationId::new(), "bruno", at(PLAZA.0, PLAZA.1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn ghost_locations_are_private_to_creator() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;
        let plaza = at(PLAZA.0, PLAZA.1);

        assert!(engine.get_location(&location.id, Some("ana")).await.unwrap().is_some());
        assert!(engine.get_location(&location.id, Some("bruno")).await.unwrap().is_none());
        assert!(engine.find_nearby(plaza, 1.0, Some("bruno")).await.unwrap().is_empty());
        assert!(matches!(
            engine.list_validations(&location.id, None).await.unwrap_err(),
            Error::NotFound(_)
        ));

        engine
            .validate_location(validate_request(location.id, "bruno", plaza))
            .await
            .unwrap();
        assert_eq!(engine.find_nearby(plaza, 1.0, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_nearby_rejects_bad_radius() {
        let engine = engine();
        let plaza = at(PLAZA.0, PLAZA.1);

        for radius_km in [0.0, -1.0, 51.0, f64::NAN] {
            let err = engine.find_nearby(plaza, radius_km, None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{radius_km}");
        }
    }

    #[tokio::test]
    async fn ghost_evidence_is_creator_only() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;

        let err = engine
            .attach_evidence(
                &location.id,
                "bruno",
                EvidenceInput::new("media/bruno.jpg", Provenance::LiveCapture),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let updated = engine
            .attach_evidence(
                &location.id,
                "ana",
                EvidenceInput::new("media/ana.jpg", Provenance::LiveCapture),
            )
            .await
            .unwrap();
        assert_eq!(updated.confidence_score, 16);
        assert_eq!(updated.evidence.len(), 1);
        assert_eq!(updated.stage, Stage::Ghost);
    }

    #[tokio::test]
    async fn anyone_can_add_evidence_after_review() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;
        engine
            .validate_location(validate_request(location.id, "bruno", at(PLAZA.0, PLAZA.1)))
            .await
            .unwrap();

        let updated = engine
            .attach_evidence(
                &location.id,
                "carla",
                EvidenceInput::new("media/carla.jpg", Provenance::UploadedFile),
            )
            .await
            .unwrap();
        assert_eq!(updated.confidence_score, 32);
        assert_eq!(updated.stage, Stage::Review);
    }

    #[tokio::test]
    async fn score_and_stage_never_decrease_across_operations() {
        let engine = engine();
        let location = create(&engine, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;
        let mut last = (location.confidence_score, location.stage);

        for (index, validator) in ["v1", "v2", "v3", "v4"].iter().enumerate() {
            let coordinates = if index % 2 == 0 {
                at(PLAZA.0, PLAZA.1)
            } else {
                at(5.0, -75.0)
            };
            engine
                .validate_location(validate_request(location.id, validator, coordinates))
                .await
                .unwrap();
            let stored = engine.get_location(&location.id, Some("ana")).await.unwrap().unwrap();
            assert!(stored.confidence_score >= last.0);
            assert!(stored.stage >= last.1);
            last = (stored.confidence_score, stored.stage);
        }
    }

    #[test]
    fn inconsistent_config_is_rejected() {
        let mut config = TrustConfig::default();
        config.dedup.block_threshold = 0;
        assert!(matches!(
            TrustEngine::open_in_memory(config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_registrations_create_only_one_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let first = TrustEngine::open_path(&path, TrustConfig::default()).unwrap();
        let second = TrustEngine::open_path(&path, TrustConfig::default()).unwrap();

        let plaza = at(PLAZA.0, PLAZA.1);
        let a = tokio::spawn(async move {
            first
                .register_location(register_request("Plaza ledges", plaza, false))
                .await
        });
        let b = tokio::spawn(async move {
            second
                .register_location(register_request("Plaza rails", plaza, false))
                .await
        });

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let created = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, RegisterOutcome::Created { .. }))
            .count();
        let ambiguous = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, RegisterOutcome::Ambiguous { .. }))
            .count();
        assert_eq!((created, ambiguous), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_validations_by_one_user_count_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let first = TrustEngine::open_path(&path, TrustConfig::default()).unwrap();
        let second = TrustEngine::open_path(&path, TrustConfig::default()).unwrap();
        let location = create(&first, "Plaza ledges", at(PLAZA.0, PLAZA.1)).await;

        let plaza = at(PLAZA.0, PLAZA.1);
        let a = {
            let engine = first.clone();
            tokio::spawn(async move {
                engine
                    .validate_location(validate_request(location.id, "bruno", plaza))
                    .await
            })
        };
        let b = tokio::spawn(async move {
            second
                .validate_location(validate_request(location.id, "bruno", plaza))
                .await
        });

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let accepted = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ValidateOutcome::Accepted { .. }))
            .count();
        assert_eq!(accepted, 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, ValidateOutcome::AlreadyValidated { .. })));

        let stored = first
            .get_location(&location.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.validation_count, 1);
    }
}
