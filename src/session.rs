//! Activity session state machine.
//!
//! One session covers a full record, stop, summarize, optional return trip and
//! save cycle:
//!
//! ```text
//! Idle -> RequestingPermission -> Recording -> Stopped -> [ReturnTrip] -> Saved
//!                 |                   |           |
//!                 +-------------------+-----------+--> Failed(reason)
//! ```
//!
//! [`transition`] is the pure rule table; [`ActivitySession`] drives the
//! collaborators and only changes state through it. Directions and save
//! requests are registered with the session and aborted when it leaves
//! `Stopped`/`ReturnTrip`, when a [`SessionCanceller`] fires, or on drop.

use chrono::{DateTime, Local, Utc};
use futures::future::{AbortHandle, Abortable};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::analytics::{self, ActivitySummary};
use crate::config::TrackerConfig;
use crate::directions::{DirectionsOverlay, DirectionsResult, DirectionsService};
use crate::error::{Result, TrackerError};
use crate::location::{LocationProvider, LocationStream, Permission};
use crate::map_view::MapFrame;
use crate::persistence::{ActivityRecord, ActivityStore};
use crate::{GeoPoint, Track};

// ============================================================================
// States and transitions
// ============================================================================

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    RequestingPermission,
    /// The only state in which samples are appended.
    Recording,
    Stopped,
    /// Stopped, with a return route on display.
    ReturnTrip,
    Saved,
    /// Terminal.
    Failed(TrackerError),
}

impl SessionState {
    /// States in which a summary exists and requests may be outstanding.
    fn is_finished_recording(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::ReturnTrip)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Saved | SessionState::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::RequestingPermission => write!(f, "RequestingPermission"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::ReturnTrip => write!(f, "ReturnTrip"),
            SessionState::Saved => write!(f, "Saved"),
            SessionState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Start,
    PermissionGranted,
    PermissionDenied,
    /// The location provider stopped delivering positions.
    ProviderFailed(String),
    Stop,
    ReturnToStart,
    Save,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Start => write!(f, "start"),
            SessionEvent::PermissionGranted => write!(f, "granted"),
            SessionEvent::PermissionDenied => write!(f, "denied"),
            SessionEvent::ProviderFailed(_) => write!(f, "provider failed"),
            SessionEvent::Stop => write!(f, "stop"),
            SessionEvent::ReturnToStart => write!(f, "returnToStart"),
            SessionEvent::Save => write!(f, "save"),
        }
    }
}

/// Next state for `event` in `state`, or [`TrackerError::InvalidTransition`].
///
/// # Example
/// ```
/// use activity_tracker::session::{transition, SessionEvent, SessionState};
///
/// let next = transition(&SessionState::Recording, &SessionEvent::Stop).unwrap();
/// assert_eq!(next, SessionState::Stopped);
/// assert!(transition(&SessionState::Idle, &SessionEvent::Save).is_err());
/// ```
pub fn transition(state: &SessionState, event: &SessionEvent) -> Result<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    let next = match (state, event) {
        (S::Idle, E::Start) => S::RequestingPermission,
        (S::RequestingPermission, E::PermissionGranted) => S::Recording,
        (S::RequestingPermission, E::PermissionDenied) => S::Failed(TrackerError::PermissionDenied),
        (S::RequestingPermission | S::Recording | S::Stopped, E::ProviderFailed(message)) => {
            S::Failed(TrackerError::ProviderUnavailable { message: message.clone() })
        }
        (S::Recording, E::Stop) => S::Stopped,
        (S::Stopped, E::ReturnToStart) => S::ReturnTrip,
        (S::Stopped | S::ReturnTrip, E::Save) => S::Saved,
        _ => {
            return Err(TrackerError::InvalidTransition {
                from: state.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}

// ============================================================================
// Outstanding requests
// ============================================================================

#[derive(Default)]
struct Outstanding {
    next_id: u64,
    handles: HashMap<u64, AbortHandle>,
}

/// Abort handles of the requests a session is waiting on.
#[derive(Clone, Default)]
struct RequestRegistry {
    inner: Arc<Mutex<Outstanding>>,
}

impl RequestRegistry {
    fn lock(&self) -> MutexGuard<'_, Outstanding> {
        // A panic while holding the lock leaves the map itself consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `request`, resolving to [`TrackerError::Cancelled`] if aborted first.
    async fn run<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (handle, registration) = AbortHandle::new_pair();
        let id = {
            let mut outstanding = self.lock();
            let id = outstanding.next_id;
            outstanding.next_id += 1;
            outstanding.handles.insert(id, handle);
            id
        };

        let outcome = Abortable::new(request, registration).await;
        self.lock().handles.remove(&id);

        match outcome {
            Ok(result) => result,
            Err(_aborted) => Err(TrackerError::Cancelled),
        }
    }

    fn abort_all(&self) -> usize {
        let mut outstanding = self.lock();
        let count = outstanding.handles.len();
        for (_, handle) in outstanding.handles.drain() {
            handle.abort();
        }
        count
    }

    fn outstanding(&self) -> usize {
        self.lock().handles.len()
    }
}

/// Cancels a session's outstanding requests from outside the session.
#[derive(Clone)]
pub struct SessionCanceller {
    requests: RequestRegistry,
}

impl SessionCanceller {
    /// Abort every request the session is currently waiting on.
    pub fn cancel(&self) {
        let aborted = self.requests.abort_all();
        if aborted > 0 {
            info!("[ActivitySession] Cancelled {} outstanding request(s)", aborted);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.requests.outstanding()
    }
}

// ============================================================================
// Session
// ============================================================================

/// A single recording and everything derived from it.
pub struct ActivitySession {
    provider: Arc<dyn LocationProvider>,
    overlay: DirectionsOverlay,
    store: Arc<dyn ActivityStore>,
    config: TrackerConfig,
    clock: fn() -> DateTime<Utc>,

    state: SessionState,
    stream: Option<LocationStream>,
    /// Frozen once recording ends
    track: Track,
    start_time: Option<DateTime<Utc>>,
    summary: Option<ActivitySummary>,
    /// What the store accepted
    saved: Option<ActivityRecord>,
    return_route: DirectionsResult,
    requests: RequestRegistry,
}

impl ActivitySession {
    /// Arrows on the return route are spaced by `config.arrow_stride`.
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        directions: Arc<dyn DirectionsService>,
        store: Arc<dyn ActivityStore>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            provider,
            overlay: DirectionsOverlay::with_stride(directions, config.arrow_stride),
            store,
            config,
            clock: Utc::now,
            state: SessionState::Idle,
            stream: None,
            track: Track::new(),
            start_time: None,
            summary: None,
            saved: None,
            return_route: DirectionsResult::empty(),
            requests: RequestRegistry::default(),
        }
    }

    /// Replace the wall clock used for start and end times.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        let next = transition(&self.state, &event)?;
        debug!("[ActivitySession] {} --{}--> {}", self.state, event, next);

        if self.state.is_finished_recording() && !next.is_finished_recording() {
            let aborted = self.requests.abort_all();
            if aborted > 0 {
                debug!("[ActivitySession] Aborted {} request(s) on leaving {}", aborted, self.state);
            }
        }

        self.state = next;
        Ok(())
    }

    fn fail(&mut self, event: SessionEvent, reason: TrackerError) -> TrackerError {
        if let Err(e) = self.apply(event) {
            warn!("[ActivitySession] {}", e);
        }
        if let Some(stream) = self.stream.take() {
            self.track = stream.into_track();
        }
        self.track.freeze();
        warn!("[ActivitySession] Failed: {}", reason);
        reason
    }

    /// Ask for location permission and start recording.
    ///
    /// A refusal moves the session to `Failed(PermissionDenied)` and no track
    /// is recorded.
    pub async fn start(&mut self) -> Result<()> {
        self.apply(SessionEvent::Start)?;

        if self.provider.request_permission().await == Permission::Denied {
            return Err(self.fail(SessionEvent::PermissionDenied, TrackerError::PermissionDenied));
        }

        let stream = match LocationStream::subscribe(self.provider.as_ref(), &self.config.watch).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(SessionEvent::ProviderFailed(e.to_string()), e)),
        };

        self.apply(SessionEvent::PermissionGranted)?;
        self.stream = Some(stream);
        self.start_time = Some((self.clock)());
        info!("[ActivitySession] Recording started");
        Ok(())
    }

    /// Apply every sample the provider has queued. Returns the number appended.
    ///
    /// Outside `Recording` nothing is appended.
    pub fn pump(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        match stream.pump() {
            Ok(appended) => Ok(appended),
            Err(e) => Err(self.provider_failed(e)),
        }
    }

    /// Wait for the next sample while recording.
    ///
    /// Returns `Ok(None)` when not recording or the provider hung up.
    pub async fn next_sample(&mut self) -> Result<Option<GeoPoint>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next_sample().await {
            Ok(sample) => Ok(sample),
            Err(e) => Err(self.provider_failed(e)),
        }
    }

    fn provider_failed(&mut self, e: TrackerError) -> TrackerError {
        let message = match &e {
            TrackerError::ProviderUnavailable { message } => message.clone(),
            other => other.to_string(),
        };
        self.fail(SessionEvent::ProviderFailed(message), e)
    }

    /// Stop recording and summarize.
    ///
    /// The subscription is removed before the track is read, so every sample
    /// delivered up to this point is included and nothing is appended after.
    pub fn stop(&mut self) -> Result<&ActivitySummary> {
        self.apply(SessionEvent::Stop)?;

        if let Some(stream) = self.stream.take() {
            self.track = stream.into_track();
        }
        self.track.freeze();

        let now = (self.clock)();
        let start = self.start_time.unwrap_or(now);
        let end = if now < start {
            warn!("[ActivitySession] Clock went backwards, clamping end time to start");
            start
        } else {
            now
        };

        let name = self.default_name(start);
        let summary = ActivitySummary::compute(name, self.track.points(), start, end)?;
        info!(
            "[ActivitySession] Stopped: {} samples, {} in {}, {:.2} km/h",
            self.track.len(),
            summary.display_distance(),
            summary.elapsed(),
            summary.average_speed_kmh
        );

        Ok(self.summary.insert(summary))
    }

    fn default_name(&self, start: DateTime<Utc>) -> String {
        match &self.config.default_activity_name {
            Some(name) => name.clone(),
            None => format!("{} Activity", analytics::period_at(&start.with_timezone(&Local))),
        }
    }

    /// Fetch a route from the last sample back to the first and show it.
    ///
    /// The route is kept apart from the recorded track and never affects the
    /// summary. With no samples there is nothing to route: the session stays
    /// `Stopped` and an empty result is returned. On failure the session also
    /// stays `Stopped`.
    pub async fn return_to_start(&mut self) -> Result<DirectionsResult> {
        transition(&self.state, &SessionEvent::ReturnToStart)?;

        let (Some(origin), Some(destination)) = (self.track.last().copied(), self.track.first().copied()) else {
            info!("[ActivitySession] No route coordinates available");
            return Ok(DirectionsResult::empty());
        };

        let overlay = self.overlay.clone();
        let route = self
            .with_retry("directions", || overlay.fetch_route(&origin, &destination))
            .await?;

        self.apply(SessionEvent::ReturnToStart)?;
        self.return_route = route.clone();
        Ok(route)
    }

    /// Submit the summary, optionally under a different name.
    ///
    /// The name only goes into the submitted record; the summary itself is
    /// never changed. Retryable failures are retried per the configured policy.
    /// If the save still fails the session stays where it was, so it can be
    /// retried.
    pub async fn save(&mut self, name: Option<&str>) -> Result<ActivityRecord> {
        transition(&self.state, &SessionEvent::Save)?;

        let Some(summary) = self.summary.as_ref() else {
            return Err(TrackerError::InvalidTransition {
                from: self.state.to_string(),
                event: SessionEvent::Save.to_string(),
            });
        };

        let mut record = ActivityRecord::from(summary);
        if let Some(name) = name {
            record.name = name.to_string();
        }

        let store = Arc::clone(&self.store);
        self.with_retry("save", || store.save(&record)).await?;

        self.apply(SessionEvent::Save)?;
        info!("[ActivitySession] Saved '{}'", record.name);
        Ok(self.saved.insert(record).clone())
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            match self.requests.run(request()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.backoff(attempt);
                    warn!(
                        "[ActivitySession] {} failed ({}), retry {}/{} in {:?}",
                        what, e, attempt, policy.max_retries, delay
                    );
                    self.requests
                        .run(async {
                            tokio::time::sleep(delay).await;
                            Ok(())
                        })
                        .await?;
                }
                Err(e) => {
                    warn!("[ActivitySession] {} failed: {}", what, e);
                    return Err(e);
                }
            }
        }
    }

    /// Handle for aborting outstanding requests from another task.
    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller { requests: self.requests.clone() }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The track being recorded, or the frozen track once recording ended.
    pub fn track(&self) -> &Track {
        match &self.stream {
            Some(stream) => stream.track(),
            None => &self.track,
        }
    }

    pub fn summary(&self) -> Option<&ActivitySummary> {
        self.summary.as_ref()
    }

    /// Record accepted by the store, once saved.
    pub fn saved_record(&self) -> Option<&ActivityRecord> {
        self.saved.as_ref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Return route currently on display, empty before a return trip.
    pub fn return_route(&self) -> &DirectionsResult {
        &self.return_route
    }

    pub fn current_position(&self) -> Option<GeoPoint> {
        self.stream.as_ref().and_then(|s| s.current_position())
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.stream.as_ref().map_or(0.0, |s| s.current_speed_kmh())
    }

    pub fn current_heading(&self) -> f64 {
        self.stream.as_ref().map_or(0.0, |s| s.current_heading())
    }

    /// What the map should show right now.
    pub fn map_frame(&self) -> MapFrame {
        match self.state {
            SessionState::Idle | SessionState::RequestingPermission => MapFrame::following(&[], None),
            SessionState::Recording => MapFrame::following(self.track().points(), self.current_position()),
            _ => MapFrame::overview(
                self.track.points(),
                &self.return_route.route,
                &self.return_route.arrows,
            ),
        }
    }
}

impl Drop for ActivitySession {
    fn drop(&mut self) {
        let aborted = self.requests.abort_all();
        if aborted > 0 {
            debug!("[ActivitySession] Aborted {} request(s) on drop", aborted);
        }
    }
}
