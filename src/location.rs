//! Live location sampling.
//!
//! A [`LocationProvider`] pushes updates into an unbounded channel; the
//! [`LocationStream`] owns the receiving end and the [`Track`] those updates are
//! appended to. The channel is the single serialized event queue between the
//! provider and the recorder, so appends never overlap with reads.
//!
//! The provider subscription is held in a [`SubscriptionGuard`] that removes it
//! on [`LocationStream::stop`] or, failing that, when the stream is dropped.

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::WatchConfig;
use crate::error::{Result, TrackerError};
use crate::{GeoPoint, Track};

/// Answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// An update pushed by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Sample(GeoPoint),
    /// The provider can no longer deliver positions.
    Failed(String),
}

/// Sending half handed to the provider when watching positions.
pub type SampleSender = mpsc::UnboundedSender<LocationEvent>;

/// A live provider subscription. `remove` must be idempotent.
pub trait Subscription: Send {
    fn remove(&mut self);
}

/// Platform location service.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> Permission;

    async fn current_position(&self) -> Result<GeoPoint>;

    /// Start delivering updates to `sink` until the returned subscription is removed.
    async fn watch_position(
        &self,
        config: &WatchConfig,
        sink: SampleSender,
    ) -> Result<Box<dyn Subscription>>;
}

/// Owns a provider subscription and removes it exactly once.
pub struct SubscriptionGuard {
    inner: Option<Box<dyn Subscription>>,
}

impl SubscriptionGuard {
    pub fn new(subscription: Box<dyn Subscription>) -> Self {
        Self { inner: Some(subscription) }
    }

    /// Remove the subscription. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut subscription) = self.inner.take() {
            subscription.remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!("[LocationStream] Releasing subscription on drop");
            self.release();
        }
    }
}

/// Appends provider updates to a track while subscribed.
pub struct LocationStream {
    track: Track,
    receiver: Option<mpsc::UnboundedReceiver<LocationEvent>>,
    subscription: SubscriptionGuard,
    initial_position: Option<GeoPoint>,
}

impl LocationStream {
    /// Ask for permission, then subscribe.
    ///
    /// Fails with [`TrackerError::PermissionDenied`] without subscribing when the
    /// user refuses.
    pub async fn start(provider: &dyn LocationProvider, config: &WatchConfig) -> Result<Self> {
        if provider.request_permission().await == Permission::Denied {
            warn!("[LocationStream] Permission to access location was denied");
            return Err(TrackerError::PermissionDenied);
        }
        Self::subscribe(provider, config).await
    }

    /// Subscribe to a provider that has already granted permission.
    ///
    /// The current position is fetched first and kept as the initial camera
    /// target; failing to get it does not prevent recording.
    pub async fn subscribe(provider: &dyn LocationProvider, config: &WatchConfig) -> Result<Self> {
        let initial_position = match provider.current_position().await {
            Ok(position) => Some(position),
            Err(e) => {
                warn!("[LocationStream] No initial position: {}", e);
                None
            }
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = provider.watch_position(config, sender).await?;

        info!(
            "[LocationStream] Watching positions ({:?}, every {}ms / {}m)",
            config.accuracy, config.min_interval_ms, config.min_distance_meters
        );

        Ok(Self {
            track: Track::new(),
            receiver: Some(receiver),
            subscription: SubscriptionGuard::new(subscription),
            initial_position,
        })
    }

    /// Append every update already queued. Returns the number of samples added.
    ///
    /// A provider failure is returned as [`TrackerError::ProviderUnavailable`];
    /// samples queued before it are kept.
    pub fn pump(&mut self) -> Result<usize> {
        let mut appended = 0;
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(0);
        };

        while let Ok(event) = receiver.try_recv() {
            match event {
                LocationEvent::Sample(point) => {
                    if self.track.push(point) {
                        appended += 1;
                    }
                }
                LocationEvent::Failed(message) => {
                    warn!("[LocationStream] Provider failed: {}", message);
                    return Err(TrackerError::ProviderUnavailable { message });
                }
            }
        }

        Ok(appended)
    }

    /// Wait for the next update and apply it.
    ///
    /// Returns `Ok(None)` once the stream is stopped or the provider hung up.
    pub async fn next_sample(&mut self) -> Result<Option<GeoPoint>> {
        loop {
            let Some(receiver) = self.receiver.as_mut() else {
                return Ok(None);
            };

            match receiver.recv().await {
                Some(LocationEvent::Sample(point)) => {
                    if self.track.push(point) {
                        return Ok(Some(point));
                    }
                }
                Some(LocationEvent::Failed(message)) => {
                    warn!("[LocationStream] Provider failed: {}", message);
                    return Err(TrackerError::ProviderUnavailable { message });
                }
                None => return Ok(None),
            }
        }
    }

    /// Unsubscribe, apply updates delivered before the unsubscribe, and freeze
    /// the track. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }

        self.subscription.release();

        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            while let Ok(event) = receiver.try_recv() {
                match event {
                    LocationEvent::Sample(point) => {
                        self.track.push(point);
                    }
                    LocationEvent::Failed(message) => {
                        debug!("[LocationStream] Ignoring failure after stop: {}", message);
                    }
                }
            }
        }

        self.track.freeze();
        info!("[LocationStream] Stopped with {} samples", self.track.len());
    }

    pub fn is_stopped(&self) -> bool {
        self.track.is_frozen()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Hand over the recorded track, stopping first if needed.
    pub fn into_track(mut self) -> Track {
        self.stop();
        std::mem::take(&mut self.track)
    }

    /// Latest sample, or the position fetched at subscription time.
    pub fn current_position(&self) -> Option<GeoPoint> {
        self.track.last().copied().or(self.initial_position)
    }

    pub fn initial_position(&self) -> Option<GeoPoint> {
        self.initial_position
    }

    /// Speed of the latest sample in km/h, 0 when unknown.
    pub fn current_speed_kmh(&self) -> f64 {
        self.track
            .last()
            .and_then(|p| p.speed)
            .map_or(0.0, |mps| mps * 3.6)
    }

    /// Heading of the latest sample in degrees, 0 when unknown.
    pub fn current_heading(&self) -> f64 {
        self.track.last().and_then(|p| p.heading).unwrap_or(0.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Provider whose updates are pushed by the test through `send`.
    #[derive(Clone)]
    pub(crate) struct FakeProvider {
        pub permission: Permission,
        pub position: Option<GeoPoint>,
        pub sink: Arc<Mutex<Option<SampleSender>>>,
        pub removals: Arc<AtomicUsize>,
        pub watch_error: Option<TrackerError>,
    }

    impl FakeProvider {
        pub fn granting() -> Self {
            Self {
                permission: Permission::Granted,
                position: Some(GeoPoint::new(45.4215, -75.6972)),
                sink: Arc::new(Mutex::new(None)),
                removals: Arc::new(AtomicUsize::new(0)),
                watch_error: None,
            }
        }

        pub fn denying() -> Self {
            Self { permission: Permission::Denied, ..Self::granting() }
        }

        pub fn send(&self, event: LocationEvent) {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                let _ = sink.send(event);
            }
        }

        pub fn sample(&self, lat: f64, lng: f64) {
            self.send(LocationEvent::Sample(GeoPoint::new(lat, lng)));
        }

        pub fn is_watching(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }

        pub fn removals(&self) -> usize {
            self.removals.load(Ordering::SeqCst)
        }
    }

    struct FakeSubscription {
        sink: Arc<Mutex<Option<SampleSender>>>,
        removals: Arc<AtomicUsize>,
    }

    impl Subscription for FakeSubscription {
        fn remove(&mut self) {
            self.sink.lock().unwrap().take();
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LocationProvider for FakeProvider {
        async fn request_permission(&self) -> Permission {
            self.permission
        }

        async fn current_position(&self) -> Result<GeoPoint> {
            self.position.ok_or(TrackerError::ProviderUnavailable {
                message: "no fix".to_string(),
            })
        }

        async fn watch_position(
            &self,
            _config: &WatchConfig,
            sink: SampleSender,
        ) -> Result<Box<dyn Subscription>> {
            if let Some(err) = &self.watch_error {
                return Err(err.clone());
            }
            *self.sink.lock().unwrap() = Some(sink);
            Ok(Box::new(FakeSubscription {
                sink: Arc::clone(&self.sink),
                removals: Arc::clone(&self.removals),
            }))
        }
    }

    #[tokio::test]
    async fn test_permission_denied_never_subscribes() {
        let provider = FakeProvider::denying();
        let result = LocationStream::start(&provider, &WatchConfig::default()).await;
        assert!(matches!(result, Err(TrackerError::PermissionDenied)));
        assert!(!provider.is_watching());
    }

    #[tokio::test]
    async fn test_samples_are_appended_in_order() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        provider.sample(45.0, -75.0);
        provider.sample(45.1, -75.1);
        provider.sample(45.2, -75.2);

        assert_eq!(stream.pump().unwrap(), 3);
        let lats: Vec<f64> = stream.track().points().iter().map(|p| p.latitude).collect();
        assert_eq!(lats, vec![45.0, 45.1, 45.2]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        stream.stop();
        stream.stop();

        assert!(stream.is_stopped());
        assert_eq!(provider.removals(), 1);
    }

    #[tokio::test]
    async fn test_stop_keeps_queued_samples_and_freezes() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        provider.sample(45.0, -75.0);
        provider.sample(45.1, -75.1);
        stream.stop();

        assert_eq!(stream.track().len(), 2);
        assert!(stream.track().is_frozen());

        // Nothing reaches the track after stop
        provider.sample(45.2, -75.2);
        assert_eq!(stream.pump().unwrap(), 0);
        assert_eq!(stream.track().len(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let provider = FakeProvider::granting();
        {
            let _stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();
            assert!(provider.is_watching());
        }
        assert_eq!(provider.removals(), 1);
        assert!(!provider.is_watching());
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        provider.sample(45.0, -75.0);
        provider.send(LocationEvent::Failed("gps off".to_string()));

        let err = stream.pump().unwrap_err();
        assert!(matches!(err, TrackerError::ProviderUnavailable { .. }));
        assert_eq!(stream.track().len(), 1);
    }

    #[tokio::test]
    async fn test_next_sample_waits_for_update() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        provider.sample(45.5, -75.5);
        let point = stream.next_sample().await.unwrap().unwrap();
        assert_eq!(point.latitude, 45.5);

        stream.stop();
        assert!(stream.next_sample().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_readouts() {
        let provider = FakeProvider::granting();
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();

        assert_eq!(stream.current_position(), provider.position);
        assert_eq!(stream.current_speed_kmh(), 0.0);
        assert_eq!(stream.current_heading(), 0.0);

        provider.send(LocationEvent::Sample(
            GeoPoint::new(45.0, -75.0).with_motion(Some(2.5), Some(270.0)),
        ));
        stream.pump().unwrap();

        assert!((stream.current_speed_kmh() - 9.0).abs() < 1e-9);
        assert_eq!(stream.current_heading(), 270.0);
        assert_eq!(stream.current_position().unwrap().latitude, 45.0);
    }

    #[tokio::test]
    async fn test_missing_initial_position_still_records() {
        let provider = FakeProvider { position: None, ..FakeProvider::granting() };
        let mut stream = LocationStream::start(&provider, &WatchConfig::default()).await.unwrap();
        assert!(stream.initial_position().is_none());

        provider.sample(45.0, -75.0);
        assert_eq!(stream.pump().unwrap(), 1);
    }
}
