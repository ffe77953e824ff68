//! Sync session
//!
//! A [`SyncSession`] lives as long as the watch view: `mount` opens the hub
//! connection and starts the driver task, `unmount` tears both down. All sync
//! work (hub events, host controls, player events, timers) is handled by the
//! single driver task, so the reconciler, broadcaster and feedback guard are
//! never shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broadcaster::{HostBroadcaster, HostTrigger};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::drift::DriftCorrector;
use crate::error::{HubError, SessionError, SyncError};
use crate::guard::FeedbackGuard;
use crate::hub::{HubConnection, HubConnector, Subscription};
use crate::player::{Player, PlayerEvent};
use crate::reconciler::{FollowerReconciler, Reconciled};
use crate::sync::{HostView, PlaybackUpdated, Role, SessionState};

/// Receives session notifications (UI banners, host state panel)
pub trait SessionObserver: Send + Sync {
    fn on_state_changed(&self, _state: SessionState) {}
    fn on_host_state(&self, _view: HostView) {}
    fn on_error(&self, _error: SyncError) {}
}

/// Host-only playback controls
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostControl {
    Play,
    Pause,
    /// Play if paused, pause if playing
    Toggle,
    Seek(f64),
}

#[derive(Debug)]
enum SessionCommand {
    Control(HostControl),
    Player(PlayerEvent),
}

/// State shared between the session handle and its driver.
///
/// Observer callbacks run after the lock they describe is released, so an
/// observer may read the session back.
struct Shared {
    state: RwLock<SessionState>,
    role: RwLock<Option<Role>>,
    host_view: RwLock<Option<HostView>>,
    unexpected_echo: AtomicBool,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Shared {
    fn set_state(&self, next: SessionState) {
        let changed = {
            let mut state = self.state.write();
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            self.notify_state(next);
        }
    }

    /// Move `from` -> `to` only if still in `from`
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        {
            let mut state = self.state.write();
            if *state != from {
                return false;
            }
            *state = to;
        }
        self.notify_state(to);
        true
    }

    /// Disconnected -> Connecting, atomically
    fn begin_connect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Disconnected => *state = SessionState::Connecting,
                SessionState::Connecting | SessionState::Connected => {
                    return Err(SessionError::AlreadyMounted)
                }
                SessionState::Closed => return Err(SessionError::Terminated),
            }
        }
        self.notify_state(SessionState::Connecting);
        Ok(())
    }

    fn notify_state(&self, state: SessionState) {
        debug!("Session state -> {:?}", state);
        if let Some(observer) = &self.observer {
            observer.on_state_changed(state);
        }
    }

    fn report(&self, error: SyncError) {
        if let Some(observer) = &self.observer {
            observer.on_error(error);
        }
    }
}

struct DriverHandle {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    cancel_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// One viewer's participation in a synchronized watch
pub struct SyncSession {
    config: SessionConfig,
    connector: Arc<dyn HubConnector>,
    player: Arc<dyn Player>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    driver: Mutex<Option<DriverHandle>>,
}

impl SyncSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn HubConnector>,
        player: Arc<dyn Player>,
    ) -> Self {
        Self::with_observer(config, connector, player, None)
    }

    pub fn with_observer(
        config: SessionConfig,
        connector: Arc<dyn HubConnector>,
        player: Arc<dyn Player>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            config,
            connector,
            player,
            clock: Arc::new(SystemClock),
            shared: Arc::new(Shared {
                state: RwLock::new(SessionState::Disconnected),
                role: RwLock::new(None),
                host_view: RwLock::new(None),
                unexpected_echo: AtomicBool::new(false),
                observer,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Use a different wall clock (tests, simulation)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Role, once connected
    pub fn role(&self) -> Option<Role> {
        *self.shared.role.read()
    }

    /// Last host state applied by this session
    pub fn host_view(&self) -> Option<HostView> {
        *self.shared.host_view.read()
    }

    /// The host got one of its own broadcasts back from a hub declared not to echo
    pub fn unexpected_echo(&self) -> bool {
        self.shared.unexpected_echo.load(Ordering::Relaxed)
    }

    /// Connect to the hub and start syncing
    pub async fn mount(&self) -> Result<Role, SessionError> {
        self.shared.begin_connect()?;
        info!("Connecting to hub as {}", self.config.identity);

        let connection = match self.connector.connect(&self.config.credential).await {
            Ok(connection) => connection,
            Err(e) => return Err(self.connect_failed(e)),
        };

        let subscription = match connection.subscribe_playback() {
            Ok(subscription) => subscription,
            Err(e) => {
                stop(connection.as_ref()).await;
                return Err(self.connect_failed(e));
            }
        };

        let role = Role::assign(&self.config.identity, &self.config.host_identity);
        *self.shared.role.write() = Some(role);

        let declared_echo = connection.echoes_own_messages();
        let echo = self.config.echo.resolve(declared_echo);
        let guard = if echo {
            FeedbackGuard::new(self.config.feedback_window())
        } else {
            FeedbackGuard::disabled()
        };

        info!(
            "Connected to hub: role={:?}, hub echo={:?}, feedback guard={}",
            role,
            declared_echo,
            if guard.is_enabled() { "on" } else { "off" }
        );

        let mut corrector = DriftCorrector::new(self.config.tolerance_seconds);
        if self.config.extrapolate {
            corrector = corrector.with_extrapolation(self.config.max_extrapolation());
        }

        let broadcaster = role.is_host().then(|| {
            HostBroadcaster::new(
                self.config.identity.clone(),
                self.config.heartbeat_interval(),
                self.config.seek_debounce(),
            )
        });

        let promoted = self.shared.transition(SessionState::Connecting, SessionState::Connected);

        let connection = {
            let mut slot = self.driver.lock();
            if promoted && self.state() == SessionState::Connected {
                let driver = SessionDriver {
                    role,
                    connection,
                    player: Arc::clone(&self.player),
                    clock: Arc::clone(&self.clock),
                    shared: Arc::clone(&self.shared),
                    guard,
                    reconciler: FollowerReconciler::new(corrector),
                    broadcaster,
                    echo_expected: echo,
                };

                let (command_tx, command_rx) = mpsc::unbounded_channel();
                let (cancel_tx, cancel_rx) = oneshot::channel();
                let task = tokio::spawn(driver.run(subscription, command_rx, cancel_rx));

                *slot = Some(DriverHandle {
                    command_tx,
                    cancel_tx,
                    task,
                });
                return Ok(role);
            }
            connection
        };

        // Unmounted while the handshake was in flight
        stop(connection.as_ref()).await;
        Err(SessionError::Terminated)
    }

    /// Tear the session down. Safe to call more than once.
    pub async fn unmount(&self) {
        let driver = self.driver.lock().take();
        self.shared.set_state(SessionState::Closed);
        if let Some(driver) = driver {
            let _ = driver.cancel_tx.send(());
            if let Err(e) = driver.task.await {
                warn!("Session driver ended abnormally: {}", e);
            }
        }
    }

    pub fn play(&self) -> Result<(), SessionError> {
        self.control(HostControl::Play)
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.control(HostControl::Pause)
    }

    pub fn toggle_playback(&self) -> Result<(), SessionError> {
        self.control(HostControl::Toggle)
    }

    pub fn seek(&self, to: f64) -> Result<(), SessionError> {
        self.control(HostControl::Seek(to))
    }

    /// Apply a host control locally and broadcast it
    pub fn control(&self, control: HostControl) -> Result<(), SessionError> {
        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        if !self.role().is_some_and(|r| r.is_host()) {
            return Err(SessionError::NotHost);
        }
        self.send(SessionCommand::Control(control))
    }

    /// Forward a video element event. Ignored unless connected as host.
    pub fn player_event(&self, event: PlayerEvent) {
        let delivered = self.role().is_some_and(|r| r.is_host())
            && self.send(SessionCommand::Player(event)).is_ok();
        if !delivered {
            debug!("Ignoring player event {:?}", event);
        }
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        let slot = self.driver.lock();
        match (slot.as_ref(), self.state()) {
            (Some(driver), SessionState::Connected) => driver
                .command_tx
                .send(command)
                .map_err(|_| SessionError::NotConnected),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn connect_failed(&self, error: HubError) -> SessionError {
        warn!("Error connecting to hub: {}", error);
        // Stays Closed if unmounted meanwhile
        self.shared.transition(SessionState::Connecting, SessionState::Disconnected);
        self.shared.report(SyncError::Connection(error.clone()));
        SessionError::Connection(error)
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        // The driver closes the connection on its way out
        if let Some(driver) = self.driver.get_mut().take() {
            let _ = driver.cancel_tx.send(());
        }
    }
}

async fn stop(connection: &dyn HubConnection) {
    if let Err(e) = connection.stop().await {
        warn!("Error stopping connection: {}", e);
    }
}

/// Owns everything a running session mutates
struct SessionDriver {
    role: Role,
    connection: Box<dyn HubConnection>,
    player: Arc<dyn Player>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    guard: FeedbackGuard,
    reconciler: FollowerReconciler,
    /// Present only for the host
    broadcaster: Option<HostBroadcaster>,
    echo_expected: bool,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut subscription: Subscription,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut heartbeat = self.broadcaster.as_ref().map(|b| {
            let period = b.heartbeat_interval();
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        if self.role.is_host() {
            info!("Host broadcast loop started");
        }

        loop {
            let trailing = self
                .broadcaster
                .as_ref()
                .and_then(HostBroadcaster::trailing_deadline);

            tokio::select! {
                biased;

                _ = &mut cancel_rx => {
                    info!("Session teardown requested");
                    break;
                }

                event = subscription.recv() => match event {
                    Some(event) => self.on_update(event),
                    None => {
                        warn!("Hub dropped the playback subscription");
                        self.shared.report(SyncError::Connection(HubError::Closed));
                        break;
                    }
                },

                Some(command) = command_rx.recv() => {
                    if self.on_command(command) {
                        reset(&mut heartbeat);
                    }
                }

                _ = tick(&mut heartbeat), if heartbeat.is_some() => {
                    self.broadcast(false);
                }

                _ = sleep_until(trailing), if trailing.is_some() => {
                    let owed = self
                        .broadcaster
                        .as_mut()
                        .is_some_and(HostBroadcaster::on_trailing_deadline);
                    if owed {
                        self.broadcast(true);
                        reset(&mut heartbeat);
                    }
                }
            }
        }

        // Timers are dropped with this frame; nothing fires after teardown
        drop(heartbeat);
        drop(subscription);

        stop(self.connection.as_ref()).await;
        self.shared.set_state(SessionState::Closed);
        info!("Session closed");
    }

    fn on_update(&mut self, event: PlaybackUpdated) {
        if !self.echo_expected && self.is_own_echo(&event) {
            // Logged once per session
            if !self.shared.unexpected_echo.swap(true, Ordering::Relaxed) {
                warn!("Hub echoed a broadcast back to the host although no echo was expected");
            }
        }

        let now_ms = self.clock.now_ms();
        let observed = self.reconciler.resolve(event, now_ms);

        let outcome = self.reconciler.handle(
            observed,
            self.player.as_ref(),
            &mut self.guard,
            Instant::now(),
            now_ms,
        );

        match outcome {
            Reconciled::Applied(_) => self.publish_host_view(),
            Reconciled::Failed(_, e) => {
                self.publish_host_view();
                self.shared.report(SyncError::PlaybackApply(e));
            }
            Reconciled::Suppressed | Reconciled::Stale => {}
        }
    }

    fn is_own_echo(&self, event: &PlaybackUpdated) -> bool {
        match (&self.broadcaster, event.origin_ms) {
            (Some(broadcaster), Some(origin_ms)) => broadcaster.sent_origin(origin_ms),
            _ => false,
        }
    }

    fn publish_host_view(&self) {
        if let Some(view) = self.reconciler.host_view().copied() {
            *self.shared.host_view.write() = Some(view);
            if let Some(observer) = &self.shared.observer {
                observer.on_host_state(view);
            }
        }
    }

    /// Returns true when an action broadcast went out (heartbeat should restart)
    fn on_command(&mut self, command: SessionCommand) -> bool {
        if !self.role.is_host() {
            return false;
        }

        let now = Instant::now();
        let trigger = match command {
            SessionCommand::Control(control) => {
                self.guard.arm(now);
                if let Err(e) = self.apply_control(control) {
                    warn!("Player refused {:?}: {}", control, e);
                    self.shared.report(SyncError::PlaybackApply(e));
                    return false;
                }
                HostTrigger::Action
            }
            SessionCommand::Player(event) => match event {
                PlayerEvent::Played | PlayerEvent::Paused | PlayerEvent::Seeked(_) => {
                    self.guard.arm(now);
                    HostTrigger::Action
                }
                PlayerEvent::Seeking(_) => {
                    self.guard.arm(now);
                    HostTrigger::Scrub
                }
                PlayerEvent::TimeUpdate(_) => HostTrigger::TimeUpdate,
            },
        };

        let send = self
            .broadcaster
            .as_mut()
            .is_some_and(|b| b.on_trigger(trigger, now));
        if send {
            self.broadcast(trigger != HostTrigger::TimeUpdate);
        }
        send
    }

    fn apply_control(&self, control: HostControl) -> Result<(), crate::error::PlayerError> {
        match control {
            HostControl::Play => self.player.play(),
            HostControl::Pause => self.player.pause(),
            HostControl::Toggle => {
                if self.player.is_playing() {
                    self.player.pause()
                } else {
                    self.player.play()
                }
            }
            HostControl::Seek(to) => self.player.seek(to),
        }
    }

    /// Invoke `SyncPlayback` without waiting for the result
    fn broadcast(&mut self, from_action: bool) {
        let Some(broadcaster) = self.broadcaster.as_mut() else {
            return;
        };

        let now = Instant::now();
        let call = broadcaster.compose(self.player.as_ref(), now, self.clock.now_ms());
        // Our own echo of this or any earlier broadcast is never newer
        self.reconciler.note_origin(call.state.origin_ms);
        let invoke = self.connection.invoke(call);

        if from_action {
            self.guard.arm(Instant::now());
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = invoke.await {
                warn!("Error invoking SyncPlayback: {}", e);
                shared.report(SyncError::Broadcast(e));
            }
        });
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

fn reset(heartbeat: &mut Option<Interval>) {
    if let Some(interval) = heartbeat {
        interval.reset();
    }
}
