//! Scripted watch session: one host driving playback, followers with skewed clocks

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tracing::{info, warn};

use watchsync_core::clock::{Clock, ManualClock, SystemClock};
use watchsync_core::config::Credential;
use watchsync_core::error::{SessionError, SyncError};
use watchsync_core::player::SimulatedPlayer;
use watchsync_core::{
    HubConnector, LocalHub, Player, PlayerEvent, SessionConfig, SessionObserver, SyncSession,
};

use crate::metrics::Metrics;
use crate::Options;

const HOST: &str = "host";
const TICK_MS: u64 = 250;

/// Something the host does at a point in the script
#[derive(Debug, Clone, Copy)]
enum Step {
    Play,
    Pause,
    Toggle,
    Seek(f64),
    Scrub(f64),
    ScrubDone(f64),
}

/// Host actions keyed by milliseconds since start
const SCRIPT: &[(u64, Step)] = &[
    (0, Step::Play),
    (4_000, Step::Seek(120.0)),
    (7_000, Step::Pause),
    (9_000, Step::Play),
    (12_000, Step::Scrub(200.0)),
    (12_250, Step::Scrub(210.0)),
    (12_500, Step::Scrub(220.0)),
    (12_750, Step::ScrubDone(225.0)),
    (15_000, Step::Toggle),
    (16_000, Step::Toggle),
];

struct ErrorCounter {
    metrics: Arc<RwLock<Metrics>>,
}

impl SessionObserver for ErrorCounter {
    fn on_error(&self, error: SyncError) {
        warn!("Session error: {}", error);
        self.metrics.write().errors += 1;
    }
}

struct Viewer {
    session: SyncSession,
    player: Arc<SimulatedPlayer>,
}

fn config(identity: &str) -> SessionConfig {
    SessionConfig::new(identity, HOST, Credential::new("sim-token"))
}

pub async fn run(options: &Options, metrics: Arc<RwLock<Metrics>>) -> Result<(), SessionError> {
    run_with_clock(options, metrics, Arc::new(SystemClock), None).await
}

/// Run the script. A `manual` clock is stepped one tick at a time alongside the ticker.
async fn run_with_clock(
    options: &Options,
    metrics: Arc<RwLock<Metrics>>,
    clock: Arc<dyn Clock>,
    manual: Option<Arc<ManualClock>>,
) -> Result<(), SessionError> {
    let hub = LocalHub::with_latency(
        options.echo,
        Duration::from_millis(options.latency_ms),
        Duration::from_millis(options.jitter_ms),
    );
    let connector: Arc<dyn HubConnector> = Arc::new(hub.clone());
    let observer: Arc<dyn SessionObserver> = Arc::new(ErrorCounter {
        metrics: Arc::clone(&metrics),
    });

    info!(
        "Simulating {} followers: latency {}ms, jitter {}ms, echo {}",
        options.followers, options.latency_ms, options.jitter_ms, options.echo
    );

    let host = viewer(HOST, 1.0, 0.0, &connector, &clock, &observer);
    host.session.mount().await?;

    // Followers play slightly fast or slow and start out of position
    let skews: Vec<(f64, f64)> = {
        let mut rng = rand::thread_rng();
        (0..options.followers)
            .map(|_| {
                let rate = if options.skew > 0.0 {
                    rng.gen_range(1.0 - options.skew..1.0 + options.skew)
                } else {
                    1.0
                };
                (rate, rng.gen_range(0.0..5.0))
            })
            .collect()
    };

    let mut followers = Vec::with_capacity(skews.len());
    for (i, (rate, start)) in skews.into_iter().enumerate() {
        let identity = format!("guest-{}", i);
        let follower = viewer(&identity, rate, start, &connector, &clock, &observer);
        follower.session.mount().await?;
        info!("{} joined at {:.2}s, playback rate {:.3}", identity, start, rate);
        followers.push(follower);
    }

    let total_ms = options.duration_secs * 1000;
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));
    let mut elapsed_ms = 0;

    while elapsed_ms <= total_ms {
        ticker.tick().await;
        if let Some(manual) = &manual {
            if elapsed_ms > 0 {
                manual.advance_ms(TICK_MS);
            }
        }

        for (_, step) in SCRIPT.iter().filter(|(at, _)| *at == elapsed_ms) {
            info!("t={}ms host {:?}", elapsed_ms, step);
            if let Err(e) = perform(&host, *step) {
                warn!("Host step {:?} failed: {}", step, e);
            }
        }

        let host_position = host.player.current_position();
        let mut m = metrics.write();
        for (i, follower) in followers.iter().enumerate() {
            let drift = (follower.player.current_position() - host_position).abs();
            m.record_drift(i, drift);
        }
        drop(m);

        elapsed_ms += TICK_MS;
    }

    {
        let mut m = metrics.write();
        m.broadcasts = hub.invocations().len();
        for (i, follower) in followers.iter().enumerate() {
            if let Some(stats) = m.followers.get_mut(i) {
                stats.corrections = follower.player.calls().len();
            }
        }
    }

    futures::future::join_all(followers.iter().map(|f| f.session.unmount())).await;
    host.session.unmount().await;
    info!("Simulation finished, {} peers still connected", hub.connected_peers());

    Ok(())
}

fn viewer(
    identity: &str,
    rate: f64,
    start: f64,
    connector: &Arc<dyn HubConnector>,
    clock: &Arc<dyn Clock>,
    observer: &Arc<dyn SessionObserver>,
) -> Viewer {
    let player = Arc::new(SimulatedPlayer::with_rate(Arc::clone(clock), rate));
    player.place(start, false);
    let session = SyncSession::with_observer(
        config(identity),
        Arc::clone(connector),
        player.clone(),
        Some(Arc::clone(observer)),
    )
    .with_clock(Arc::clone(clock));
    Viewer { session, player }
}

fn perform(host: &Viewer, step: Step) -> Result<(), SessionError> {
    match step {
        Step::Play => host.session.play(),
        Step::Pause => host.session.pause(),
        Step::Toggle => host.session.toggle_playback(),
        Step::Seek(to) => host.session.seek(to),
        Step::Scrub(to) => {
            // The element moves first, then reports it
            host.player.place(to, host.player.is_playing());
            host.session.player_event(PlayerEvent::Seeking(to));
            Ok(())
        }
        Step::ScrubDone(to) => {
            host.player.place(to, host.player.is_playing());
            host.session.player_event(PlayerEvent::Seeked(to));
            Ok(())
        }
    }
}
