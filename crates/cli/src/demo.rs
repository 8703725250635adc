//! Two endpoints sharing an in-memory call
//!
//! Both phones are driven through their lifecycle controller exactly as the
//! device would drive them (plugged in, foreground), then a scripted sequence
//! of presence detections and microphone buffers is played on each.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{Table, Tabled};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use voicebox_presence_core::{
    LifecycleController, LifecyclePolicy, LifecycleSignal, LoopbackHub, PresenceBridge,
    ScenePhase, SessionConfig, SessionEvent, SessionManager, WatchPresenceSource,
};

use crate::config::CliConfig;

const DEMO_CALL_ID: &str = "voicebox-demo";
const BUFFER_LEN: usize = 480;

#[derive(Debug, Clone, Args)]
pub struct DemoArgs {
    /// Number of scripted detection rounds
    #[arg(long, default_value_t = 6)]
    pub rounds: u32,

    /// Delay between rounds in milliseconds
    #[arg(long, default_value_t = 300)]
    pub interval_ms: u64,

    /// Only keep the call while charging
    #[arg(long)]
    pub require_charging: bool,

    /// Unplug the first phone after this round
    #[arg(long)]
    pub unplug_after: Option<u32>,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self { rounds: 6, interval_ms: 300, require_charging: false, unplug_after: None }
    }
}

/// One line of the status table
#[derive(Debug, Clone, Tabled)]
pub struct EndpointRow {
    pub endpoint: String,
    pub state: String,
    pub participants: usize,
    pub here: bool,
    pub peer: bool,
    pub live: bool,
    pub mic: String,
    pub error: String,
}

struct Endpoint {
    name: &'static str,
    manager: Arc<SessionManager>,
    camera: Arc<WatchPresenceSource>,
    controller: LifecycleController,
    _bridge: PresenceBridge,
    events: JoinHandle<()>,
}

impl Endpoint {
    fn new(
        name: &'static str,
        config: SessionConfig,
        hub: &LoopbackHub,
        policy: LifecyclePolicy,
    ) -> Result<Self> {
        let manager = SessionManager::builder().config(config).transport(Arc::new(hub.clone())).build()?;
        let camera = Arc::new(WatchPresenceSource::new());
        let bridge = PresenceBridge::attach(camera.as_ref(), manager.clone());
        let controller =
            LifecycleController::new(manager.clone(), policy).with_presence_source(camera.clone());
        let events = tokio::spawn(print_events(name, manager.subscribe()));

        Ok(Self { name, manager, camera, controller, _bridge: bridge, events })
    }

    async fn signal(&self, signal: LifecycleSignal) {
        debug!(endpoint = self.name, ?signal, "Lifecycle signal");
        self.controller.handle(signal).await;
    }

    fn row(&self) -> EndpointRow {
        let snapshot = self.manager.snapshot();
        EndpointRow {
            endpoint: self.name.to_string(),
            state: snapshot.state.to_string(),
            participants: snapshot.participant_count,
            here: snapshot.presence.local,
            peer: snapshot.presence.remote,
            live: snapshot.is_live,
            mic: format!("{:.2}", snapshot.mic_level),
            error: snapshot.last_error.unwrap_or_default(),
        }
    }
}

async fn print_events(name: &'static str, mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged { new, .. }) => {
                println!("{} state -> {}", format!("[{name}]").cyan(), new.to_string().bold());
            }
            Ok(SessionEvent::RemotePresenceChanged { present }) => {
                let line = if present { "peer is here".green() } else { "peer left".yellow() };
                println!("{} {line}", format!("[{name}]").cyan());
            }
            Ok(SessionEvent::Error { error }) => {
                println!("{} {}", format!("[{name}]").cyan(), error.to_string().red());
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(endpoint = name, missed, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// A microphone buffer whose loudness varies with the round
fn tone(round: u32) -> Vec<f32> {
    let amplitude = 0.05 * (round % 5) as f32;
    (0..BUFFER_LEN)
        .map(|i| amplitude * (TAU * 440.0 * i as f32 / 48_000.0).sin())
        .collect()
}

pub fn print_table(title: &str, rows: &[EndpointRow]) {
    println!("\n{}", title.bold());
    println!("{}", Table::new(rows));
}

/// Run the demo and return the final status of both endpoints
pub async fn run(config: &CliConfig, args: &DemoArgs) -> Result<Vec<EndpointRow>> {
    let hub = LoopbackHub::new();

    let mut base = config.session.clone();
    if base.call_id.is_empty() {
        base = base.with_call_id(DEMO_CALL_ID);
    }
    let policy = if args.require_charging {
        config.lifecycle.with_require_charging(true)
    } else {
        config.lifecycle
    };

    let phones = [
        Endpoint::new("phone-a", base.clone().with_user("1", "demo-token-1"), &hub, policy)?,
        Endpoint::new("phone-b", base.with_user("2", "demo-token-2"), &hub, policy)?,
    ];
    info!(call_id = %phones[0].manager.config().call_id, rounds = args.rounds, "Starting demo");

    for phone in &phones {
        phone.signal(LifecycleSignal::Charging(true)).await;
        phone.signal(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    for round in 0..args.rounds {
        ticker.tick().await;

        phones[0].camera.report(round % 2 == 0);
        phones[1].camera.report(round % 3 == 0);
        for phone in &phones {
            phone.manager.report_input_samples(&tone(round));
        }

        if args.unplug_after == Some(round) {
            println!("{} unplugged", "[phone-a]".cyan());
            phones[0].signal(LifecycleSignal::Charging(false)).await;
        }
    }
    ticker.tick().await;

    let rows: Vec<_> = phones.iter().map(Endpoint::row).collect();
    print_table("In call", &rows);

    for phone in &phones {
        phone.signal(LifecycleSignal::ScenePhase(ScenePhase::Background)).await;
    }
    let rows: Vec<_> = phones.iter().map(Endpoint::row).collect();

    for phone in &phones {
        phone.events.abort();
    }
    Ok(rows)
}
