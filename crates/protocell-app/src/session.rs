//! One simulation per connected viewer.
//!
//! A [`Session`] owns its [`World`] outright. The ticker thread is the only
//! code that touches it: it drains the command bus, advances the world,
//! renders, and pushes frames onto the session's outbox. A separate sender
//! task drains the outbox into the socket, so the ticker never writes to the
//! transport.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use protocell_core::{SimConfig, SnapshotStore, World, WorldError, WorldSnapshot};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::command::{BusState, CommandReceiver, drain_pending_commands};
use crate::protocol::{ControlCommand, ErrorCode, SaveFrame, ServerFrame, StatusFrame};
use crate::registry::SessionId;
use crate::render::RenderFrame;

/// Builds the snapshot store each new or loaded world persists through.
pub type StoreFactory = Arc<dyn Fn() -> Box<dyn SnapshotStore> + Send + Sync>;

/// Everything needed to start a session's world.
#[derive(Clone)]
pub struct SessionSettings {
    pub config: SimConfig,
    pub store: StoreFactory,
}

impl SessionSettings {
    pub fn new(config: SimConfig, store: StoreFactory) -> Self {
        Self { config, store }
    }

    /// Sessions that never touch the disk.
    pub fn ephemeral(config: SimConfig) -> Self {
        Self::new(
            config,
            Arc::new(|| Box::new(protocell_core::NullStore) as Box<dyn SnapshotStore>),
        )
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub struct Session {
    id: SessionId,
    world: World,
    settings: SessionSettings,
    running: bool,
    max_speed: bool,
    outbox: UnboundedSender<String>,
    closed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("world", &self.world)
            .field("running", &self.running)
            .field("max_speed", &self.max_speed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates and populates a fresh world, then queues the opening status.
    pub fn open(
        id: SessionId,
        settings: SessionSettings,
        outbox: UnboundedSender<String>,
    ) -> Result<Self, WorldError> {
        let mut world = World::with_store(settings.config.clone(), (settings.store)())?;
        world.populate();
        let mut session = Self {
            id,
            world,
            settings,
            running: true,
            max_speed: false,
            outbox,
            closed: false,
        };
        session.queue_status(None);
        Ok(session)
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn is_max_speed(&self) -> bool {
        self.max_speed
    }

    /// The outbox receiver is gone, so nobody is listening any more.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Frames are paced unless the world is running flat out.
    #[must_use]
    pub const fn is_paced(&self) -> bool {
        !(self.running && self.max_speed)
    }

    #[must_use]
    pub fn frame_time(&self) -> Duration {
        self.settings.config.frame_time()
    }

    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start => {
                self.running = true;
                self.queue_status(None);
            }
            ControlCommand::Stop => {
                self.running = false;
                self.queue_status(None);
            }
            ControlCommand::Speed { max_speed } => {
                if let Some(max_speed) = max_speed {
                    self.max_speed = max_speed;
                }
                self.queue_status(None);
            }
            ControlCommand::Save => {
                let frame = ServerFrame::Save(SaveFrame::new(self.world.to_snapshot()));
                self.queue_frame(&frame);
            }
            ControlCommand::Load { state: None } => {
                warn!(session = %self.id, "load requested without a state");
                self.queue_status(Some(ErrorCode::InvalidState));
            }
            ControlCommand::Load { state: Some(state) } => self.load(*state),
        }
    }

    fn load(&mut self, state: serde_json::Value) {
        let world = serde_json::from_value::<WorldSnapshot>(state)
            .map_err(|err| err.to_string())
            .and_then(|snapshot| {
                World::from_snapshot(
                    snapshot,
                    self.settings.config.clone(),
                    (self.settings.store)(),
                )
                .map_err(|err| err.to_string())
            });
        match world {
            Ok(world) => {
                info!(
                    session = %self.id,
                    identity = world.identity(),
                    tick = world.tick().0,
                    "world loaded"
                );
                self.world = world;
                self.running = true;
                let status = StatusFrame {
                    running: true,
                    max_speed: self.max_speed,
                    error: None,
                    loaded_tick: Some(self.world.tick()),
                };
                self.queue_frame(&ServerFrame::Status(status));
                self.queue_render();
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "rejected submitted world state");
                self.queue_status(Some(ErrorCode::LoadFailed));
            }
        }
    }

    /// Advances the world when running, then renders unless running at max speed.
    pub fn run_frame(&mut self) {
        if self.running {
            match self.world.update() {
                Ok(events) => {
                    if let Some(tick) = events.restored_from {
                        info!(session = %self.id, tick = tick.0, "session world recovered");
                    }
                }
                Err(err) => {
                    error!(session = %self.id, error = %err, "world tick failed");
                    self.queue_status(Some(ErrorCode::PersistFailed));
                }
            }
        }
        if self.is_paced() {
            self.queue_render();
        }
    }

    fn queue_status(&mut self, error: Option<ErrorCode>) {
        let status = StatusFrame {
            running: self.running,
            max_speed: self.max_speed,
            error,
            loaded_tick: None,
        };
        self.queue_frame(&ServerFrame::Status(status));
    }

    fn queue_frame(&mut self, frame: &ServerFrame) {
        match frame.to_json() {
            Ok(text) => self.enqueue(text),
            Err(err) => error!(session = %self.id, error = %err, "failed to encode frame"),
        }
    }

    fn queue_render(&mut self) {
        match RenderFrame::capture(&self.world).to_json() {
            Ok(text) => self.enqueue(text),
            Err(err) => {
                error!(session = %self.id, error = %err, "failed to encode render frame");
            }
        }
    }

    fn enqueue(&mut self, text: String) {
        if self.outbox.send(text).is_err() {
            self.closed = true;
        }
    }
}

/// Drives `session` until it is cancelled, its command bus disconnects, or
/// its outbox closes. Blocks the calling thread.
pub fn run_ticker(mut session: Session, commands: CommandReceiver, cancel: Arc<AtomicBool>) {
    let frame_time = session.frame_time();
    info!(
        session = %session.id(),
        identity = session.world().identity(),
        "session ticker started"
    );
    loop {
        if cancel.load(Ordering::Acquire) {
            debug!(session = %session.id(), "session cancelled");
            break;
        }
        let started = Instant::now();
        if drain_pending_commands(&commands, &mut session) == BusState::Disconnected {
            debug!(session = %session.id(), "command bus disconnected");
            break;
        }
        session.run_frame();
        if session.is_closed() {
            debug!(session = %session.id(), "outbox closed");
            break;
        }
        if session.is_paced()
            && let Some(remaining) = frame_time.checked_sub(started.elapsed())
        {
            std::thread::sleep(remaining);
        }
    }
    info!(session = %session.id(), tick = session.world().tick().0, "session ticker stopped");
}

/// Builds the session world on the calling thread, then hands it to
/// [`run_ticker`]. Blocks the calling thread.
pub fn open_and_run(
    id: SessionId,
    settings: SessionSettings,
    outbox: UnboundedSender<String>,
    commands: CommandReceiver,
    cancel: Arc<AtomicBool>,
) -> Result<(), WorldError> {
    let session = Session::open(id, settings, outbox)?;
    run_ticker(session, commands, cancel);
    Ok(())
}
