use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TryRecvError, TrySendError, detect_backoff_cfg};
use tracing::{debug, warn};

use crate::protocol::ControlCommand;
use crate::session::Session;

pub type CommandSender = MAsyncTx<ControlCommand>;
pub type CommandReceiver = MRx<ControlCommand>;

/// Commands a socket may queue before further ones are dropped.
pub const COMMAND_CAPACITY: usize = 64;

/// State of the bus after a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Open,
    Disconnected,
}

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

/// Applies every queued command to `session` in arrival order.
pub fn drain_pending_commands(receiver: &CommandReceiver, session: &mut Session) -> BusState {
    loop {
        match receiver.try_recv() {
            Ok(command) => {
                debug!(session = %session.id(), ?command, "applying control command");
                session.apply(command);
            }
            Err(TryRecvError::Empty) => return BusState::Open,
            Err(TryRecvError::Disconnected) => return BusState::Disconnected,
        }
    }
}

/// Queues `command` without waiting. Returns `false` when it was dropped.
pub fn submit_command(sender: &CommandSender, command: ControlCommand) -> bool {
    match sender.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(cmd)) => {
            warn!(?cmd, "control command queue full; dropping command");
            false
        }
        Err(TrySendError::Disconnected(cmd)) => {
            warn!(?cmd, "control command queue disconnected");
            false
        }
    }
}
