//! Per-viewer protocell sessions streamed over WebSockets, plus the
//! headless runner behind the `protocell` binary.

pub mod command;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod runner;
pub mod server;
pub mod session;

pub use command::{CommandReceiver, CommandSender, create_command_bus, submit_command};
pub use protocol::{ClientMessage, ControlCommand, ErrorCode, ServerFrame, parse_client_message};
pub use registry::{SessionId, SessionRegistry};
pub use render::RenderFrame;
pub use runner::{HeadlessSummary, run_headless};
pub use server::{AppState, router, serve};
pub use session::{Session, SessionSettings, StoreFactory, open_and_run, run_ticker};
