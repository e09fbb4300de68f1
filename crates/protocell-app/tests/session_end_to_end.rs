use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use protocell_app::{
    AppState, ControlCommand, Session, SessionId, SessionSettings, create_command_bus,
    open_and_run, router, run_ticker, submit_command,
};
use protocell_core::SimConfig;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

fn fast_config() -> SimConfig {
    SimConfig {
        world_width: 12,
        world_height: 12,
        initial_cells: 6,
        auto_save: false,
        rng_seed: Some(404),
        fps: 500,
        ..SimConfig::default()
    }
}

fn next_frame(frames: &mut UnboundedReceiver<String>, wanted: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..10_000 {
        let text = frames.blocking_recv().expect("outbox closed early");
        let frame: Value = serde_json::from_str(&text).expect("json frame");
        if wanted(&frame) {
            return frame;
        }
    }
    panic!("expected frame never arrived");
}

fn is_render(frame: &Value) -> bool {
    frame.get("type").is_none()
}

fn is_status(frame: &Value) -> bool {
    frame["type"] == "status"
}

#[test]
fn ticker_streams_frames_and_obeys_controls() {
    let (outbox, mut frames) = unbounded_channel();
    let session = Session::open(
        SessionId::new(1),
        SessionSettings::ephemeral(fast_config()),
        outbox,
    )
    .expect("session");
    let (commands, receiver) = create_command_bus(8);
    let cancel = Arc::new(AtomicBool::new(false));
    let ticker = thread::spawn({
        let cancel = Arc::clone(&cancel);
        move || run_ticker(session, receiver, cancel)
    });

    let opening = next_frame(&mut frames, is_status);
    assert_eq!(opening["running"], true);
    let render = next_frame(&mut frames, is_render);
    assert!(render["tick"].as_u64().is_some_and(|tick| tick >= 1));
    assert_eq!(render["environment"]["grid"]["width"], 12);

    assert!(submit_command(&commands, ControlCommand::Stop));
    let stopped = next_frame(&mut frames, is_status);
    assert_eq!(stopped["running"], false);
    let frozen = next_frame(&mut frames, is_render)["tick"].clone();
    for _ in 0..3 {
        assert_eq!(next_frame(&mut frames, is_render)["tick"], frozen);
    }

    assert!(submit_command(&commands, ControlCommand::Load { state: None }));
    let rejected = next_frame(&mut frames, is_status);
    assert_eq!(rejected["error"], "invalid_state");
    assert_eq!(rejected["running"], false);
    assert_eq!(next_frame(&mut frames, is_render)["tick"], frozen);

    assert!(submit_command(&commands, ControlCommand::Save));
    let saved = next_frame(&mut frames, |frame| frame["type"] == "save");
    assert_eq!(saved["state"]["tick"], frozen);
    assert_eq!(
        saved["filename"],
        format!("world_state_tick_{}.json", frozen.as_u64().expect("tick"))
    );

    cancel.store(true, Ordering::Release);
    ticker.join().expect("ticker thread");
}

#[test]
fn ticker_stops_when_the_bus_disconnects() {
    let (outbox, _frames) = unbounded_channel();
    let (commands, receiver) = create_command_bus(8);
    let ticker = thread::spawn(move || {
        open_and_run(
            SessionId::new(2),
            SessionSettings::ephemeral(fast_config()),
            outbox,
            receiver,
            Arc::new(AtomicBool::new(false)),
        )
    });
    drop(commands);
    ticker
        .join()
        .expect("ticker thread")
        .expect("session world");
}

#[tokio::test]
async fn health_reports_active_sessions() {
    let state = AppState::new(SessionSettings::ephemeral(fast_config()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(axum::serve(listener, router(state)).into_future());

    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("response");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let body = response.split("\r\n\r\n").nth(1).expect("body");
    let value: Value = serde_json::from_str(body.trim()).expect("json body");
    assert_eq!(value["status"], "ok");
    assert_eq!(value["sessions"], 0);

    server.abort();
}
