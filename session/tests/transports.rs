//! Both transports against local stand-ins for the inference service.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tiny_http::{Header, Response, Server};

use rpsense_inference_api::{APIClient, ApiError};
use rpsense_session::{
    BatchMetadata, BatchTransport, Completion, Frame, FrameBatch, GameMode, Move, RoundContext, SessionInput,
    StreamTransport, Transport, TransportError, TransportEvent, TransportMessage, Winner,
};

const WAIT: Duration = Duration::from_secs(5);

fn context(round_id: u64, round_number: u32) -> RoundContext {
    RoundContext {
        round_id,
        mode: GameMode::Tournament,
        total_rounds: 3,
        round_number,
        player_id: "ana".into(),
    }
}

fn batch() -> FrameBatch {
    FrameBatch {
        frames: vec![
            Frame {
                image_data: vec![0xFF, 0xD8, 0xFF],
                capture_timestamp: 1100,
                sequence_index: 0,
            },
            Frame {
                image_data: vec![0xFF, 0xD8, 0xFE],
                capture_timestamp: 1200,
                sequence_index: 1,
            },
        ],
        metadata: BatchMetadata {
            mode: GameMode::Tournament,
            total_rounds: 3,
            round_number: 1,
            player_id: "ana".into(),
            player_score: 0,
            computer_score: 0,
        },
    }
}

fn next_message(inbox: &Receiver<SessionInput>) -> TransportMessage {
    match inbox.recv_timeout(WAIT).unwrap() {
        SessionInput::Transport(message) => message,
        other => panic!("unexpected input: {other:?}"),
    }
}

/// Serves one request, handing back the body it received.
fn serve_once(status: u16, body: Value) -> (String, thread::JoinHandle<String>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();

    let handle = thread::spawn(move || {
        let mut request = server.recv().unwrap();

        let mut received = String::new();
        request.as_reader().read_to_string(&mut received).unwrap();

        let response = Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
        request.respond(response).unwrap();

        received
    });

    (format!("http://127.0.0.1:{port}"), handle)
}

#[test]
fn batch_transport_delivers_the_normalized_verdict() {
    let (base_url, server) = serve_once(
        200,
        json!({
            "final_prediction": "rock",
            "confidence": 0.88,
            "detected_hand": true,
            "game_result": { "player_move": "rock", "computer_move": "scissors", "winner": "player" }
        }),
    );

    let mut transport = BatchTransport::new(APIClient::new(&base_url, WAIT));
    let (inbox_tx, inbox) = mpsc::channel();

    transport.begin_round(&context(7, 1), Completion::new(7, inbox_tx)).unwrap();
    transport.on_frame(&batch().frames[0]).unwrap();
    transport.submit(batch()).unwrap();

    let message = next_message(&inbox);
    assert_eq!(message.round_id, 7);

    match message.event {
        TransportEvent::Verdict(Ok(verdict)) => {
            assert_eq!(verdict.player_move, Move::Rock);
            assert_eq!(verdict.computer_move, Move::Scissors);
            assert_eq!(verdict.winner, Winner::Player);
            assert!(!verdict.is_fallback);
        },

        other => panic!("unexpected event: {other:?}"),
    }

    let body: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(body["frames"].as_array().unwrap().len(), 2);
    assert_eq!(body["frames"][0]["image"], "data:image/jpeg;base64,/9j/");
    assert_eq!(body["context"]["mode"], "tournament");
    assert_eq!(body["context"]["totalRounds"], 3);
}

#[test]
fn batch_transport_reports_server_errors() {
    let (base_url, server) = serve_once(500, json!({ "error": "model not loaded" }));

    let mut transport = BatchTransport::new(APIClient::new(&base_url, WAIT));
    let (inbox_tx, inbox) = mpsc::channel();

    transport.begin_round(&context(1, 1), Completion::new(1, inbox_tx)).unwrap();
    transport.submit(batch()).unwrap();

    match next_message(&inbox).event {
        TransportEvent::Verdict(Err(TransportError::Api(ApiError::Server { status, message }))) => {
            assert_eq!(status, 500);
            assert_eq!(message, "model not loaded");
        },

        other => panic!("unexpected event: {other:?}"),
    }

    server.join().unwrap();
}

#[test]
fn batch_transport_needs_a_round() {
    let mut transport = BatchTransport::new(APIClient::new("http://127.0.0.1:9", WAIT));

    assert!(matches!(transport.submit(batch()), Err(TransportError::NoActiveRound)));

    // An abandoned round can't be submitted either.
    let (inbox_tx, _inbox) = mpsc::channel();
    transport.begin_round(&context(1, 1), Completion::new(1, inbox_tx)).unwrap();
    transport.abandon();

    assert!(matches!(transport.submit(batch()), Err(TransportError::NoActiveRound)));
}

/// Reads one client message off the wire.
fn read_event(reader: &mut BufReader<TcpStream>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    serde_json::from_str(&line).unwrap()
}

fn write_event(stream: &mut TcpStream, event: Value) {
    let mut line = event.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).unwrap();
}

#[test]
fn stream_transport_streams_frames_and_relays_results() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        write_event(&mut stream, json!({ "event": "connected", "data": { "status": "ok" } }));

        let start = read_event(&mut reader);
        assert_eq!(start["event"], "start_game");
        assert_eq!(start["data"]["roundNumber"], 1);

        for index in 0..2 {
            let frame = read_event(&mut reader);
            assert_eq!(frame["event"], "frame");
            assert_eq!(frame["data"]["sequenceIndex"], index);
        }

        write_event(
            &mut stream,
            json!({ "event": "real_time_result", "data": { "status": "success", "prediction": "paper", "confidence": 0.6 } }),
        );

        let complete = read_event(&mut reader);
        assert_eq!(complete["event"], "capture_complete");
        assert_eq!(complete["data"]["totalFrames"], 2);
        assert_eq!(complete["data"]["timestamp"], 1200);

        write_event(
            &mut stream,
            json!({
                "event": "final_result",
                "data": {
                    "final_prediction": "paper",
                    "confidence": 0.75,
                    "detected_hand": true,
                    "game_result": { "player_move": "paper", "computer_move": "scissors", "winner": "computer" }
                }
            }),
        );
    });

    let mut transport = StreamTransport::new(addr, WAIT);
    let (inbox_tx, inbox) = mpsc::channel();

    transport.begin_round(&context(3, 1), Completion::new(3, inbox_tx)).unwrap();

    let frames = batch();
    for frame in &frames.frames {
        transport.on_frame(frame).unwrap();
    }

    match next_message(&inbox).event {
        TransportEvent::Live(live) => {
            assert_eq!(live.prediction, Move::Paper);
            assert!(live.detected_hand);
        },

        other => panic!("unexpected event: {other:?}"),
    }

    transport.submit(frames).unwrap();

    let message = next_message(&inbox);
    assert_eq!(message.round_id, 3);

    match message.event {
        TransportEvent::Verdict(Ok(verdict)) => {
            assert_eq!(verdict.player_move, Move::Paper);
            assert_eq!(verdict.winner, Winner::Computer);
        },

        other => panic!("unexpected event: {other:?}"),
    }

    server.join().unwrap();
    transport.shutdown();
}

#[test]
fn stream_transport_reports_lost_connections_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = thread::spawn(move || {
        // First connection: hang up right after the round starts.
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        assert_eq!(read_event(&mut reader)["event"], "start_game");
        drop(reader);
        drop(stream);

        // Second connection: the next round.
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let start = read_event(&mut reader);
        assert_eq!(start["event"], "start_game");
        assert_eq!(start["data"]["roundNumber"], 2);
    });

    let mut transport = StreamTransport::new(addr, WAIT);
    let (inbox_tx, inbox) = mpsc::channel();

    transport.begin_round(&context(1, 1), Completion::new(1, inbox_tx.clone())).unwrap();

    let message = next_message(&inbox);
    assert_eq!(message.round_id, 1);
    assert!(matches!(
        message.event,
        TransportEvent::Verdict(Err(TransportError::ConnectionLost))
    ));

    // The reader thread exits right after reporting the loss.
    let deadline = Instant::now() + WAIT;
    while transport.is_connected() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!transport.is_connected());

    transport.begin_round(&context(2, 2), Completion::new(2, inbox_tx)).unwrap();
    assert!(transport.is_connected());

    server.join().unwrap();
}

#[test]
fn stream_transport_fails_to_begin_without_a_server() {
    // Bind and drop to find a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().to_string();

    let mut transport = StreamTransport::new(addr, Duration::from_millis(500));
    let (inbox_tx, _inbox) = mpsc::channel();

    assert!(matches!(
        transport.begin_round(&context(1, 1), Completion::new(1, inbox_tx)),
        Err(TransportError::Api(ApiError::Connect { .. }))
    ));
    assert!(matches!(transport.on_frame(&batch().frames[0]), Err(TransportError::ConnectionLost)));
}

#[test]
fn stream_transport_drops_results_for_an_abandoned_round() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = thread::spawn(move || {
        // Round one: the client gives up before the answer is ready.
        let (mut first, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(first.try_clone().unwrap());
        assert_eq!(read_event(&mut reader)["event"], "start_game");
        assert_eq!(read_event(&mut reader)["event"], "stop_game");

        // The client hangs up after stopping the round.
        let mut rest = String::new();
        assert_eq!(reader.read_line(&mut rest).unwrap(), 0);

        // The slow answer for round one goes nowhere.
        let late = json!({
            "event": "final_result",
            "data": {
                "detected_hand": true,
                "game_result": { "player_move": "rock", "computer_move": "scissors", "winner": "player" }
            }
        });
        let mut line = late.to_string();
        line.push('\n');
        let _ = first.write_all(line.as_bytes());

        // Round two arrives on a fresh connection and gets its own answer.
        let (mut second, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(second.try_clone().unwrap());
        let start = read_event(&mut reader);
        assert_eq!(start["event"], "start_game");
        assert_eq!(start["data"]["roundNumber"], 2);

        write_event(
            &mut second,
            json!({
                "event": "final_result",
                "data": {
                    "detected_hand": true,
                    "game_result": { "player_move": "paper", "computer_move": "scissors", "winner": "computer" }
                }
            }),
        );
    });

    let mut transport = StreamTransport::new(addr, WAIT);
    let (inbox_tx, inbox) = mpsc::channel();

    transport.begin_round(&context(1, 1), Completion::new(1, inbox_tx.clone())).unwrap();
    transport.abandon();
    assert!(!transport.is_connected());

    transport.begin_round(&context(2, 2), Completion::new(2, inbox_tx)).unwrap();

    let message = next_message(&inbox);
    assert_eq!(message.round_id, 2);

    match message.event {
        TransportEvent::Verdict(Ok(verdict)) => {
            assert_eq!(verdict.player_move, Move::Paper);
            assert_eq!(verdict.winner, Winner::Computer);
        },

        other => panic!("unexpected event: {other:?}"),
    }

    server.join().unwrap();
    assert!(inbox.try_recv().is_err());
    transport.shutdown();
}
