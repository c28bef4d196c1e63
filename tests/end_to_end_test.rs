//! End-to-end tests against a real loopback control channel.
//!
//! Each test starts an [`Engine`] on an ephemeral port, wires a
//! [`Trampoline`] host into it, and talks to it the way an external
//! controller would: plain text lines over a std `TcpStream`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use calltap::{ArgValue, Config, Engine, EventRecord, Invocation, MethodDescriptor, Trampoline};

struct Observer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Observer {
    fn connect(engine: &Engine) -> Self {
        let stream = TcpStream::connect(engine.local_addr().unwrap()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\n").unwrap();
    }

    /// Read one `Event: ...` record up to its `---` terminator.
    fn next_event(&mut self) -> (String, HashMap<String, String>) {
        let mut name = None;
        let mut fields = HashMap::new();
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).unwrap();
            assert!(read > 0, "connection closed mid-record");
            let line = line.trim_end_matches('\n');
            if line == "---" {
                break;
            }
            let (key, value) = line.split_once(": ").unwrap();
            if key == "Event" && name.is_none() {
                name = Some(value.to_string());
            } else {
                fields.insert(key.to_string(), value.to_string());
            }
        }
        (name.unwrap(), fields)
    }

    /// Whether nothing arrives within `window`.
    fn is_quiet_for(&mut self, window: Duration) -> bool {
        self.reader.get_ref().set_read_timeout(Some(window)).unwrap();
        let mut line = String::new();
        let quiet = match self.reader.read_line(&mut line) {
            Err(e) => matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            Ok(_) => false,
        };
        self.reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        quiet
    }
}

fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn start_engine(timeout_ms: u64) -> (Engine, Arc<Trampoline>) {
    let config = Config {
        port: 0,
        interception_timeout_ms: timeout_ms,
        ..Config::default()
    };
    let engine = Engine::start(config).unwrap();
    let host = Arc::new(Trampoline::new());
    host.define(MethodDescriptor::new("Foo", "Bar"));
    host.define(MethodDescriptor::new("Foo", "Baz"));
    assert_eq!(engine.install(host.as_ref()).attached, 2);
    (engine, host)
}

/// Join an observer and register `method` for interception.
fn intercepting(engine: &Engine, method: &str) -> Observer {
    let mut observer = Observer::connect(engine);
    observer.send("START");
    observer.send(&format!("REGISTER_INTERCEPTOR:{method}"));
    wait_until(|| engine.is_sharing() && engine.interceptors().contains(method));
    observer
}

/// Call `Foo.Bar(1, "x")` on a background thread.
fn call_foo_bar(host: &Arc<Trampoline>) -> JoinHandle<(Invocation, bool, Duration)> {
    let host = Arc::clone(host);
    std::thread::spawn(move || {
        let started = Instant::now();
        let mut ran = false;
        let outcome = host.invoke(
            "Foo.Bar",
            Some("Foo"),
            vec![ArgValue::Int(1), ArgValue::from("x")],
            |args| {
                ran = true;
                Some(args[0].clone())
            },
        );
        (outcome, ran, started.elapsed())
    })
}

#[test]
fn test_controller_rewrites_arguments() {
    let (engine, host) = start_engine(5_000);
    let mut observer = intercepting(&engine, "Foo.Bar");

    let caller = call_foo_bar(&host);

    let (name, fields) = observer.next_event();
    assert_eq!(name, "Interceptor");
    assert_eq!(fields["Method"], "Bar");
    assert_eq!(fields["DeclaringType"], "Foo");
    assert_eq!(fields["Instance"], "Foo");
    assert_eq!(fields["Arguments"], "[1, x]");

    observer.send(r#"INTERCEPTION_RESULT:{"params":{"entries":[{"key":"arg0","value":"99"}]}}"#);

    let (outcome, ran, _) = caller.join().unwrap();
    assert!(ran);
    assert_eq!(
        outcome,
        Invocation::Completed {
            args: vec![ArgValue::Int(99), ArgValue::from("x")],
            result: Some(ArgValue::Int(99)),
        }
    );

    let (name, fields) = observer.next_event();
    assert_eq!(name, "MethodCall");
    assert_eq!(fields["Type"], "Postfix");
    assert_eq!(fields["Arguments"], "[99, x]");
    assert_eq!(fields["Result"], "99");
}

#[test]
fn test_unity_spelled_reply_is_accepted() {
    let (engine, host) = start_engine(5_000);
    let mut observer = intercepting(&engine, "Bar");

    let caller = call_foo_bar(&host);
    assert_eq!(observer.next_event().0, "Interceptor");
    observer.send(
        r#"INTERCEPTION_RESULT:{"mEvent":"Interceptor","mParams":{"mEntries":[{"mKey":"arg1","mValue":"y"}]}}"#,
    );

    let (outcome, _, _) = caller.join().unwrap();
    assert_eq!(
        outcome,
        Invocation::Completed {
            args: vec![ArgValue::Int(1), ArgValue::from("y")],
            result: Some(ArgValue::Int(1)),
        }
    );
}

#[test]
fn test_empty_reply_vetoes_call() {
    let (engine, host) = start_engine(5_000);
    let mut observer = intercepting(&engine, "Foo.Bar");

    let caller = call_foo_bar(&host);
    assert_eq!(observer.next_event().0, "Interceptor");
    observer.send("INTERCEPTION_RESULT:");

    let (outcome, ran, _) = caller.join().unwrap();
    assert_eq!(outcome, Invocation::Vetoed);
    assert!(!ran);

    let (name, fields) = observer.next_event();
    assert_eq!(name, "MethodCall");
    assert_eq!(fields["Method"], "Bar");
    assert_eq!(fields["Arguments"], "[1, x]");
    assert_eq!(fields["Result"], "void");
}

#[test]
fn test_silent_controller_fails_open_after_timeout() {
    let (engine, host) = start_engine(500);
    let mut observer = intercepting(&engine, "Foo.Bar");

    let caller = call_foo_bar(&host);
    let (name, fields) = observer.next_event();
    assert_eq!(name, "Interceptor");
    let expired = fields["Request"].clone();

    let (outcome, ran, elapsed) = caller.join().unwrap();
    assert!(ran);
    assert!(elapsed >= Duration::from_millis(500));
    assert_eq!(
        outcome,
        Invocation::Completed {
            args: vec![ArgValue::Int(1), ArgValue::from("x")],
            result: Some(ArgValue::Int(1)),
        }
    );
    assert_eq!(observer.next_event().0, "MethodCall");

    // A late reply never lands on a later round-trip.
    observer.send(&format!(
        r#"INTERCEPTION_RESULT:{{"request":{expired},"params":{{"arg0":"5"}}}}"#
    ));
    let caller = call_foo_bar(&host);
    assert_eq!(observer.next_event().0, "Interceptor");
    observer.send(r#"INTERCEPTION_RESULT:{"params":{"arg0":"7"}}"#);
    let (outcome, _, _) = caller.join().unwrap();
    assert!(matches!(
        outcome,
        Invocation::Completed { ref args, .. } if args[0] == ArgValue::Int(7)
    ));
}

#[test]
fn test_stale_request_id_is_ignored() {
    let (engine, host) = start_engine(5_000);
    let mut observer = intercepting(&engine, "Foo.Bar");

    let caller = call_foo_bar(&host);
    let (_, fields) = observer.next_event();
    let request: u64 = fields["Request"].parse().unwrap();

    observer.send(&format!(
        r#"INTERCEPTION_RESULT:{{"request":{},"params":{{"arg0":"5"}}}}"#,
        request + 100
    ));
    observer.send(&format!(
        r#"INTERCEPTION_RESULT:{{"request":{request},"params":{{"arg0":"6"}}}}"#
    ));

    let (outcome, _, _) = caller.join().unwrap();
    assert!(matches!(
        outcome,
        Invocation::Completed { ref args, .. } if args[0] == ArgValue::Int(6)
    ));
}

#[test]
fn test_unregistered_method_only_reports() {
    let (engine, host) = start_engine(5_000);
    let mut observer = intercepting(&engine, "Foo.Bar");
    observer.send("UNREGISTER_INTERCEPTOR:Foo.Bar");
    wait_until(|| engine.interceptors().is_empty());

    let (outcome, ran, elapsed) = call_foo_bar(&host).join().unwrap();
    assert!(ran);
    assert!(matches!(outcome, Invocation::Completed { .. }));
    assert!(elapsed < Duration::from_secs(1));

    let (name, fields) = observer.next_event();
    assert_eq!(name, "MethodCall");
    assert_eq!(fields["Method"], "Bar");
}

#[test]
fn test_broadcast_reaches_only_joined_observers() {
    let (engine, _host) = start_engine(5_000);
    let mut joined = Observer::connect(&engine);
    let mut idle = Observer::connect(&engine);

    joined.send("START");
    wait_until(|| engine.is_sharing());

    assert_eq!(engine.publish(&EventRecord::new("Ping").field("Seq", 1)), 1);
    let (name, fields) = joined.next_event();
    assert_eq!(name, "Ping");
    assert_eq!(fields["Seq"], "1");
    assert!(idle.is_quiet_for(Duration::from_millis(200)));

    idle.send("START");
    wait_until(|| engine.publish(&EventRecord::new("Probe")) == 2);
    assert_eq!(idle.next_event().0, "Probe");
}

#[test]
fn test_dropped_observer_stops_sharing() {
    let (engine, host) = start_engine(5_000);
    let observer = intercepting(&engine, "Foo.Bar");

    drop(observer);
    wait_until(|| !engine.is_sharing());

    // With nobody listening the registered method runs without blocking.
    let (outcome, ran, elapsed) = call_foo_bar(&host).join().unwrap();
    assert!(ran);
    assert!(matches!(outcome, Invocation::Completed { .. }));
    assert!(elapsed < Duration::from_secs(1));
}
