//! TLS on both sides of the loop, with a self-signed certificate.

#![cfg(feature = "tls")]

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use muxio::{Connect, Event, Listen, Status, TlsClientOptions};

mod util;

struct TestCert {
    certfile: PathBuf,
    keyfile: PathBuf,
}

impl TestCert {
    fn generate() -> TestCert {
        let key = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("certificate generation failed");
        let dir = std::env::temp_dir();
        let tag = format!("muxio-tls-{}-{:?}", std::process::id(), std::thread::current().id());
        let certfile = dir.join(format!("{}-cert.pem", tag));
        let keyfile = dir.join(format!("{}-key.pem", tag));
        std::fs::File::create(&certfile)
            .unwrap()
            .write_all(key.cert.pem().as_bytes())
            .unwrap();
        std::fs::File::create(&keyfile)
            .unwrap()
            .write_all(key.key_pair.serialize_pem().as_bytes())
            .unwrap();
        TestCert { certfile, keyfile }
    }
}

impl Drop for TestCert {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.certfile);
        let _ = std::fs::remove_file(&self.keyfile);
    }
}

#[test]
fn tls_echo_round_trip() {
    let cert = TestCert::generate();
    let mut reactor = util::reactor();

    let listener = reactor
        .listen(
            Listen::new("127.0.0.1", 0).tls(&cert.certfile, &cert.keyfile),
            |reactor, _listener, event| {
                if let Event::Accept(client) = event {
                    reactor.set_callback(client, |reactor, client, event| {
                        if let Event::Data(data) = event {
                            let reply = data.to_vec();
                            reactor.send(client, &reply);
                        }
                    });
                }
            },
        )
        .expect("tls listen failed");
    let addr = reactor.local_addr(listener).unwrap();

    let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let saw_connected = Rc::new(RefCell::new(false));

    let sink = Rc::clone(&received);
    let connected = Rc::clone(&saw_connected);
    let client = reactor
        .connect(
            Connect::new(addr.ip().to_string(), addr.port()).tls(
                TlsClientOptions::new()
                    .add_root_pem_file(&cert.certfile)
                    .server_name("localhost"),
            ),
            move |reactor, client, event| match event {
                Event::Connected => {
                    *connected.borrow_mut() = true;
                    reactor.send(client, b"ping");
                }
                Event::Data(data) => sink.borrow_mut().extend_from_slice(data),
                Event::NotConnected(err) => panic!("tls connect failed: {:?}", err),
                _ => {}
            },
        )
        .expect("tls connect failed to start");

    util::run_until(&mut reactor, Duration::from_secs(10), |_| {
        received.borrow().len() >= 4
    });

    assert!(*saw_connected.borrow());
    assert_eq!(*received.borrow(), b"ping".to_vec());
    assert_eq!(reactor.status(client), Status::Connected);
    reactor.close(client);
}

#[test]
fn tls_client_without_trust_is_rejected() {
    let cert = TestCert::generate();
    let mut reactor = util::reactor();

    let listener = reactor
        .listen(
            Listen::new("127.0.0.1", 0).tls(&cert.certfile, &cert.keyfile),
            |_, _, _| {},
        )
        .expect("tls listen failed");
    let addr = reactor.local_addr(listener).unwrap();

    let failed = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&failed);
    reactor
        .connect(
            // No roots configured: verification must fail.
            Connect::new(addr.ip().to_string(), addr.port())
                .tls(TlsClientOptions::new().server_name("localhost")),
            move |_, _, event| match event {
                Event::NotConnected(_) => *flag.borrow_mut() = true,
                Event::Connected => panic!("handshake unexpectedly succeeded"),
                _ => {}
            },
        )
        .expect("tls connect failed to start");

    util::run_until(&mut reactor, Duration::from_secs(10), |_| {
        *failed.borrow()
    });
}

#[test]
fn tls_insecure_mode_skips_verification() {
    let cert = TestCert::generate();
    let mut reactor = util::reactor();

    let listener = reactor
        .listen(
            Listen::new("127.0.0.1", 0).tls(&cert.certfile, &cert.keyfile),
            |_, _, _| {},
        )
        .expect("tls listen failed");
    let addr = reactor.local_addr(listener).unwrap();

    let connected = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&connected);
    reactor
        .connect(
            Connect::new(addr.ip().to_string(), addr.port()).tls(
                TlsClientOptions::new()
                    .danger_accept_invalid_certs(true)
                    .server_name("localhost"),
            ),
            move |_, _, event| match event {
                Event::Connected => *flag.borrow_mut() = true,
                Event::NotConnected(err) => panic!("tls connect failed: {:?}", err),
                _ => {}
            },
        )
        .expect("tls connect failed to start");

    util::run_until(&mut reactor, Duration::from_secs(10), |_| {
        *connected.borrow()
    });
}
