//! Connect failures, write ordering, close semantics.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use muxio::{Connect, Event, Listen, Status};

mod util;

/// A loopback port with nothing listening on it.
fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[test]
fn refused_connect_reports_not_connected() {
    let mut reactor = util::reactor();
    let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let seen = Rc::clone(&events);
    reactor
        .connect(
            Connect::new("127.0.0.1", dead_port()),
            move |_, _, event| {
                let tag = match event {
                    Event::Connected => "connected".to_string(),
                    Event::NotConnected(err) => format!("notconnected({:?})", err.map(|e| e.kind())),
                    other => format!("{:?}", other),
                };
                seen.borrow_mut().push(tag);
            },
        )
        .expect("connect failed to start");

    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        !events.borrow().is_empty()
    });

    let events = events.borrow();
    assert!(
        events[0].starts_with("notconnected"),
        "expected NotConnected first, got {:?}",
        *events
    );
    assert!(!events.iter().any(|event| event == "connected"));
}

#[test]
fn sends_preserve_order() {
    let mut reactor = util::reactor();

    let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let listener = reactor
        .listen(Listen::new("127.0.0.1", 0), move |reactor, _listener, event| {
            if let Event::Accept(client) = event {
                let sink = Rc::clone(&sink);
                reactor.set_callback(client, move |_, _, event| {
                    if let Event::Data(data) = event {
                        sink.borrow_mut().extend_from_slice(data);
                    }
                });
            }
        })
        .expect("listen failed");
    let addr = reactor.local_addr(listener).unwrap();

    reactor
        .connect(
            Connect::new(addr.ip().to_string(), addr.port()),
            |reactor, client, event| {
                if let Event::Connected = event {
                    reactor.write(client, "X");
                    reactor.write(client, "Y");
                }
            },
        )
        .expect("connect failed");

    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        received.borrow().len() >= 2
    });
    assert_eq!(*received.borrow(), b"XY".to_vec());
}

#[test]
fn close_is_idempotent() {
    let mut reactor = util::reactor();
    let listener = reactor
        .listen(Listen::new("127.0.0.1", 0), |_, _, _| {})
        .expect("listen failed");

    reactor.close(listener);
    assert_eq!(reactor.status(listener), Status::Closed);
    // Second close is a logged warning, nothing else.
    reactor.close(listener);
    assert_eq!(reactor.status(listener), Status::Closed);
}

#[test]
fn close_during_callback_keeps_handle_harmless() {
    let mut reactor = util::reactor();
    let addr = {
        let listener = reactor
            .listen(Listen::new("127.0.0.1", 0), |reactor, _listener, event| {
                if let Event::Accept(client) = event {
                    reactor.send(client, b"burst\n");
                }
            })
            .expect("listen failed");
        reactor.local_addr(listener).unwrap()
    };

    let captured: Rc<RefCell<Option<muxio::Socket>>> = Rc::new(RefCell::new(None));
    let closed_in_callback = Rc::new(RefCell::new(false));

    let capture = Rc::clone(&captured);
    let flag = Rc::clone(&closed_in_callback);
    reactor
        .connect(
            Connect::new(addr.ip().to_string(), addr.port()),
            move |reactor, client, event| {
                if let Event::Data(_) = event {
                    // Close the socket we are being dispatched on, then use
                    // the handle again within the same callback.
                    reactor.close(client);
                    reactor.send(client, b"after close");
                    reactor.write(client, "still after close");
                    *capture.borrow_mut() = Some(client);
                    *flag.borrow_mut() = true;
                }
            },
        )
        .expect("connect failed");

    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        *closed_in_callback.borrow()
    });

    let client = captured.borrow().unwrap();
    assert_eq!(reactor.status(client), Status::Closed);

    // The handle stays harmless for the rest of the grace window and after
    // reclamation.
    reactor.send(client, b"later");
    util::run_for(&mut reactor, Duration::from_millis(120));
    reactor.send(client, b"after reclamation");
    assert_eq!(reactor.status(client), Status::Closed);
}

#[test]
fn socket_limit_is_enforced() {
    let mut reactor = util::reactor_with(
        muxio::Config::new()
            .max_sockets(1)
            .dns(muxio::DnsMode::Threaded),
    );
    let _first = reactor
        .listen(Listen::new("127.0.0.1", 0), |_, _, _| {})
        .expect("first listen failed");
    let err = reactor
        .listen(Listen::new("127.0.0.1", 0), |_, _, _| {})
        .expect_err("second listen should exceed the limit");
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}
