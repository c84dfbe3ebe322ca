//! Line echo over loopback: listener and client driven by one reactor.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use muxio::{Connect, Event, Listen, Reactor, Status};

mod util;

fn echo_listener(reactor: &mut Reactor) -> std::net::SocketAddr {
    let listener = reactor
        .listen(Listen::new("127.0.0.1", 0), |reactor, _listener, event| {
            if let Event::Accept(client) = event {
                reactor.parse_lines(client, b"\n", false);
                reactor.set_callback(client, |reactor, client, event| {
                    if let Event::Line(line) = event {
                        let mut reply = line.to_vec();
                        reply.push(b'\n');
                        reactor.send(client, &reply);
                    }
                });
            }
        })
        .expect("listen failed");
    reactor.local_addr(listener).expect("no listen address")
}

#[test]
fn echo_line_server() {
    let mut reactor = util::reactor();
    let addr = echo_listener(&mut reactor);

    let lines: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let client = {
        let lines = Rc::clone(&lines);
        let order = Rc::clone(&order);
        reactor
            .connect(
                Connect::new(addr.ip().to_string(), addr.port()),
                move |reactor, client, event| match event {
                    Event::Connected => {
                        order.borrow_mut().push("connected");
                        reactor.send(client, b"hello\nworld\n");
                    }
                    Event::Line(line) => {
                        order.borrow_mut().push("line");
                        lines.borrow_mut().push(line.to_vec());
                    }
                    Event::Closed(_) => order.borrow_mut().push("closed"),
                    _ => panic!("unexpected event: {:?}", event),
                },
            )
            .expect("connect failed")
    };
    reactor.parse_lines(client, b"\n", false);

    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        lines.borrow().len() >= 2
    });

    assert_eq!(
        *lines.borrow(),
        vec![b"hello".to_vec(), b"world".to_vec()]
    );
    // Connected strictly precedes data.
    assert_eq!(order.borrow()[0], "connected");
    assert_eq!(reactor.status(client), Status::Connected);

    reactor.close(client);
    assert_eq!(reactor.status(client), Status::Closed);
}

#[test]
fn parse_empty_lines_are_surfaced_on_request() {
    let mut reactor = util::reactor();

    let got: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
    let listener_got = Rc::clone(&got);
    let listener = reactor
        .listen(Listen::new("127.0.0.1", 0), move |reactor, _listener, event| {
            if let Event::Accept(client) = event {
                reactor.parse_lines(client, b"\r\n", true);
                let got = Rc::clone(&listener_got);
                reactor.set_callback(client, move |_, _, event| {
                    if let Event::Line(line) = event {
                        got.borrow_mut().push(line.to_vec());
                    }
                });
            }
        })
        .expect("listen failed");
    let addr = reactor.local_addr(listener).expect("no listen address");

    let client = reactor
        .connect(
            Connect::new(addr.ip().to_string(), addr.port()),
            |reactor, client, event| {
                if let Event::Connected = event {
                    reactor.send(client, b"a\r\n\r\nb\r\n");
                }
            },
        )
        .expect("connect failed");

    // Every delimiter byte ends a segment, so the CRLF pairs and the blank
    // line produce empties between "a" and "b" and one after "b".
    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        got.borrow().len() >= 6
    });
    assert_eq!(
        *got.borrow(),
        vec![
            b"a".to_vec(),
            b"".to_vec(),
            b"".to_vec(),
            b"".to_vec(),
            b"b".to_vec(),
            b"".to_vec(),
        ]
    );
    reactor.close(client);
}
