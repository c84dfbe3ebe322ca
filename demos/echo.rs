//! A line echo server.
//!
//! Run with `cargo run --example echo`, then connect with
//! `nc 127.0.0.1 4000` and type at it.

use muxio::{Event, Listen, Reactor};

fn main() -> std::io::Result<()> {
    muxio::logger::register_sink(|level, line| {
        eprint!("[{:?}] {}", level, line);
    });

    let mut reactor = Reactor::new()?;

    let listener = reactor.listen(Listen::new("127.0.0.1", 4000), |reactor, _listener, event| {
        if let Event::Accept(client) = event {
            println!("client connected: {:?}", reactor.peer_addr(client));
            reactor.parse_lines(client, b"\r\n", false);
            reactor.set_callback(client, |reactor, client, event| match event {
                Event::Line(line) => {
                    let mut reply = line.to_vec();
                    reply.push(b'\n');
                    reactor.send(client, &reply);
                }
                Event::Closed(err) => {
                    println!("client gone: {:?}", err);
                }
                _ => {}
            });
        }
    })?;

    println!(
        "echoing on {:?} via {} backend",
        reactor.local_addr(listener),
        reactor.backend_name()
    );
    reactor.run()
}
