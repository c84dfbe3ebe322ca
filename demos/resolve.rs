//! Resolves the hostnames given on the command line without blocking the
//! loop, then exits.

use std::cell::Cell;
use std::rc::Rc;

use muxio::{Reactor, RecordSet};

fn main() -> std::io::Result<()> {
    let hosts: Vec<String> = std::env::args().skip(1).collect();
    if hosts.is_empty() {
        eprintln!("usage: resolve <host> [host...]");
        return Ok(());
    }

    let mut reactor = Reactor::new()?;
    println!("using {} dns engine", reactor.dns_engine_name());

    let outstanding = Rc::new(Cell::new(hosts.len()));
    for host in hosts {
        let shown = host.clone();
        let outstanding = Rc::clone(&outstanding);
        reactor.resolve(
            &host,
            RecordSet::A | RecordSet::AAAA,
            move |reactor, _query, outcome| {
                match outcome {
                    Ok(records) => println!("{}: {:?}", shown, records),
                    Err(err) => println!("{}: {}", shown, err),
                }
                outstanding.set(outstanding.get() - 1);
                if outstanding.get() == 0 {
                    reactor.stop();
                }
            },
        )?;
    }

    reactor.run()
}
