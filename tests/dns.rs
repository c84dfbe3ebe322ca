//! DNS queries through the public API.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use muxio::{Config, DnsMode, DnsRecord, RecordSet};

mod util;

#[test]
fn literal_completes_without_an_engine() {
    let mut reactor = util::reactor();
    let outcome: Rc<RefCell<Option<Result<Vec<DnsRecord>, String>>>> =
        Rc::new(RefCell::new(None));

    let slot = Rc::clone(&outcome);
    reactor
        .resolve("192.0.2.5", RecordSet::A, move |_, _, result| {
            *slot.borrow_mut() = Some(result);
        })
        .expect("resolve failed");

    util::run_until(&mut reactor, Duration::from_secs(2), |_| {
        outcome.borrow().is_some()
    });
    assert_eq!(
        outcome.borrow().as_ref().unwrap().as_ref().unwrap(),
        &vec![DnsRecord::V4("192.0.2.5".parse().unwrap())]
    );
}

#[test]
fn literal_with_wrong_family_fails() {
    let mut reactor = util::reactor();
    let outcome: Rc<RefCell<Option<Result<Vec<DnsRecord>, String>>>> =
        Rc::new(RefCell::new(None));

    let slot = Rc::clone(&outcome);
    reactor
        .resolve("192.0.2.5", RecordSet::AAAA, move |_, _, result| {
            *slot.borrow_mut() = Some(result);
        })
        .expect("resolve failed");

    util::run_until(&mut reactor, Duration::from_secs(2), |_| {
        outcome.borrow().is_some()
    });
    assert!(outcome.borrow().as_ref().unwrap().is_err());
}

#[test]
fn threaded_engine_resolves_localhost() {
    let mut reactor = util::reactor_with(
        Config::new()
            .dns(DnsMode::Threaded)
            .gc_grace(Duration::from_millis(50)),
    );
    assert_eq!(reactor.dns_engine_name(), "threaded");

    let outcome: Rc<RefCell<Option<Result<Vec<DnsRecord>, String>>>> =
        Rc::new(RefCell::new(None));
    let slot = Rc::clone(&outcome);
    reactor
        .resolve(
            "localhost",
            RecordSet::A | RecordSet::AAAA,
            move |_, _, result| {
                *slot.borrow_mut() = Some(result);
            },
        )
        .expect("resolve failed");

    util::run_until(&mut reactor, Duration::from_secs(10), |_| {
        outcome.borrow().is_some()
    });
    let outcome = outcome.borrow();
    let records = outcome.as_ref().unwrap().as_ref().expect("lookup failed");
    assert!(records.iter().any(|record| matches!(
        record,
        DnsRecord::V4(ip) if ip.is_loopback()
    ) || matches!(record, DnsRecord::V6(ip) if ip.is_loopback())));
}

#[test]
fn aborted_query_never_calls_back() {
    let mut reactor = util::reactor_with(
        Config::new()
            .dns(DnsMode::Threaded)
            .gc_grace(Duration::from_millis(50)),
    );

    let called = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&called);
    let query = reactor
        .resolve("localhost", RecordSet::A, move |_, _, _| {
            *flag.borrow_mut() = true;
        })
        .expect("resolve failed");
    reactor.dns_abort(query);

    util::run_for(&mut reactor, Duration::from_millis(300));
    assert!(!*called.borrow());

    // A second abort on the same handle is a logged no-op.
    reactor.dns_abort(query);
}

#[test]
fn reverse_lookup_completes() {
    let mut reactor = util::reactor_with(
        Config::new()
            .dns(DnsMode::Threaded)
            .gc_grace(Duration::from_millis(50)),
    );

    let outcome: Rc<RefCell<Option<Result<Vec<DnsRecord>, String>>>> =
        Rc::new(RefCell::new(None));
    let slot = Rc::clone(&outcome);
    reactor
        .resolve_reverse("127.0.0.1".parse().unwrap(), move |_, _, result| {
            *slot.borrow_mut() = Some(result);
        })
        .expect("resolve_reverse failed");

    util::run_until(&mut reactor, Duration::from_secs(10), |_| {
        outcome.borrow().is_some()
    });
    // Whether a name exists depends on the host's configuration; the
    // contract is that the query completes either way.
    let result = outcome.borrow();
    if let Ok(records) = result.as_ref().unwrap() {
        assert!(matches!(records[0], DnsRecord::Name(_)));
    }
}
