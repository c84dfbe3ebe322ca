//! Timer behavior: ordering, auto-reload, destruction.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use muxio::Status;

mod util;

#[test]
fn one_shot_fires_once() {
    let mut reactor = util::reactor();
    let fired = Rc::new(RefCell::new(0u32));

    let count = Rc::clone(&fired);
    reactor.timer_after(Duration::from_millis(30), move |_, _| {
        *count.borrow_mut() += 1;
    });

    util::run_for(&mut reactor, Duration::from_millis(200));
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn equal_deadlines_fire_in_creation_order() {
    let mut reactor = util::reactor();
    let order: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let deadline = Instant::now() + Duration::from_millis(30);

    for id in 0..3u8 {
        let order = Rc::clone(&order);
        let timer = reactor.timer_create(Some(deadline));
        reactor.timer_set_callback(timer, move |_, _| {
            order.borrow_mut().push(id);
        });
    }

    util::run_until(&mut reactor, Duration::from_secs(2), |_| {
        order.borrow().len() == 3
    });
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn periodic_timer_does_not_drift() {
    let mut reactor = util::reactor();
    let fires: Rc<RefCell<Vec<Instant>>> = Rc::new(RefCell::new(Vec::new()));
    let interval = Duration::from_millis(50);
    let start = Instant::now();

    let log = Rc::clone(&fires);
    let timer = reactor.timer_every(interval, move |_, _| {
        log.borrow_mut().push(Instant::now());
    });

    util::run_until(&mut reactor, Duration::from_secs(5), |_| {
        fires.borrow().len() >= 6
    });
    reactor.timer_destroy(timer);

    let fires = fires.borrow();
    for (k, fire) in fires.iter().take(6).enumerate() {
        let nominal = start + interval * (k as u32 + 1);
        // Never early, and the error stays bounded instead of accumulating.
        assert!(*fire + Duration::from_millis(2) >= nominal);
        assert!(
            *fire < nominal + Duration::from_millis(120),
            "fire {} drifted: {:?} past nominal",
            k,
            *fire - nominal
        );
    }
}

#[test]
fn autoreload_clear_reverts_to_one_shot() {
    let mut reactor = util::reactor();
    let fired = Rc::new(RefCell::new(0u32));

    let count = Rc::clone(&fired);
    reactor.timer_every(Duration::from_millis(25), move |reactor, timer| {
        *count.borrow_mut() += 1;
        if *count.borrow() == 1 {
            // The re-arm already happened, so this behaves like a one-shot
            // with the most recent deadline: one more fire, then gone.
            reactor.timer_set_autoreload(timer, None);
        }
    });

    util::run_for(&mut reactor, Duration::from_millis(300));
    assert_eq!(*fired.borrow(), 2);
}

#[test]
fn destroy_from_own_callback() {
    let mut reactor = util::reactor();
    let fired = Rc::new(RefCell::new(0u32));

    let count = Rc::clone(&fired);
    reactor.timer_every(Duration::from_millis(20), move |reactor, timer| {
        *count.borrow_mut() += 1;
        if *count.borrow() == 3 {
            reactor.timer_destroy(timer);
        }
    });

    util::run_for(&mut reactor, Duration::from_millis(250));
    assert_eq!(*fired.borrow(), 3);
}

#[test]
fn timers_and_sockets_share_the_loop() {
    // A timer closing a socket exercises the dispatch ordering: poll
    // events first, timers after.
    let mut reactor = util::reactor();
    let listener = reactor
        .listen(muxio::Listen::new("127.0.0.1", 0), |_, _, _| {})
        .expect("listen failed");

    reactor.timer_after(Duration::from_millis(40), move |reactor, _| {
        reactor.close(listener);
    });

    util::run_until(&mut reactor, Duration::from_secs(2), |reactor| {
        reactor.status(listener) == Status::Closed
    });
}
