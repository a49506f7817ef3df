use std::{thread, time::Duration};

use crate::common::initialize_test;

#[test]
fn fresh_fences_start_at_zero() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();
    assert_eq!(fence.value().unwrap(), 0);
    assert!(fence.wait(0, Some(Duration::ZERO)).unwrap());
    assert_eq!(ctx.device.counters().fences.read(), 1);
    ctx.device.destroy_fence(fence);
    assert_eq!(ctx.device.counters().fences.read(), 0);
}

#[test]
fn signals_are_observed_in_order() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();

    fence.signal(&ctx.queue, 3).unwrap();
    assert_eq!(fence.value().unwrap(), 3);
    assert!(fence.wait(2, Some(Duration::ZERO)).unwrap());

    ctx.queue.submit(&[], Some((&fence, 7))).unwrap();
    assert_eq!(fence.value().unwrap(), 7);
    assert!(fence.wait(7, None).unwrap());
}

#[test]
fn waits_time_out() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();
    fence.signal(&ctx.queue, 1).unwrap();

    assert!(!fence.wait(2, Some(Duration::from_millis(10))).unwrap());
    assert_eq!(fence.value().unwrap(), 1);
}

#[test]
fn reset_keeps_the_value() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();
    fence.signal(&ctx.queue, 5).unwrap();
    fence.reset();
    assert_eq!(fence.value().unwrap(), 5);
}

#[test]
fn waiting_blocks_until_another_thread_signals() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            fence.signal(&ctx.queue, 2).unwrap();
        });
        assert!(fence.wait(2, None).unwrap());
    });
    assert_eq!(fence.value().unwrap(), 2);
}

#[test]
fn a_later_value_wakes_an_earlier_wait() {
    let ctx = initialize_test();
    let fence = ctx.device.create_fence().unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            fence.signal(&ctx.queue, 10).unwrap();
        });
        assert!(fence.wait(4, Some(Duration::from_secs(5))).unwrap());
    });
}
