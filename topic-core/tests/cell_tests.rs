use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use topic_core::ObservableCell;

fn counting_cell() -> (ObservableCell<u32>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let active = Arc::new(AtomicUsize::new(0));
    let inactive = Arc::new(AtomicUsize::new(0));
    let (a, i) = (active.clone(), inactive.clone());
    let cell = ObservableCell::with_activation(
        move || {
            a.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            i.fetch_add(1, Ordering::SeqCst);
        },
    );
    (cell, active, inactive)
}

#[test]
fn activation_fires_once_per_transition() {
    let (cell, active, inactive) = counting_cell();

    let first = cell.subscribe();
    let second = cell.subscribe();
    assert_eq!(active.load(Ordering::SeqCst), 1);
    assert_eq!(cell.observer_count(), 2);

    drop(first);
    assert_eq!(inactive.load(Ordering::SeqCst), 0);
    drop(second);
    assert_eq!(inactive.load(Ordering::SeqCst), 1);
    assert!(!cell.is_active());

    let third = cell.subscribe();
    assert_eq!(active.load(Ordering::SeqCst), 2);
    third.unsubscribe();
    assert_eq!(inactive.load(Ordering::SeqCst), 2);
}

#[test]
fn activation_hooks_are_installed_once() {
    let (cell, active, _) = counting_cell();
    assert!(!cell.set_activation(|| panic!("replaced hook"), || {}));

    let _sub = cell.subscribe();
    assert_eq!(active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn value_published_before_subscribe_is_replayed_first() {
    let cell = ObservableCell::new();
    cell.publish(1);
    cell.publish(2);

    let mut sub = cell.subscribe();
    assert_eq!(sub.recv().await, Some(2));
    assert_eq!(sub.try_recv(), None);

    cell.publish(3);
    cell.publish(4);
    assert_eq!(sub.recv().await, Some(3));
    assert_eq!(sub.recv().await, Some(4));
}

#[tokio::test]
async fn every_subscriber_sees_every_publish_in_order() {
    let cell = ObservableCell::new();
    let mut a = cell.subscribe();
    let mut b = cell.subscribe();

    for value in 0..5 {
        cell.publish(value);
    }

    for expected in 0..5 {
        assert_eq!(a.recv().await, Some(expected));
        assert_eq!(b.recv().await, Some(expected));
    }
    assert_eq!(cell.value(), Some(4));
}

#[tokio::test]
async fn subscription_ends_when_cell_is_dropped() {
    let cell = ObservableCell::new();
    let mut sub = cell.subscribe();
    cell.publish("last");
    drop(cell);

    assert_eq!(sub.recv().await, Some("last"));
    assert_eq!(sub.recv().await, None);
}

#[test]
fn clones_share_state() {
    let (cell, active, _) = counting_cell();
    let clone = cell.clone();

    let _sub = clone.subscribe();
    cell.publish(9);

    assert_eq!(active.load(Ordering::SeqCst), 1);
    assert!(cell.is_active());
    assert_eq!(clone.value(), Some(9));
}
