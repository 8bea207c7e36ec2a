use std::time::Duration;

use topic_core::{Topic, UpdateNotifier, UpdateOutcome};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn subscription_only_yields_its_topic() {
    let notifier = UpdateNotifier::new(8);
    let mut news = notifier.subscribe(Topic::new("news"));

    notifier.publish(Topic::new("sport"), UpdateOutcome::New);
    notifier.publish(Topic::new("news"), UpdateOutcome::Changed);

    let outcome = tokio::time::timeout(WAIT, news.recv())
        .await
        .expect("timed out")
        .expect("channel open");
    assert_eq!(outcome, UpdateOutcome::Changed);
    assert_eq!(news.topic(), &Topic::new("news"));
}

#[tokio::test]
async fn replay_is_opt_in() {
    let notifier = UpdateNotifier::new(8);
    assert_eq!(notifier.publish(Topic::new("news"), UpdateOutcome::New), 0);
    assert_eq!(notifier.last_outcome(&Topic::new("news")), Some(UpdateOutcome::New));

    let mut replaying = notifier.subscribe_with_replay(Topic::new("news"));
    let mut plain = notifier.subscribe(Topic::new("news"));
    assert_eq!(replaying.recv().await.expect("replayed"), UpdateOutcome::New);

    notifier.publish(Topic::new("news"), UpdateOutcome::Failed("boom".into()));
    assert_eq!(
        plain.recv().await.expect("live event"),
        UpdateOutcome::Failed("boom".into())
    );
    assert_eq!(
        replaying.recv().await.expect("live event"),
        UpdateOutcome::Failed("boom".into())
    );
}

#[tokio::test]
async fn lagging_subscription_keeps_receiving() {
    let notifier = UpdateNotifier::new(2);
    let mut news = notifier.subscribe(Topic::new("news"));

    for _ in 0..5 {
        notifier.publish(Topic::new("news"), UpdateOutcome::Unchanged);
    }
    notifier.publish(Topic::new("news"), UpdateOutcome::New);

    let mut last = None;
    while let Ok(Ok(outcome)) =
        tokio::time::timeout(Duration::from_millis(50), news.recv()).await
    {
        last = Some(outcome);
    }
    assert_eq!(last, Some(UpdateOutcome::New));
}

#[test]
fn dropping_a_subscription_deregisters_it() {
    let notifier = UpdateNotifier::default();
    let sub = notifier.subscribe(Topic::new("news"));
    assert_eq!(notifier.subscriber_count(), 1);
    drop(sub);
    assert_eq!(notifier.subscriber_count(), 0);
}
