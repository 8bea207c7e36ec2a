mod common;

use common::{posts, ScriptedUseCases};
use topic_core::{DispatchTable, Topic, UseCaseKind};

#[tokio::test]
async fn table_routes_each_kind_to_its_use_case() {
    let fetcher = ScriptedUseCases::new();
    fetcher.respond(posts("news", 2));
    let counter = ScriptedUseCases::new();
    counter.set_count(9);
    let auto = ScriptedUseCases::new();
    auto.set_auto_update(true);
    let with_count = ScriptedUseCases::new();

    let table = DispatchTable::new(fetcher.clone(), counter.clone(), auto.clone(), with_count.clone());
    let topic = Topic::new("news");

    assert_eq!(table.fetch_posts().fetch(&topic).await.expect("posts").len(), 2);
    assert_eq!(table.fetch_count().fetch_count(&topic).await.expect("count"), 9);
    assert!(table.should_auto_update().should_auto_update(&topic).await);
    assert!(table.fetch_with_count().fetch_with_count(&topic).await.is_err());
    assert_eq!(fetcher.fetches(), 1);
    assert_eq!(with_count.fetches(), 1);

    table.use_case(UseCaseKind::FetchPostCount).stop();
    assert_eq!(counter.stops(), 1);
    assert_eq!(fetcher.stops(), 0);

    table.stop();
    for use_case in [&fetcher, &counter, &auto, &with_count] {
        assert!(use_case.stops() >= 1);
    }
    assert_eq!(counter.stops(), 2);
}
