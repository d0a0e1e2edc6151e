use firestore_flow::firestore::api::OrderDirection;
use firestore_flow::firestore::remote::InMemoryDatastore;
use firestore_flow::firestore::value::FirestoreValue;
use firestore_flow::firestore::{FieldAccess, FirestoreClient, PaginationOptions, Query, RefreshToken};
use futures::channel::mpsc;
use futures::StreamExt;

fn seed(count: i64) -> (FirestoreClient, InMemoryDatastore, Query) {
    let (client, datastore) = FirestoreClient::with_in_memory();
    for rank in 1..=count {
        let reference = client.doc(&format!("articles/article-{rank:03}")).unwrap();
        datastore.insert(
            reference.key().clone(),
            [
                ("rank", FirestoreValue::from_integer(rank)),
                ("version", FirestoreValue::from_integer(1)),
            ],
        );
    }
    let query = client
        .collection("articles")
        .unwrap()
        .query()
        .order_by("rank", OrderDirection::Descending)
        .unwrap();
    (client, datastore, query)
}

#[tokio::test(flavor = "multi_thread")]
async fn scrolling_to_the_end_loads_every_page() {
    let (client, _datastore, query) = seed(25);
    let (scroll, positions) = mpsc::unbounded();
    let mut pages = client.paginate(query, positions, PaginationOptions::new(10, 5), None);

    let mut scroll = Some(scroll);
    let mut sizes = Vec::new();
    let mut previous: Vec<String> = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.unwrap();
        let ids: Vec<String> = page.iter().map(|doc| doc.id().to_owned()).collect();
        assert!(ids.starts_with(&previous));
        sizes.push(page.len());
        if page.len() < 25 {
            scroll.as_ref().unwrap().unbounded_send(page.len()).unwrap();
        } else {
            scroll.take();
        }
        previous = ids;
    }

    assert_eq!(sizes, [10, 15, 20, 25]);
    assert_eq!(previous.first().map(String::as_str), Some("article-025"));
    assert_eq!(previous.last().map(String::as_str), Some("article-001"));
}

#[tokio::test(flavor = "multi_thread")]
async fn document_listener_drives_in_place_refresh() {
    let (client, datastore, query) = seed(6);
    let watched = client.doc("articles/article-005").unwrap();
    let refresh = client
        .document_snapshots(&watched)
        .filter_map(|snapshot| async move {
            let snapshot = snapshot.ok()?;
            Some(Some(RefreshToken::new(snapshot.id(), snapshot.get_i64_or_zero("version"))))
        })
        .boxed();
    let (_scroll, positions) = mpsc::unbounded::<usize>();
    let mut pages = client.paginate(query, positions, PaginationOptions::new(3, 3), Some(refresh));

    let first = pages.next().await.unwrap().unwrap();
    assert_eq!(first[1].id(), "article-005");

    let initial_refresh = pages.next().await.unwrap().unwrap();
    assert_eq!(initial_refresh[1].data(), first[1].data());
    assert!(initial_refresh[1].from_cache());

    datastore.insert(
        watched.key().clone(),
        [
            ("rank", FirestoreValue::from_integer(5)),
            ("version", FirestoreValue::from_integer(2)),
            ("title", FirestoreValue::from_string("Edited")),
        ],
    );
    let edited = pages.next().await.unwrap().unwrap();
    assert_eq!(edited.len(), 3);
    assert_eq!(edited[1].get_string_or_empty("title"), "Edited");
    assert_eq!(edited[0], first[0]);
    assert_eq!(datastore.listener_count(), 1);

    drop(pages);
    assert_eq!(datastore.listener_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_pagination_serves_the_cache() {
    let (client, datastore, query) = seed(4);
    datastore.set_online(false);
    let (scroll, positions) = mpsc::unbounded();
    let mut pages = client.paginate(query, positions, PaginationOptions::new(2, 2), None);

    let first = pages.next().await.unwrap().unwrap();
    assert!(first.iter().all(|doc| doc.from_cache()));

    scroll.unbounded_send(2).unwrap();
    let grown = pages.next().await.unwrap().unwrap();
    assert_eq!(grown.len(), 4);
}
