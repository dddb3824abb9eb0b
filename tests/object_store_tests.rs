use bytes::Bytes;
use wedding_gallery::object_store::{
    ListQuery, LocalStore, NewObject, ObjectStore, ObjectStoreError,
};

const FOLDER: &str = "folder-1";

fn new_object(name: &str, mime_type: &str, folder_id: &str) -> NewObject {
    NewObject {
        data: Bytes::from(format!("bytes of {name}")),
        description: Some("Uploaded by: Ana".to_string()),
        folder_id: folder_id.to_string(),
        mime_type: mime_type.to_string(),
        name: name.to_string(),
    }
}

fn query(page_size: u32, page_token: Option<&str>) -> ListQuery<'_> {
    ListQuery {
        folder_id: FOLDER,
        page_size,
        page_token,
    }
}

async fn create_public(store: &LocalStore, name: &str) -> String {
    let stored = store
        .create(new_object(name, "image/jpeg", FOLDER))
        .await
        .unwrap();
    store.grant_public_read(&stored.id).await.unwrap();
    stored.id
}

#[tokio::test]
async fn test_local_store_create_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let stored = store
        .create(new_object("a.jpg", "image/jpeg", FOLDER))
        .await
        .unwrap();
    assert_eq!(stored.name, "a.jpg");
    assert_eq!(stored.description.as_deref(), Some("Uploaded by: Ana"));

    let data = store.get(&stored.id).await.unwrap();
    assert_eq!(data, Bytes::from("bytes of a.jpg"));
}

#[tokio::test]
async fn test_local_store_lists_only_public_images_in_folder() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let public = create_public(&store, "public.jpg").await;
    store
        .create(new_object("private.jpg", "image/jpeg", FOLDER))
        .await
        .unwrap();
    let other = store
        .create(new_object("other.jpg", "image/jpeg", "folder-2"))
        .await
        .unwrap();
    store.grant_public_read(&other.id).await.unwrap();
    let text = store
        .create(new_object("notes.txt", "text/plain", FOLDER))
        .await
        .unwrap();
    store.grant_public_read(&text.id).await.unwrap();

    let page = store.list_images(query(20, None)).await.unwrap();
    let ids: Vec<&str> = page.objects.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec![public.as_str()]);
    assert_eq!(page.next_page_token, None);
}

#[tokio::test]
async fn test_local_store_pagination_covers_every_object_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let mut created = Vec::new();
    for i in 0..7 {
        created.push(create_public(&store, &format!("{i}.jpg")).await);
    }

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = store
            .list_images(query(3, token.as_deref()))
            .await
            .unwrap();
        pages += 1;
        assert!(page.objects.len() <= 3);
        seen.extend(page.objects.into_iter().map(|o| o.id));
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    seen.sort();
    created.sort();
    assert_eq!(seen, created);
}

#[tokio::test]
async fn test_local_store_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    create_public(&store, "first.jpg").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    create_public(&store, "second.jpg").await;

    let page = store.list_images(query(20, None)).await.unwrap();
    let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["second.jpg", "first.jpg"]);
}

#[tokio::test]
async fn test_local_store_rejects_garbage_page_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.list_images(query(20, Some("garbage!"))).await;
    assert!(matches!(result, Err(ObjectStoreError::Backend(_))));
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let id = create_public(&store, "gone.jpg").await;
    store.delete(&id).await.unwrap();

    assert!(matches!(
        store.get(&id).await,
        Err(ObjectStoreError::NotFound(_))
    ));
    let page = store.list_images(query(20, None)).await.unwrap();
    assert!(page.objects.is_empty());
}

#[tokio::test]
async fn test_local_store_delete_nonexistent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    // Deleting a nonexistent object should not error
    store.delete("nonexistent").await.unwrap();
}

#[tokio::test]
async fn test_local_store_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(matches!(
        store.get("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
    assert!(matches!(
        store.grant_public_read("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
    assert!(matches!(
        store.get("../etc/passwd").await,
        Err(ObjectStoreError::NotFound(_))
    ));
}
