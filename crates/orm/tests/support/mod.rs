//! Blog fixture shared by the integration tests
#![allow(dead_code)]

use std::sync::{Arc, Once};

use elif_orm_batch::memory::{MemoryRecord, MemoryStore};
use elif_orm_batch::{Batcher, ProxyRegistry, RecordRef};
use serde_json::json;

static TRACING: Once = Once::new();

/// Log to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Schema without rows
pub fn blog_schema() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .model("User", true)
        .model("Profile", true)
        .model("Post", true)
        .model("Comment", true)
        .model("Image", true)
        .model("Tag", false);

    store.has_many("User", "posts", "Post", "user_id").unwrap();
    store.has_one("User", "profile", "Profile", "user_id").unwrap();
    store.morph_one("User", "avatar", "Image", "imageable").unwrap();
    store.has_many("User", "tags", "Tag", "user_id").unwrap();
    store.belongs_to("Post", "user", "User", "user_id").unwrap();
    store.has_many("Post", "comments", "Comment", "post_id").unwrap();
    store.morph_many("Post", "images", "Image", "imageable").unwrap();
    store.belongs_to("Comment", "post", "Post", "post_id").unwrap();
    store.morph_to("Image", "imageable").unwrap();
    store.has_many_through("User", "comments", "posts", "comments").unwrap();
    store
}

/// 3 users with 2 posts each; every post has one active and one inactive
/// comment. Users 1 and 2 have a profile, every user has an avatar, posts
/// 1 and 2 have an image each and one image hangs off a tag.
pub fn blog() -> Arc<MemoryStore> {
    init_tracing();
    let store = blog_schema();

    for u in 1..=3 {
        let user = store.insert("User", json!({"name": format!("user-{}", u)})).unwrap();
        if u < 3 {
            store.insert("Profile", json!({"user_id": user, "bio": "hi"})).unwrap();
        }
        store
            .insert("Image", json!({"imageable_type": "User", "imageable_id": user}))
            .unwrap();
        store.insert("Tag", json!({"user_id": user, "label": "t"})).unwrap();

        for p in 1..=2 {
            let post = store
                .insert(
                    "Post",
                    json!({"user_id": user, "identifier": format!("post-{}-{}", u, p), "body": "..."}),
                )
                .unwrap();
            for state in ["active", "inactive"] {
                store
                    .insert("Comment", json!({"post_id": post, "state": state, "body": "..."}))
                    .unwrap();
            }
        }
    }

    for post in 1..=2 {
        store
            .insert("Image", json!({"imageable_type": "Post", "imageable_id": post}))
            .unwrap();
    }
    store
        .insert("Image", json!({"imageable_type": "Tag", "imageable_id": 1}))
        .unwrap();

    Arc::new(store)
}

pub fn batcher(store: &Arc<MemoryStore>) -> Batcher {
    Batcher::new(ProxyRegistry::new(store.clone()), store.clone())
}

pub fn memory(record: &RecordRef) -> &MemoryRecord {
    record.downcast_ref::<MemoryRecord>().unwrap()
}

pub fn id(record: &RecordRef) -> i64 {
    memory(record).id().unwrap()
}

pub fn ids(records: &[RecordRef]) -> Vec<i64> {
    records.iter().map(id).collect()
}
