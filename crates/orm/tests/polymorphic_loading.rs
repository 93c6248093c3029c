mod support;

use std::sync::Arc;

use elif_orm_batch::{LoaderScopes, Record, Scope};
use serde_json::json;
use support::{batcher, blog, id, ids};

#[tokio::test]
async fn test_polymorphic_parents_batch_per_type() {
    let store = blog();
    let batcher = batcher(&store);

    let images = batcher.load_all("Image", None, LoaderScopes::new()).unwrap();
    let mut comments = 0;
    let mut posts = 0;
    for image in images.to_vec().await.unwrap() {
        let parent = batcher.relation_one(&image, "imageable").await.unwrap().unwrap();
        match parent.runtime_type() {
            "User" => posts += batcher.relation(&parent, "posts").await.unwrap().len(),
            "Post" => comments += batcher.relation(&parent, "comments").await.unwrap().len(),
            other => {
                assert_eq!(other, "Tag");
                assert!(parent.batch_loader().is_none());
            }
        }
    }

    assert_eq!(posts, 6);
    assert_eq!(comments, 4);
    // images, parents, posts of the 3 users, comments of the 2 posts
    assert_eq!(store.fetch_count(), 4);

    let fetches = store.fetches();
    assert_eq!(fetches[2].owner_type, "User");
    assert_eq!(fetches[2].owners, 3);
    assert_eq!(fetches[3].owner_type, "Post");
    assert_eq!(fetches[3].owners, 2);
}

#[tokio::test]
async fn test_polymorphic_records_are_grouped_by_type() {
    let store = blog();
    let batcher = batcher(&store);

    let images = batcher.load_all("Image", None, LoaderScopes::new()).unwrap();
    let parents = images.loader_for("imageable").await.unwrap().unwrap();
    assert!(parents.is_polymorphic());

    let records = parents.to_vec().await.unwrap();
    let types: Vec<&str> = records.iter().map(|r| r.runtime_type()).collect();
    assert_eq!(types, vec!["User", "User", "User", "Post", "Post", "Tag"]);

    let users = records[0].batch_loader().unwrap();
    assert_eq!(users.owner_type(), "User");
    assert_eq!(users.to_vec().await.unwrap().len(), 3);
    assert!(Arc::ptr_eq(&records[2].batch_loader().unwrap(), &users));
    assert_eq!(records[3].batch_loader().unwrap().owner_type(), "Post");
    assert!(!records[5].supports_batching());

    assert!(parents.loader_for("posts").await.unwrap().is_none());
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_interleaved_polymorphic_targets() {
    let store = support::blog_schema();
    for u in 1..=3 {
        let user = store.insert("User", json!({})).unwrap();
        let post = store.insert("Post", json!({"user_id": user})).unwrap();
        store.insert("Comment", json!({"post_id": post, "state": "active"})).unwrap();
        store
            .insert("Image", json!({"imageable_type": "Post", "imageable_id": post}))
            .unwrap();
        store
            .insert("Image", json!({"imageable_type": "User", "imageable_id": user}))
            .unwrap();
        assert_eq!(user, u);
    }
    let store = Arc::new(store);
    let batcher = batcher(&store);

    let images = batcher.load_all("Image", None, LoaderScopes::new()).unwrap();
    let mut leaves = 0;
    for image in images.to_vec().await.unwrap() {
        let parent = batcher.relation_one(&image, "imageable").await.unwrap().unwrap();
        let next = if parent.runtime_type() == "User" { "posts" } else { "comments" };
        leaves += batcher.relation(&parent, next).await.unwrap().len();
    }

    assert_eq!(leaves, 6);
    assert_eq!(store.fetches_of("posts"), 1);
    assert_eq!(store.fetches_of("comments"), 1);
    assert_eq!(store.fetch_count(), 4);
}

#[tokio::test]
async fn test_missing_polymorphic_parent() {
    let store = blog();
    store
        .insert("Image", json!({"imageable_type": "User", "imageable_id": 99}))
        .unwrap();
    store.insert("Image", json!({})).unwrap();
    let batcher = batcher(&store);

    let images = batcher.load_all("Image", None, LoaderScopes::new()).unwrap();
    let images = images.to_vec().await.unwrap();
    assert_eq!(images.len(), 8);

    assert!(batcher.relation_one(&images[6], "imageable").await.unwrap().is_none());
    assert!(batcher.relation_one(&images[7], "imageable").await.unwrap().is_none());
    assert!(batcher.relation_one(&images[0], "imageable").await.unwrap().is_some());
    assert_eq!(store.fetches_of("imageable"), 1);
}

#[tokio::test]
async fn test_morph_many_children() {
    let store = blog();
    let batcher = batcher(&store);

    let posts = batcher.load_all("Post", None, LoaderScopes::new()).unwrap();
    let mut counts = Vec::new();
    for post in posts.to_vec().await.unwrap() {
        let images = batcher.relation(&post, "images").await.unwrap();
        counts.push(images.len());
        if let Some(image) = images.first() {
            assert_eq!(image.batch_loader().unwrap().owner_type(), "Image");
        }
    }

    assert_eq!(counts, vec![1, 1, 0, 0, 0, 0]);
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_morph_one_children() {
    let store = blog();
    let batcher = batcher(&store);

    let users = batcher.load_all("User", None, LoaderScopes::new()).unwrap();
    let mut avatars = Vec::new();
    for user in users.to_vec().await.unwrap() {
        avatars.push(batcher.relation_one(&user, "avatar").await.unwrap().unwrap());
    }

    assert_eq!(ids(&avatars), vec![1, 2, 3]);
    assert_eq!(store.fetches_of("avatar"), 1);
}

#[tokio::test]
async fn test_scopes_reach_every_polymorphic_group() {
    let store = blog();
    let batcher = batcher(&store);

    let posts_scope = Scope::new().select(&["id", "user_id"]);
    let scopes = LoaderScopes::new().nested(
        "imageable",
        LoaderScopes::new().scope("posts", posts_scope.clone()),
    );

    let images = batcher.load_all("Image", None, scopes).unwrap();
    for image in images.to_vec().await.unwrap() {
        let Some(parent) = batcher.relation_one(&image, "imageable").await.unwrap() else {
            continue;
        };
        match parent.runtime_type() {
            "User" => {
                batcher.relation(&parent, "posts").await.unwrap();
            }
            "Post" => {
                batcher.relation(&parent, "comments").await.unwrap();
            }
            _ => {}
        }
    }

    let fetches = store.fetches();
    let posts = fetches.iter().find(|f| f.relation.as_deref() == Some("posts")).unwrap();
    let comments = fetches.iter().find(|f| f.relation.as_deref() == Some("comments")).unwrap();
    assert_eq!(posts.scope, Some(posts_scope));
    assert_eq!(comments.scope, None);
}

#[tokio::test]
async fn test_polymorphic_parent_round_trip() {
    let store = blog();
    let batcher = batcher(&store);

    let users = batcher.load_all("User", None, LoaderScopes::new()).unwrap();
    for user in users.to_vec().await.unwrap() {
        let avatar = batcher.relation_one(&user, "avatar").await.unwrap().unwrap();
        let owner = batcher.relation_one(&avatar, "imageable").await.unwrap().unwrap();
        assert_eq!(id(&owner), id(&user));
        assert_eq!(owner.runtime_type(), "User");
    }
    // users, avatars, avatar owners
    assert_eq!(store.fetch_count(), 3);
}
