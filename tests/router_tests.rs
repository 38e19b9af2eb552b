use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use entity::{post, post_tag, tag, user};
use microblog::{router, AppState};
use microblog_service::Mutation;
use sea_orm::{ConnectionTrait, Database, DbConn, EntityTrait, Schema};
use tera::Tera;
use tower::ServiceExt;

async fn setup_app() -> (Router, DbConn) {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    for stmt in [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(post::Entity),
        schema.create_table_from_entity(tag::Entity),
        schema.create_table_from_entity(post_tag::Entity),
    ] {
        db.execute(backend.build(&stmt)).await.unwrap();
    }

    let templates =
        Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*")).unwrap();
    let app = router(AppState {
        templates,
        conn: db.clone(),
    });

    (app, db)
}

fn form_post(uri: String, cookie: Option<&str>, body: &'static str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn home_page_renders() {
    let (app, db) = setup_app().await;

    Mutation::create_user(&db, "Ben", "Johnson", None)
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_user_page_is_not_found() {
    let (app, _db) = setup_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_submission_with_mismatched_token_is_rejected() {
    let (app, db) = setup_app().await;

    let user = Mutation::create_user(&db, "Ben", "Johnson", None)
        .await
        .unwrap();

    // Token cookie present but the hidden field does not match it.
    let response = app
        .clone()
        .oneshot(form_post(
            format!("/users/{}/posts/new", user.id),
            Some("_csrf=expected"),
            "title=Hello&content=World&csrf_token=forged",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No cookie at all.
    let response = app
        .oneshot(form_post(
            format!("/users/{}/posts/new", user.id),
            None,
            "title=Hello&content=World&csrf_token=expected",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(post::Entity::find().all(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn post_submission_with_matching_token_succeeds_and_consumes_it() {
    let (app, db) = setup_app().await;

    let user = Mutation::create_user(&db, "Ben", "Johnson", None)
        .await
        .unwrap();

    let response = app
        .oneshot(form_post(
            format!("/users/{}/posts/new", user.id),
            Some("_csrf=token123"),
            "title=Hello&content=World&csrf_token=token123",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        &format!("/users/{}", user.id)
    );

    let posts = post::Entity::find().all(&db).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Hello");

    // The spent token is cleared so the same submission cannot be replayed.
    let cleared = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|value| value.to_str().unwrap().starts_with("_csrf=;"));
    assert!(cleared);
}

#[tokio::test]
async fn duplicate_tag_submission_flashes_an_error() {
    let (app, db) = setup_app().await;

    Mutation::create_tag(&db, "python").await.unwrap();

    let response = app
        .oneshot(form_post("/tags".to_owned(), None, "name=python"))
        .await
        .unwrap();

    // Conflict is a user-facing flash on the tag listing, not a crash.
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/tags");

    let flash = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .find(|value| value.to_str().unwrap().starts_with("_flash="))
        .expect("flash cookie set")
        .to_str()
        .unwrap();
    assert!(flash.contains("error"));

    let tags = tag::Entity::find().all(&db).await.unwrap();
    assert_eq!(tags.iter().filter(|t| t.name == "python").count(), 1);
}

#[tokio::test]
async fn deleting_an_absent_post_redirects_home_with_a_flash() {
    let (app, _db) = setup_app().await;

    let response = app
        .oneshot(form_post("/posts/999/delete".to_owned(), None, ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");

    let flash = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .find(|value| value.to_str().unwrap().starts_with("_flash="))
        .expect("flash cookie set")
        .to_str()
        .unwrap();
    assert!(flash.contains("Post not found"));
}
