mod csrf;
mod flash;

use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use axum_extra::extract::Form as MultiForm;
use csrf::{issue_csrf_token, verify_csrf_token};
use flash::{get_flash_cookie, post_response, PostResponse};
use microblog_service::{Mutation, Query};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use std::env;
use tera::Tera;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

pub async fn start() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    dotenvy::dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let host = env::var("HOST").expect("HOST is not set in .env file");
    let port = env::var("PORT").expect("PORT is not set in .env file");
    let server_url = format!("{host}:{port}");

    let conn = Database::connect(db_url)
        .await
        .expect("Database connection failed");

    // Schema setup happens exactly once, before the first request.
    Migrator::up(&conn, None).await?;

    let templates = Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
        .expect("Tera initialization failed");

    let app = router(AppState { templates, conn });

    let listener = tokio::net::TcpListener::bind(&server_url).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/users/new", get(new_user_form).post(create_user))
        .route("/users/{id}", get(user_detail))
        .route("/users/{id}/edit", get(edit_user_form).post(update_user))
        .route("/users/{id}/delete", post(delete_user))
        .route("/users/{id}/posts/new", get(new_post_form).post(create_post))
        .route("/posts/{id}", get(post_detail))
        .route("/posts/{id}/edit", get(edit_post_form).post(update_post))
        .route("/posts/{id}/delete", post(delete_post))
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/new", get(new_tag_form).post(create_tag))
        .route("/tags/{id}/posts", get(tag_posts))
        .nest_service(
            "/static",
            ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        )
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

#[derive(Clone)]
pub struct AppState {
    pub templates: Tera,
    pub conn: DatabaseConnection,
}

type AppError = (StatusCode, &'static str);

const NOT_FOUND: AppError = (StatusCode::NOT_FOUND, "Not found");

fn template_error<E>(_: E) -> AppError {
    (StatusCode::INTERNAL_SERVER_ERROR, "Template error")
}

fn db_error(err: DbErr) -> AppError {
    match err {
        DbErr::RecordNotFound(_) => NOT_FOUND,
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct FlashData {
    kind: String,
    message: String,
}

impl FlashData {
    fn success(message: &str) -> Self {
        Self {
            kind: "success".to_owned(),
            message: message.to_owned(),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            kind: "error".to_owned(),
            message: message.to_owned(),
        }
    }
}

#[derive(Deserialize)]
struct UserForm {
    first_name: String,
    last_name: String,
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct PostForm {
    title: String,
    content: String,
    csrf_token: String,
    #[serde(default)]
    tag_ids: Vec<i32>,
}

#[derive(Deserialize)]
struct PostEditForm {
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct TagForm {
    name: String,
}

async fn home(state: State<AppState>, cookies: Cookies) -> Result<Html<String>, AppError> {
    let mut ctx = tera::Context::new();

    match Query::list_users(&state.conn).await {
        Ok(users) => {
            ctx.insert("users", &users);
            if let Some(value) = get_flash_cookie::<FlashData>(&cookies) {
                ctx.insert("flash", &value);
            }

            let body = state
                .templates
                .render("home.html.tera", &ctx)
                .map_err(template_error)?;

            Ok(Html(body))
        }
        // Anything that goes wrong on the landing page renders a plain
        // error page instead of bubbling up.
        Err(err) => {
            ctx.insert("error_message", &err.to_string());

            let body = state
                .templates
                .render("error.html.tera", &ctx)
                .map_err(template_error)?;

            Ok(Html(body))
        }
    }
}

async fn new_user_form(state: State<AppState>) -> Result<Html<String>, AppError> {
    let ctx = tera::Context::new();
    let body = state
        .templates
        .render("new_user.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn create_user(
    state: State<AppState>,
    mut cookies: Cookies,
    Form(form): Form<UserForm>,
) -> Result<PostResponse, AppError> {
    if form.first_name.trim().is_empty() || form.last_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "first_name and last_name are required",
        ));
    }

    Mutation::create_user(
        &state.conn,
        &form.first_name,
        &form.last_name,
        form.image_url.as_deref(),
    )
    .await
    .map_err(db_error)?;

    Ok(post_response(
        &mut cookies,
        FlashData::success("User successfully added"),
        "/",
    ))
}

async fn user_detail(
    state: State<AppState>,
    Path(id): Path<i32>,
    cookies: Cookies,
) -> Result<Html<String>, AppError> {
    let user = Query::find_user_by_id(&state.conn, id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;
    let posts = Query::find_posts_by_user(&state.conn, user.id)
        .await
        .map_err(db_error)?;

    let mut ctx = tera::Context::new();
    ctx.insert("user", &user);
    ctx.insert("posts", &posts);

    if let Some(value) = get_flash_cookie::<FlashData>(&cookies) {
        ctx.insert("flash", &value);
    }

    let body = state
        .templates
        .render("user_detail.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn edit_user_form(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Html<String>, AppError> {
    let user = Query::find_user_by_id(&state.conn, id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;

    let mut ctx = tera::Context::new();
    ctx.insert("user", &user);

    let body = state
        .templates
        .render("edit_user.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn update_user(
    state: State<AppState>,
    Path(id): Path<i32>,
    mut cookies: Cookies,
    Form(form): Form<UserForm>,
) -> Result<PostResponse, AppError> {
    if form.first_name.trim().is_empty() || form.last_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "first_name and last_name are required",
        ));
    }

    Mutation::update_user_by_id(
        &state.conn,
        id,
        &form.first_name,
        &form.last_name,
        form.image_url.as_deref(),
    )
    .await
    .map_err(db_error)?;

    Ok(post_response(
        &mut cookies,
        FlashData::success("User successfully updated"),
        "/",
    ))
}

async fn delete_user(
    state: State<AppState>,
    Path(id): Path<i32>,
    mut cookies: Cookies,
) -> Result<PostResponse, AppError> {
    Mutation::delete_user(&state.conn, id)
        .await
        .map_err(db_error)?;

    Ok(post_response(
        &mut cookies,
        FlashData::success("User successfully deleted"),
        "/",
    ))
}

async fn new_post_form(
    state: State<AppState>,
    Path(user_id): Path<i32>,
    cookies: Cookies,
) -> Result<Html<String>, AppError> {
    let user = Query::find_user_by_id(&state.conn, user_id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;
    let tags = Query::list_tags(&state.conn).await.map_err(db_error)?;

    let mut ctx = tera::Context::new();
    ctx.insert("user", &user);
    ctx.insert("tags", &tags);
    ctx.insert("csrf_token", &issue_csrf_token(&cookies));

    let body = state
        .templates
        .render("new_post.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn create_post(
    state: State<AppState>,
    Path(user_id): Path<i32>,
    mut cookies: Cookies,
    MultiForm(form): MultiForm<PostForm>,
) -> Result<PostResponse, AppError> {
    if !verify_csrf_token(&cookies, &form.csrf_token) {
        return Err((StatusCode::BAD_REQUEST, "Invalid anti-forgery token"));
    }
    if form.title.trim().is_empty() || form.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "title and content are required"));
    }
    if form.title.chars().count() > 100 {
        return Err((StatusCode::BAD_REQUEST, "title is limited to 100 characters"));
    }

    Query::find_user_by_id(&state.conn, user_id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;

    Mutation::create_post(
        &state.conn,
        user_id,
        &form.title,
        &form.content,
        &form.tag_ids,
    )
    .await
    .map_err(db_error)?;

    Ok(post_response(
        &mut cookies,
        FlashData::success("Post successfully added"),
        &format!("/users/{user_id}"),
    ))
}

async fn post_detail(
    state: State<AppState>,
    Path(id): Path<i32>,
    cookies: Cookies,
) -> Result<Html<String>, AppError> {
    let (post, author) = Query::find_post_with_author(&state.conn, id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;
    // A post whose owner is gone is as good as gone itself.
    let author = author.ok_or(NOT_FOUND)?;
    let tags = Query::find_tags_of_post(&state.conn, &post)
        .await
        .map_err(db_error)?;

    let mut ctx = tera::Context::new();
    ctx.insert("post", &post);
    ctx.insert("author", &author);
    ctx.insert("tags", &tags);

    if let Some(value) = get_flash_cookie::<FlashData>(&cookies) {
        ctx.insert("flash", &value);
    }

    let body = state
        .templates
        .render("post_detail.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn edit_post_form(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Html<String>, AppError> {
    let post = Query::find_post_by_id(&state.conn, id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;

    let mut ctx = tera::Context::new();
    ctx.insert("post", &post);

    let body = state
        .templates
        .render("edit_post.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn update_post(
    state: State<AppState>,
    Path(id): Path<i32>,
    mut cookies: Cookies,
    Form(form): Form<PostEditForm>,
) -> Result<PostResponse, AppError> {
    if form.title.trim().is_empty() || form.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "title and content are required"));
    }
    if form.title.chars().count() > 100 {
        return Err((StatusCode::BAD_REQUEST, "title is limited to 100 characters"));
    }

    Mutation::update_post_by_id(&state.conn, id, &form.title, &form.content)
        .await
        .map_err(db_error)?;

    Ok(post_response(
        &mut cookies,
        FlashData::success("Post successfully updated"),
        &format!("/posts/{id}"),
    ))
}

async fn delete_post(
    state: State<AppState>,
    Path(id): Path<i32>,
    mut cookies: Cookies,
) -> Result<PostResponse, AppError> {
    match Query::find_post_by_id(&state.conn, id)
        .await
        .map_err(db_error)?
    {
        Some(post) => {
            Mutation::delete_post(&state.conn, post.id)
                .await
                .map_err(db_error)?;

            Ok(post_response(
                &mut cookies,
                FlashData::success("Post successfully deleted"),
                &format!("/users/{}", post.user_id),
            ))
        }
        // Deleting something already gone is not worth an error page.
        None => Ok(post_response(
            &mut cookies,
            FlashData::error("Post not found"),
            "/",
        )),
    }
}

async fn list_tags(state: State<AppState>, cookies: Cookies) -> Result<Html<String>, AppError> {
    let tags = Query::list_tags(&state.conn).await.map_err(db_error)?;

    let mut ctx = tera::Context::new();
    ctx.insert("tags", &tags);

    if let Some(value) = get_flash_cookie::<FlashData>(&cookies) {
        ctx.insert("flash", &value);
    }

    let body = state
        .templates
        .render("tags.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn new_tag_form(state: State<AppState>) -> Result<Html<String>, AppError> {
    let ctx = tera::Context::new();
    let body = state
        .templates
        .render("new_tag.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}

async fn create_tag(
    state: State<AppState>,
    mut cookies: Cookies,
    Form(form): Form<TagForm>,
) -> Result<PostResponse, AppError> {
    if form.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required"));
    }
    if form.name.chars().count() > 50 {
        return Err((StatusCode::BAD_REQUEST, "name is limited to 50 characters"));
    }

    match Mutation::create_tag(&state.conn, &form.name).await {
        Ok(_) => Ok(post_response(
            &mut cookies,
            FlashData::success("Tag successfully added"),
            "/tags",
        )),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Ok(post_response(
                &mut cookies,
                FlashData::error("A tag with that name already exists"),
                "/tags",
            )),
            _ => Err(db_error(err)),
        },
    }
}

async fn tag_posts(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Html<String>, AppError> {
    let tag = Query::find_tag_by_id(&state.conn, id)
        .await
        .map_err(db_error)?
        .ok_or(NOT_FOUND)?;
    let posts = Query::find_posts_by_tag(&state.conn, &tag)
        .await
        .map_err(db_error)?;

    let mut ctx = tera::Context::new();
    ctx.insert("tag", &tag);
    ctx.insert("posts", &posts);

    let body = state
        .templates
        .render("tag_posts.html.tera", &ctx)
        .map_err(template_error)?;

    Ok(Html(body))
}
