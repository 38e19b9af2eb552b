use ::entity::{post, post_tag, tag, user};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;

/// Matches the column default in the user table migration.
pub const DEFAULT_IMAGE_URL: &str = "default_image_url.jpg";

fn image_url_or_default(image_url: Option<&str>) -> &str {
    match image_url {
        Some(url) if !url.is_empty() => url,
        _ => DEFAULT_IMAGE_URL,
    }
}

pub struct Mutation;

impl Mutation {
    pub async fn create_user(
        db: &DbConn,
        first_name: &str,
        last_name: &str,
        image_url: Option<&str>,
    ) -> Result<user::Model, DbErr> {
        let image_url = image_url_or_default(image_url);

        user::ActiveModel {
            first_name: Set(first_name.to_owned()),
            last_name: Set(last_name.to_owned()),
            image_url: Set(image_url.to_owned()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn update_user_by_id(
        db: &DbConn,
        id: i32,
        first_name: &str,
        last_name: &str,
        image_url: Option<&str>,
    ) -> Result<user::Model, DbErr> {
        let user: user::ActiveModel = user::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound(format!("user {id} not found")))
            .map(Into::into)?;

        user::ActiveModel {
            id: user.id,
            first_name: Set(first_name.to_owned()),
            last_name: Set(last_name.to_owned()),
            image_url: Set(image_url_or_default(image_url).to_owned()),
        }
        .update(db)
        .await
    }

    /// Deletes a user and everything it owns: the user's posts and their
    /// tag associations go in the same transaction. Tags themselves are
    /// left alone. Deleting an absent id is a no-op (rows_affected == 0).
    pub async fn delete_user(db: &DbConn, id: i32) -> Result<DeleteResult, DbErr> {
        let txn = db.begin().await?;

        let post_ids: Vec<i32> = post::Entity::find()
            .filter(post::Column::UserId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        if !post_ids.is_empty() {
            post_tag::Entity::delete_many()
                .filter(post_tag::Column::PostId.is_in(post_ids))
                .exec(&txn)
                .await?;
            post::Entity::delete_many()
                .filter(post::Column::UserId.eq(id))
                .exec(&txn)
                .await?;
        }

        let res = user::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res)
    }

    /// Inserts a post and its tag associations atomically. Tag ids that do
    /// not resolve to an existing tag are skipped; repeated ids collapse to
    /// a single join row.
    pub async fn create_post(
        db: &DbConn,
        user_id: i32,
        title: &str,
        content: &str,
        tag_ids: &[i32],
    ) -> Result<post::Model, DbErr> {
        let txn = db.begin().await?;

        let post = post::ActiveModel {
            title: Set(title.to_owned()),
            content: Set(content.to_owned()),
            created_at: Set(Utc::now()),
            user_id: Set(user_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for &tag_id in tag_ids {
            if tag::Entity::find_by_id(tag_id).one(&txn).await?.is_none() {
                continue;
            }
            post_tag::Entity::insert(post_tag::ActiveModel {
                post_id: Set(post.id),
                tag_id: Set(tag_id),
            })
            .on_conflict(
                OnConflict::columns([post_tag::Column::PostId, post_tag::Column::TagId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(post)
    }

    /// Updates title and content only; ownership and tags stay as they are.
    pub async fn update_post_by_id(
        db: &DbConn,
        id: i32,
        title: &str,
        content: &str,
    ) -> Result<post::Model, DbErr> {
        let post: post::ActiveModel = post::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound(format!("post {id} not found")))
            .map(Into::into)?;

        post::ActiveModel {
            title: Set(title.to_owned()),
            content: Set(content.to_owned()),
            ..post
        }
        .update(db)
        .await
    }

    /// Removes a post and its join rows. rows_affected == 0 means the post
    /// was already gone; callers treat that as non-fatal.
    pub async fn delete_post(db: &DbConn, id: i32) -> Result<DeleteResult, DbErr> {
        let txn = db.begin().await?;

        post_tag::Entity::delete_many()
            .filter(post_tag::Column::PostId.eq(id))
            .exec(&txn)
            .await?;
        let res = post::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res)
    }

    /// The unique index on tag.name makes a duplicate insert fail; the
    /// resulting DbErr carries SqlErr::UniqueConstraintViolation for the
    /// caller to surface.
    pub async fn create_tag(db: &DbConn, name: &str) -> Result<tag::Model, DbErr> {
        tag::ActiveModel {
            name: Set(name.to_owned()),
            ..Default::default()
        }
        .insert(db)
        .await
    }
}
