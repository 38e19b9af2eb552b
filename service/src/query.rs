use ::entity::{post, tag, user};
use sea_orm::*;

pub struct Query;

impl Query {
    /// All users, oldest first.
    pub async fn list_users(db: &DbConn) -> Result<Vec<user::Model>, DbErr> {
        user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(db)
            .await
    }

    pub async fn find_user_by_id(db: &DbConn, id: i32) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(id).one(db).await
    }

    pub async fn find_posts_by_user(db: &DbConn, user_id: i32) -> Result<Vec<post::Model>, DbErr> {
        post::Entity::find()
            .filter(post::Column::UserId.eq(user_id))
            .order_by_asc(post::Column::Id)
            .all(db)
            .await
    }

    pub async fn find_post_by_id(db: &DbConn, id: i32) -> Result<Option<post::Model>, DbErr> {
        post::Entity::find_by_id(id).one(db).await
    }

    /// A post together with its owning user, in one round trip.
    pub async fn find_post_with_author(
        db: &DbConn,
        id: i32,
    ) -> Result<Option<(post::Model, Option<user::Model>)>, DbErr> {
        post::Entity::find_by_id(id)
            .find_also_related(user::Entity)
            .one(db)
            .await
    }

    pub async fn find_tags_of_post(
        db: &DbConn,
        post: &post::Model,
    ) -> Result<Vec<tag::Model>, DbErr> {
        post.find_related(tag::Entity)
            .order_by_asc(tag::Column::Id)
            .all(db)
            .await
    }

    pub async fn list_tags(db: &DbConn) -> Result<Vec<tag::Model>, DbErr> {
        tag::Entity::find()
            .order_by_asc(tag::Column::Id)
            .all(db)
            .await
    }

    pub async fn find_tag_by_id(db: &DbConn, id: i32) -> Result<Option<tag::Model>, DbErr> {
        tag::Entity::find_by_id(id).one(db).await
    }

    pub async fn find_posts_by_tag(
        db: &DbConn,
        tag: &tag::Model,
    ) -> Result<Vec<post::Model>, DbErr> {
        tag.find_related(post::Entity)
            .order_by_asc(post::Column::Id)
            .all(db)
            .await
    }
}
