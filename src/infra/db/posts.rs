use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreatePostParams, PageRequest, PostFilter, PostsRepo, PostsWriteRepo, RepoError,
        UpdatePostParams,
    },
    domain::entities::{GroupSummary, PostRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Selects a post row joined with its author and group from a relation
/// aliased `p`, so it also works over a `RETURNING` CTE.
const POST_SELECT: &str = "SELECT p.id, p.text, p.pub_date, p.author_id, \
    u.username AS author_username, p.group_id, g.title AS group_title, \
    g.slug AS group_slug, p.image";

const POST_JOINS: &str = " LEFT JOIN users u ON u.id = p.author_id \
    LEFT JOIN groups g ON g.id = p.group_id";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: Option<i64>,
    author_username: Option<String>,
    group_id: Option<i64>,
    group_title: Option<String>,
    group_slug: Option<String>,
    image: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupSummary { id, title, slug }),
            _ => None,
        };
        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author_id: row.author_id,
            author_username: row.author_username,
            group,
            image: row.image,
        }
    }
}

impl PostgresRepositories {
    fn push_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: PostFilter) {
        match filter {
            PostFilter::All => {}
            PostFilter::Group(group_id) => {
                qb.push(" WHERE p.group_id = ").push_bind(group_id);
            }
            PostFilter::Author(author_id) => {
                qb.push(" WHERE p.author_id = ").push_bind(author_id);
            }
            PostFilter::FollowedBy(user_id) => {
                qb.push(" WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        filter: PostFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
        qb.push(" FROM posts p");
        qb.push(POST_JOINS);
        Self::push_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        Self::push_post_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("{POST_SELECT} FROM posts p{POST_JOINS} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH p AS ( \
                INSERT INTO posts (text, author_id, group_id, image) \
                VALUES ($1, $2, $3, $4) \
                RETURNING * \
             ) {POST_SELECT} FROM p{POST_JOINS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(&params.text)
            .bind(params.author_id)
            .bind(params.group_id)
            .bind(&params.image)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH p AS ( \
                UPDATE posts SET text = $2, group_id = $3, image = $4 \
                WHERE id = $1 \
                RETURNING * \
             ) {POST_SELECT} FROM p{POST_JOINS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id)
            .bind(&params.text)
            .bind(params.group_id)
            .bind(&params.image)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}
