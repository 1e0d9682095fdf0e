use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    application::{
        auth::Viewer,
        error::{ErrorReport, HttpError},
        forms::FormErrors,
        pagination::Paginated,
    },
    domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord},
};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

/// Render a template to a string, for fragments that are embedded or cached.
pub fn render_fragment<T: Template>(template: &T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_fragment",
            "Template rendering failed",
            err,
        )
    })
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub fn format_timestamp(value: OffsetDateTime) -> String {
    value.format(DATE_FORMAT).unwrap_or_default()
}

#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
}

/// Per-request page furniture: site title and who is signed in.
#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: String,
    pub page_title: String,
    pub viewer: Option<ViewerView>,
}

impl LayoutChrome {
    pub fn new(site_title: impl Into<String>, viewer: Option<&Viewer>) -> Self {
        let site_title = site_title.into();
        Self {
            page_title: site_title.clone(),
            site_title,
            viewer: viewer.map(|viewer| ViewerView {
                username: viewer.username.clone(),
            }),
        }
    }

    pub fn with_title(self, title: impl AsRef<str>) -> Self {
        let page_title = format!("{} | {}", title.as_ref(), self.site_title);
        Self { page_title, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub site_title: String,
    pub page_title: String,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            site_title: chrome.site_title,
            page_title: chrome.page_title,
            viewer: chrome.viewer,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub slug: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub published: String,
    pub author: Option<String>,
    pub group: Option<GroupLinkView>,
    pub image_url: Option<String>,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            published: format_timestamp(post.pub_date),
            author: post.author_username.clone(),
            group: post.group.as_ref().map(|group| GroupLinkView {
                title: group.title.clone(),
                slug: group.slug.clone(),
            }),
            image_url: post.image.as_deref().map(media_url),
        }
    }
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{}", stored_path.trim_start_matches('/'))
}

#[derive(Clone)]
pub struct PageLinkView {
    pub number: u32,
    pub current: bool,
}

#[derive(Clone)]
pub struct PaginatorView {
    pub previous: Option<u32>,
    pub next: Option<u32>,
    /// `None` marks an elided run of pages.
    pub links: Vec<Option<PageLinkView>>,
    pub total_pages: u32,
}

impl PaginatorView {
    pub fn from_page<T>(page: &Paginated<T>) -> Self {
        let links = page
            .page_links()
            .into_iter()
            .map(|link| {
                link.map(|number| PageLinkView {
                    number,
                    current: number == page.number,
                })
            })
            .collect();
        Self {
            previous: page.previous_page_number(),
            next: page.next_page_number(),
            links,
            total_pages: page.total_pages,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.total_pages > 1
    }
}

/// The post list plus paginator shared by every feed page.
#[derive(Template)]
#[template(path = "partials/feed.html")]
pub struct FeedBodyTemplate {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
    pub show_groups: bool,
}

impl FeedBodyTemplate {
    pub fn from_page(page: &Paginated<PostRecord>, show_groups: bool) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView::from_page(page),
            show_groups,
        }
    }
}

pub struct FeedPageView {
    pub heading: String,
    pub body_html: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedPageView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedPageView>,
}

pub struct GroupPageView {
    pub title: String,
    pub description: String,
    pub body_html: String,
}

impl GroupPageView {
    pub fn new(group: &GroupRecord, body_html: String) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            body_html,
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupPageView>,
}

pub struct ProfilePageView {
    pub username: String,
    pub display_name: String,
    pub post_count: u64,
    pub following: bool,
    /// Follow controls are offered to signed-in viewers other than the author.
    pub show_follow_controls: bool,
    pub body_html: String,
}

impl ProfilePageView {
    pub fn new(
        author: &UserRecord,
        post_count: u64,
        following: bool,
        show_follow_controls: bool,
        body_html: String,
    ) -> Self {
        Self {
            username: author.username.clone(),
            display_name: author.display_name(),
            post_count,
            following,
            show_follow_controls,
            body_html,
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfilePageView>,
}

/// One form input with its submitted value and messages.
#[derive(Clone, Default)]
pub struct FieldView {
    pub value: String,
    pub errors: Vec<String>,
}

impl FieldView {
    pub fn new(value: impl Into<String>, errors: &FormErrors, name: &str) -> Self {
        Self {
            value: value.into(),
            errors: errors.for_field(name).to_vec(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct CommentView {
    pub author: String,
    pub text: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author_username.clone(),
            text: comment.text.clone(),
            created: format_timestamp(comment.created),
        }
    }
}

pub struct PostDetailView {
    pub post: PostCard,
    pub author_post_count: u64,
    pub can_edit: bool,
    pub comments: Vec<CommentView>,
    /// Present for signed-in viewers.
    pub comment_form: Option<FieldView>,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

pub struct GroupOptionView {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: FieldView,
    pub group_errors: Vec<String>,
    pub groups: Vec<GroupOptionView>,
    pub image_errors: Vec<String>,
    pub current_image: Option<String>,
    pub non_field_errors: Vec<String>,
}

impl PostFormView {
    /// `selected_group` is the raw select value, so a rejected choice stays
    /// selected when the form is shown again.
    pub fn new(
        action: impl Into<String>,
        is_edit: bool,
        text: &str,
        selected_group: Option<&str>,
        groups: &[GroupRecord],
        current_image: Option<&str>,
        errors: &FormErrors,
    ) -> Self {
        let selected = selected_group.map(str::trim).unwrap_or_default();
        Self {
            is_edit,
            action: action.into(),
            text: FieldView::new(text, errors, "text"),
            group_errors: errors.for_field("group").to_vec(),
            groups: groups
                .iter()
                .map(|group| GroupOptionView {
                    id: group.id,
                    title: group.title.clone(),
                    selected: group.id.to_string() == selected,
                })
                .collect(),
            image_errors: errors.for_field("image").to_vec(),
            current_image: current_image.map(media_url),
            non_field_errors: errors.non_field().to_vec(),
        }
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct LoginView {
    pub username: FieldView,
    pub next: String,
    pub non_field_errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

pub struct SignupView {
    pub first_name: FieldView,
    pub last_name: FieldView,
    pub username: FieldView,
    pub email: FieldView,
    pub password1_errors: Vec<String>,
    pub password2_errors: Vec<String>,
    pub non_field_errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupView>,
}

#[derive(Template)]
#[template(path = "logout_confirm.html")]
pub struct LogoutConfirmTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "logged_out.html")]
pub struct LoggedOutTemplate {
    pub view: LayoutContext<()>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::{PageNumber, Paginated};
    use crate::domain::entities::GroupSummary;
    use time::macros::datetime;

    fn post(id: i64) -> PostRecord {
        PostRecord {
            id,
            text: format!("Post <{id}>"),
            pub_date: datetime!(2024-03-05 14:07 UTC),
            author_id: Some(1),
            author_username: Some("leo".to_string()),
            group: Some(GroupSummary {
                id: 7,
                title: "Cats".to_string(),
                slug: "cats".to_string(),
            }),
            image: Some("posts/2024/03/05/a.gif".to_string()),
        }
    }

    #[test]
    fn post_card_formats_date_and_media_url() {
        let card = PostCard::from(&post(1));
        assert_eq!(card.published, "05 Mar 2024 14:07");
        assert_eq!(card.image_url.as_deref(), Some("/media/posts/2024/03/05/a.gif"));
        assert_eq!(card.group.map(|g| g.slug), Some("cats".to_string()));
    }

    #[test]
    fn feed_body_escapes_post_text() {
        let page = Paginated::from_vec(vec![post(1)], PageNumber::FIRST, 10);
        let html = render_fragment(&FeedBodyTemplate::from_page(&page, true)).unwrap();
        assert!(html.contains("Post &#60;1&#62;") || html.contains("Post &lt;1&gt;"));
        assert!(!html.contains("Post <1>"));
    }

    #[test]
    fn paginator_marks_current_page() {
        let posts = (1..=25).map(post).collect::<Vec<_>>();
        let page = Paginated::from_vec(posts, PageNumber::new(2), 10);
        let paginator = PaginatorView::from_page(&page);
        assert!(paginator.is_visible());
        assert_eq!(paginator.previous, Some(1));
        assert_eq!(paginator.next, Some(3));
        let current = paginator
            .links
            .iter()
            .flatten()
            .find(|link| link.current)
            .map(|link| link.number);
        assert_eq!(current, Some(2));
    }

    #[test]
    fn chrome_title_includes_site_name() {
        let viewer = Viewer {
            id: 1,
            username: "leo".to_string(),
        };
        let chrome = LayoutChrome::new("Yatube", Some(&viewer)).with_title("Cats");
        assert_eq!(chrome.page_title, "Cats | Yatube");
        assert_eq!(chrome.viewer.map(|v| v.username), Some("leo".to_string()));
    }
}
