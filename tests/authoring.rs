//! Sign-up, log-in, post and comment authoring, and follow flows.

mod support;

use axum::http::StatusCode;
use support::{GIF_1X1, PASSWORD, TestApp};

#[tokio::test]
async fn create_requires_login() {
    let app = TestApp::without_cache();

    let response = app.get("/create/", None).await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/auth/login/?next=%2Fcreate%2F"));
}

#[tokio::test]
async fn mutating_routes_redirect_anonymous_users() {
    let app = TestApp::without_cache();
    let (author, _) = app.sign_up("leo").await;
    let post = app.store.add_post(author.id, "a post", None);

    let comment = app
        .post_form(&format!("/posts/{}/comment/", post.id), None, "text=hi")
        .await;
    assert_eq!(comment.status, StatusCode::SEE_OTHER);
    assert_eq!(
        comment.location(),
        Some(format!("/auth/login/?next=%2Fposts%2F{}%2Fcomment%2F", post.id).as_str())
    );

    let follow = app.post_form("/profile/leo/follow/", None, "").await;
    assert_eq!(follow.status, StatusCode::SEE_OTHER);
    assert_eq!(
        follow.location(),
        Some("/auth/login/?next=%2Fprofile%2Fleo%2Ffollow%2F")
    );

    let edit = app.get(&format!("/posts/{}/edit/", post.id), None).await;
    assert_eq!(edit.status, StatusCode::SEE_OTHER);
    assert_eq!(app.store.comment_count(), 0);
    assert_eq!(app.store.follow_count(), 0);
}

#[tokio::test]
async fn anonymous_post_bodies_are_not_parsed_before_login() {
    let app = TestApp::without_cache();
    let (author, _) = app.sign_up("leo").await;
    let post = app.store.add_post(author.id, "a post", None);

    let create = app.post_form("/create/", None, "text=hi").await;
    assert_eq!(create.status, StatusCode::SEE_OTHER);
    assert_eq!(create.location(), Some("/auth/login/?next=%2Fcreate%2F"));

    let edit = app
        .post_form(&format!("/posts/{}/edit/", post.id), None, "text=hi")
        .await;
    assert_eq!(edit.status, StatusCode::SEE_OTHER);
    assert_eq!(
        edit.location(),
        Some(format!("/auth/login/?next=%2Fposts%2F{}%2Fedit%2F", post.id).as_str())
    );

    let multipart = app
        .post_multipart("/create/", None, &[("text", None, b"sneaky".as_slice())])
        .await;
    assert_eq!(multipart.status, StatusCode::SEE_OTHER);
    assert_eq!(multipart.location(), Some("/auth/login/?next=%2Fcreate%2F"));

    let comment = app
        .post_multipart(
            &format!("/posts/{}/comment/", post.id),
            None,
            &[("text", None, b"hi".as_slice())],
        )
        .await;
    assert_eq!(comment.status, StatusCode::SEE_OTHER);

    assert_eq!(app.store.post_count(), 1);
    assert_eq!(app.store.post(post.id).unwrap().text, "a post");
    assert_eq!(app.store.comment_count(), 0);
}

#[tokio::test]
async fn signup_logs_the_user_in() {
    let app = TestApp::without_cache();

    let response = app
        .post_form(
            "/auth/signup/",
            None,
            "first_name=Leo&last_name=Tolstoy&username=leo&email=leo%40example.com\
             &password1=war-and-peace-1869&password2=war-and-peace-1869",
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));
    let cookie = response.session_cookie().expect("session cookie");

    let home = app.get("/", Some(&cookie)).await;
    assert!(home.body.contains("/profile/leo/"));
    assert!(home.body.contains("Log out"));
}

#[tokio::test]
async fn signup_rejects_mismatched_passwords() {
    let app = TestApp::without_cache();

    let response = app
        .post_form(
            "/auth/signup/",
            None,
            "username=leo&email=leo%40example.com&password1=war-and-peace-1869&password2=other-pass-1869",
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("The two password fields didn"));
    assert!(response.session_cookie().is_none());
    assert!(response.body.contains("value=\"leo\""));
}

#[tokio::test]
async fn login_redirects_to_local_next_only() {
    let app = TestApp::without_cache();
    app.sign_up("leo").await;

    let local = app
        .post_form(
            "/auth/login/",
            None,
            &format!("username=leo&password={PASSWORD}&next=%2Fcreate%2F"),
        )
        .await;
    assert_eq!(local.status, StatusCode::SEE_OTHER);
    assert_eq!(local.location(), Some("/create/"));
    assert!(local.session_cookie().is_some());

    let foreign = app
        .post_form(
            "/auth/login/",
            None,
            &format!("username=leo&password={PASSWORD}&next=https%3A%2F%2Fevil.example%2F"),
        )
        .await;
    assert_eq!(foreign.location(), Some("/"));
}

#[tokio::test]
async fn login_with_wrong_password_rerenders_form() {
    let app = TestApp::without_cache();
    app.sign_up("leo").await;

    let response = app
        .post_form("/auth/login/", None, "username=leo&password=nope-nope-nope")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Please enter a correct username and password"));
    assert!(response.session_cookie().is_none());
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;

    let response = app.post_form("/auth/logout/", Some(&cookie), "").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Logged out"));

    let after = app.get("/create/", Some(&cookie)).await;
    assert_eq!(after.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn logout_link_only_asks_for_confirmation() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;

    let confirm = app.get("/auth/logout/", Some(&cookie)).await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert!(confirm.body.contains("You are signed in as leo."));
    assert!(confirm.session_cookie().is_none());

    let still_signed_in = app.get("/create/", Some(&cookie)).await;
    assert_eq!(still_signed_in.status, StatusCode::OK);
}

#[tokio::test]
async fn expired_sessions_are_anonymous() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;
    app.store.expire_sessions();

    let response = app.get("/create/", Some(&cookie)).await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn create_post_assigns_the_signed_in_author() {
    let app = TestApp::without_cache();
    let (author, cookie) = app.sign_up("leo").await;
    let (other, _) = app.sign_up("mia").await;
    let cats = app.store.add_group("Cats", "cats");
    let group_id = cats.id.to_string();
    let other_id = other.id.to_string();

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("text", None, b"A brand new post".as_slice()),
                ("group", None, group_id.as_bytes()),
                ("author", None, other_id.as_bytes()),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/profile/leo/"));
    assert_eq!(app.store.posts_by(author.id), 1);
    assert_eq!(app.store.posts_by(other.id), 0);

    let group_page = app.get("/group/cats/", None).await;
    assert!(group_page.body.contains("A brand new post"));
}

#[tokio::test]
async fn create_post_with_image_serves_it_from_media() {
    let app = TestApp::without_cache();
    let (author, cookie) = app.sign_up("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("text", None, b"Post with a picture".as_slice()),
                ("group", None, b"".as_slice()),
                ("image", Some("small.gif"), GIF_1X1),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let home = app.get("/", None).await;
    let start = home.body.find("/media/posts/").expect("image url in feed");
    let end = start + home.body[start..].find('"').unwrap();
    let media_url = &home.body[start..end];
    assert!(media_url.ends_with("-small.gif"));

    let image = app.get(media_url, None).await;
    assert_eq!(image.status, StatusCode::OK);
    assert_eq!(
        image.headers.get("content-type").unwrap().to_str().unwrap(),
        "image/gif"
    );
    assert_eq!(app.store.posts_by(author.id), 1);
}

#[tokio::test]
async fn over_length_post_rerenders_form_and_creates_nothing() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;
    let text = "x".repeat(201);

    let response = app
        .post_multipart("/create/", Some(&cookie), &[("text", None, text.as_bytes())])
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(
        response
            .body
            .contains("Ensure this value has at most 200 characters (it has 201).")
    );
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn non_image_upload_rerenders_form_and_creates_nothing() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("text", None, b"Has an attachment".as_slice()),
                ("image", Some("notes.txt"), b"just some text".as_slice()),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Upload a valid image."));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn unknown_group_choice_is_a_field_error() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("text", None, b"Valid text".as_slice()),
                ("group", None, b"4242".as_slice()),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Select a valid choice"));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn author_can_edit_and_keeps_image() {
    let app = TestApp::without_cache();
    let (author, cookie) = app.sign_up("leo").await;
    app.post_multipart(
        "/create/",
        Some(&cookie),
        &[
            ("text", None, b"Original text".as_slice()),
            ("image", Some("pic.gif"), GIF_1X1),
        ],
    )
    .await;
    let post = app
        .store
        .post(app.store.latest_post_id().unwrap())
        .unwrap();
    let image = post.image.clone().expect("stored image");

    let form = app.get(&format!("/posts/{}/edit/", post.id), Some(&cookie)).await;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.body.contains("Original text"));

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", post.id),
            Some(&cookie),
            &[
                ("text", None, b"Edited text".as_slice()),
                ("image", Some(""), b"".as_slice()),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some(format!("/posts/{}/", post.id).as_str()));
    let updated = app.store.post(post.id).unwrap();
    assert_eq!(updated.text, "Edited text");
    assert_eq!(updated.image.as_deref(), Some(image.as_str()));
    assert_eq!(updated.author_id, Some(author.id));
}

#[tokio::test]
async fn non_author_edit_redirects_to_detail() {
    let app = TestApp::without_cache();
    let (author, _) = app.sign_up("leo").await;
    let (_, intruder_cookie) = app.sign_up("mia").await;
    let post = app.store.add_post(author.id, "Not yours", None);

    let form = app
        .get(&format!("/posts/{}/edit/", post.id), Some(&intruder_cookie))
        .await;
    assert_eq!(form.status, StatusCode::FOUND);
    assert_eq!(form.location(), Some(format!("/posts/{}/", post.id).as_str()));

    let submit = app
        .post_multipart(
            &format!("/posts/{}/edit/", post.id),
            Some(&intruder_cookie),
            &[("text", None, b"Hijacked".as_slice())],
        )
        .await;
    assert_eq!(submit.status, StatusCode::FOUND);
    assert_eq!(submit.location(), Some(format!("/posts/{}/", post.id).as_str()));
    assert_eq!(app.store.post(post.id).unwrap().text, "Not yours");
}

#[tokio::test]
async fn empty_comment_rerenders_detail_with_error() {
    let app = TestApp::without_cache();
    let (author, cookie) = app.sign_up("leo").await;
    let post = app.store.add_post(author.id, "Comment on me", None);

    let response = app
        .post_form(&format!("/posts/{}/comment/", post.id), Some(&cookie), "text=+++")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("This field is required."));
    assert_eq!(app.store.comment_count(), 0);
}

#[tokio::test]
async fn following_twice_creates_one_row() {
    let app = TestApp::without_cache();
    let (reader, cookie) = app.sign_up("reader").await;
    let (author, _) = app.sign_up("author").await;

    for _ in 0..2 {
        let response = app.post_form("/profile/author/follow/", Some(&cookie), "").await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/profile/author/"));
    }

    assert_eq!(app.store.follow_rows(reader.id, author.id), 1);

    let profile = app.get("/profile/author/", Some(&cookie)).await;
    assert!(profile.body.contains("/profile/author/unfollow/"));
}

#[tokio::test]
async fn self_follow_creates_nothing() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("leo").await;

    let response = app.post_form("/profile/leo/follow/", Some(&cookie), "").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/profile/leo/"));
    assert_eq!(app.store.follow_count(), 0);
}

#[tokio::test]
async fn unfollow_is_idempotent() {
    let app = TestApp::without_cache();
    let (reader, cookie) = app.sign_up("reader").await;
    let (author, _) = app.sign_up("author").await;

    let never_followed = app
        .post_form("/profile/author/unfollow/", Some(&cookie), "")
        .await;
    assert_eq!(never_followed.status, StatusCode::SEE_OTHER);

    app.post_form("/profile/author/follow/", Some(&cookie), "")
        .await;
    assert_eq!(app.store.follow_rows(reader.id, author.id), 1);

    app.post_form("/profile/author/unfollow/", Some(&cookie), "")
        .await;
    assert_eq!(app.store.follow_rows(reader.id, author.id), 0);

    let ghost = app
        .post_form("/profile/ghost/unfollow/", Some(&cookie), "")
        .await;
    assert_eq!(ghost.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn following_an_unknown_user_is_not_found() {
    let app = TestApp::without_cache();
    let (_, cookie) = app.sign_up("reader").await;

    let response = app.post_form("/profile/ghost/follow/", Some(&cookie), "").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.follow_count(), 0);
}
