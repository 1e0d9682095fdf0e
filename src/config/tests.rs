use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:8000");
    assert_eq!(settings.site.page_size.get(), 10);
    assert_eq!(settings.site.title, "Yatube");
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.index_ttl, Duration::from_secs(20));
    assert_eq!(settings.cache.capacity.get(), DEFAULT_CACHE_CAPACITY);
    assert_eq!(settings.auth.session_ttl, Duration::from_secs(336 * 3600));
    assert!(!settings.auth.secure_cookie);
    assert_eq!(
        settings.media.max_request_bytes.get(),
        DEFAULT_MEDIA_REQUEST_LIMIT_BYTES
    );
    assert!(settings.database.url.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.site.page_size = Some(25);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        site_page_size: Some(5),
        cache_enabled: Some(false),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.site.page_size.get(), 5);
    assert!(!settings.cache.enabled);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.site.page_size = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "site.page_size",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.index_ttl_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.index_ttl_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.auth.session_ttl_hours = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_reported() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid level");
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["yatube"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_groups_create_arguments() {
    let args = CliArgs::parse_from([
        "yatube",
        "groups",
        "create",
        "--database-url",
        "postgres://example",
        "--title",
        "Cats",
        "--description",
        "All about cats",
    ]);

    let command = args.command.expect("groups command");
    assert_eq!(
        command
            .database_override()
            .and_then(|db| db.database_url.as_deref()),
        Some("postgres://example")
    );
    match command {
        Command::Groups(GroupsArgs {
            command: GroupsCommand::Create(create),
        }) => {
            assert_eq!(create.title, "Cats");
            assert!(create.slug.is_none());
            assert_eq!(create.description, "All about cats");
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_groups_delete_and_users_delete() {
    let args = CliArgs::parse_from(["yatube", "groups", "delete", "cats"]);
    match args.command.expect("groups command") {
        Command::Groups(GroupsArgs {
            command: GroupsCommand::Delete(delete),
        }) => assert_eq!(delete.slug, "cats"),
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["yatube", "users", "delete", "Author_User"]);
    match args.command.expect("users command") {
        Command::Users(UsersArgs {
            command: UsersCommand::Delete(delete),
        }) => assert_eq!(delete.username, "Author_User"),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn serve_flags_parse() {
    let args = CliArgs::parse_from([
        "yatube",
        "serve",
        "--cache-enabled",
        "false",
        "--cache-index-ttl-seconds",
        "5",
        "--media-directory",
        "/tmp/media",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(serve.overrides.cache_index_ttl_seconds, Some(5));
            assert_eq!(
                serve.overrides.media_directory.as_deref(),
                Some(std::path::Path::new("/tmp/media"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
