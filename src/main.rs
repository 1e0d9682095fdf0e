use std::{process, sync::Arc};

use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        auth::AuthService,
        error::AppError,
        feed::FeedService,
        follow::FollowService,
        operator::{NewGroup, OperatorService},
        posts::PostService,
        repos::Repositories,
    },
    cache::{CacheConfig, PageCache},
    config::{self, Command, GroupsCommand, UsersCommand},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, SiteOptions},
        telemetry,
        uploads::MediaStorage,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Groups(args) => run_groups(settings, args.command).await,
        Command::Users(args) => run_users(settings, args.command).await,
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| {
            AppError::from(InfraError::configuration(
                "database.url must be set (YATUBE__DATABASE__URL or --database-url)",
            ))
        })?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Repositories::from_shared(Arc::new(PostgresRepositories::new(
        pool,
    ))))
}

fn build_http_state(
    repos: &Repositories,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let media = Arc::new(
        MediaStorage::new(settings.media.directory.clone())
            .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let feed = FeedService::new(
        repos.posts.clone(),
        repos.groups.clone(),
        repos.users.clone(),
        repos.follows.clone(),
        repos.comments.clone(),
        settings.site.page_size.get(),
    );
    let posts = PostService::new(
        repos.posts.clone(),
        repos.posts_write.clone(),
        repos.groups.clone(),
        repos.comments.clone(),
        media.clone(),
    );
    let follows = FollowService::new(repos.users.clone(), repos.follows.clone());

    let session_ttl = time::Duration::try_from(settings.auth.session_ttl)
        .map_err(|err| AppError::validation(format!("auth.session_ttl_hours: {err}")))?;
    let auth = AuthService::new(repos.users.clone(), repos.sessions.clone(), session_ttl);

    let page_cache = settings
        .cache
        .enabled
        .then(|| Arc::new(PageCache::new(&CacheConfig::from(&settings.cache))));

    let max_request_bytes = usize::try_from(settings.media.max_request_bytes.get())
        .unwrap_or(usize::MAX);

    Ok(HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(posts),
        follows: Arc::new(follows),
        auth: Arc::new(auth),
        media,
        health: repos.health.clone(),
        page_cache,
        site: SiteOptions {
            title: settings.site.title.clone(),
            secure_cookie: settings.auth.secure_cookie,
            max_request_bytes,
        },
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;
    let state = build_http_state(&repos, &settings)?;

    info!(
        target = "yatube::serve",
        cache_enabled = state.page_cache.is_some(),
        cache_ttl_secs = settings.cache.index_ttl.as_secs(),
        page_size = settings.site.page_size.get(),
        media = %settings.media.directory.display(),
        "application context ready"
    );

    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "yatube::serve", addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    // once a signal arrives, in-flight requests get `grace` to finish
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "yatube::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out"
            );
        }
    }

    info!(target = "yatube::serve", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "yatube::serve", error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "yatube::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn operator_service(repos: &Repositories) -> OperatorService {
    OperatorService::new(repos.groups.clone(), repos.users.clone())
}

async fn run_groups(settings: config::Settings, command: GroupsCommand) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;
    let operator = operator_service(&repos);

    match command {
        GroupsCommand::Create(args) => {
            let group = operator
                .create_group(NewGroup {
                    title: args.title,
                    slug: args.slug,
                    description: args.description,
                })
                .await?;
            println!("{}\t{}\t{}", group.id, group.slug, group.title);
        }
        GroupsCommand::List(_) => {
            for group in operator.list_groups().await? {
                println!("{}\t{}\t{}", group.id, group.slug, group.title);
            }
        }
        GroupsCommand::Delete(args) => {
            operator.delete_group(&args.slug).await?;
            println!("deleted group {}", args.slug);
        }
    }
    Ok(())
}

async fn run_users(settings: config::Settings, command: UsersCommand) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;
    let operator = operator_service(&repos);

    match command {
        UsersCommand::Delete(args) => {
            operator.delete_user(&args.username).await?;
            println!("deleted user {}", args.username);
        }
    }
    Ok(())
}
