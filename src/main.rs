use std::{process, sync::Arc, time::Duration};

use cortile::{
    application::{
        accounts::AccountService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::{
            CommentsRepo, CreateGroupParams, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo,
            RepoError, SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState, PageCache},
    config,
    domain::slug,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

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
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Groups(args) => run_groups(settings, args).await,
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        comments_repo.clone(),
        follows_repo.clone(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo,
        comments_repo,
    ));
    let follows = Arc::new(FollowService::new(follows_repo));
    let accounts = Arc::new(AccountService::new(users_repo, sessions_repo));

    let upload_storage = Arc::new(
        UploadStorage::new(
            settings.uploads.directory.clone(),
            settings.uploads.max_request_bytes.get(),
        )
        .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let page_cache = if cache_config.enabled {
        Some(CacheState {
            pages: Arc::new(PageCache::new(&cache_config)),
            config: cache_config,
        })
    } else {
        None
    };

    Ok(HttpState {
        feed,
        posts,
        follows,
        accounts,
        db: repositories,
        upload_storage,
        page_cache,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;

    match state.accounts.prune_expired().await {
        Ok(pruned) if pruned > 0 => {
            info!(target = "cortile::server", pruned, "expired sessions removed");
        }
        Ok(_) => {}
        Err(err) => {
            error!(target = "cortile::server", error = %err, "failed to prune expired sessions");
        }
    }

    let upload_body_limit = settings.uploads.max_request_bytes.get() as usize;
    let router = http::build_router(state, upload_body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "cortile::server",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    let _ = signal::ctrl_c().await;
    info!(
        target = "cortile::server",
        grace_seconds = grace.as_secs(),
        "shutdown signal received; draining connections"
    );

    // Hard deadline: exit even if a connection refuses to drain.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        error!(
            target = "cortile::server",
            "graceful shutdown deadline exceeded; exiting"
        );
        process::exit(1);
    });
}

async fn run_groups(
    settings: config::Settings,
    args: config::GroupsArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    match args.command {
        config::GroupsCommand::Add(add) => run_groups_add(repositories, add).await,
        config::GroupsCommand::List => run_groups_list(repositories).await,
    }
}

async fn run_groups_add(
    repositories: Arc<PostgresRepositories>,
    args: config::GroupAddArgs,
) -> Result<(), AppError> {
    let groups: Arc<dyn GroupsRepo> = repositories;

    let slug_value = match args.slug {
        Some(explicit) => {
            if groups.slug_exists(&explicit).await.map_err(repo_to_app)? {
                return Err(AppError::validation(format!(
                    "slug `{explicit}` is already in use"
                )));
            }
            explicit
        }
        None => slug::generate_unique_slug(&args.title, |candidate| {
            let groups = groups.clone();
            let candidate = candidate.to_string();
            async move { groups.slug_exists(&candidate).await.map(|exists| !exists) }
        })
        .await
        .map_err(|err| AppError::validation(err.to_string()))?,
    };

    let group = groups
        .create_group(CreateGroupParams {
            title: args.title,
            slug: slug_value,
            description: args.description.unwrap_or_default(),
        })
        .await
        .map_err(repo_to_app)?;

    info!(
        target = "cortile::groups",
        slug = %group.slug,
        "group created"
    );
    println!("{}  {}", group.slug, group.title);
    Ok(())
}

async fn run_groups_list(repositories: Arc<PostgresRepositories>) -> Result<(), AppError> {
    let groups: Arc<dyn GroupsRepo> = repositories;

    for group in groups.list_all().await.map_err(repo_to_app)? {
        println!("{}  {}", group.slug, group.title);
    }
    Ok(())
}

fn repo_to_app(err: RepoError) -> AppError {
    AppError::unexpected(err.to_string())
}
