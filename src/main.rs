use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use lectern::{
    application::{
        auth::SharedSecretAuthorizer,
        clock::{Clock, SystemClock},
        coordinator::UpdateCoordinator,
        error::AppError,
        import::{ImportOutcome, import_article},
        render::{TemplateRenderer, ViewRenderer, render_all},
        repos::ArticleStore,
    },
    config,
    domain::content::ContentModel,
    infra::{
        db::PostgresStore,
        error::InfraError,
        http::{self, AdminState, PublicState},
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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
        config::Command::ImportArticle(args) => run_import_article(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let secret = settings
        .admin
        .secret
        .as_deref()
        .ok_or_else(|| InfraError::configuration("admin secret is not configured"))?;
    let authorizer = Arc::new(SharedSecretAuthorizer::new(secret));

    let store: Arc<dyn ArticleStore> = Arc::new(init_store(&settings).await?);

    let articles = store.load_all_articles_with_comments().await?;
    let model = ContentModel::from_articles(articles)?;
    let renderer: Arc<dyn ViewRenderer> = Arc::new(TemplateRenderer::new(&settings.site.title));
    let cache = Arc::new(render_all(renderer.as_ref(), &model, 0)?);
    info!(
        target: "lectern::startup",
        articles = model.len(),
        "content cache populated"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let coordinator = UpdateCoordinator::new(model, store.clone(), renderer, cache.clone(), clock, 0);
    let (handle, coordinator_task) =
        coordinator.spawn(settings.coordinator.queue_capacity.get() as usize);

    let public_router = http::build_router(PublicState {
        cache,
        coordinator: handle.clone(),
        store,
    });
    let admin_router = http::build_admin_router(AdminState {
        coordinator: handle,
        authorizer,
    });

    serve_http(&settings, public_router, admin_router).await?;

    // Routers are gone, so every handle is dropped and the queue drains.
    match tokio::time::timeout(settings.server.graceful_shutdown, coordinator_task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(AppError::unexpected(format!("coordinator task failed: {err}"))),
        Err(_) => warn!(
            target: "lectern::startup",
            "update coordinator did not drain before the shutdown deadline"
        ),
    }

    Ok(())
}

async fn run_import_article(
    settings: config::Settings,
    args: config::ImportArticleArgs,
) -> Result<(), AppError> {
    let store = init_store(&settings).await?;

    let outcome = import_article(&store, &SystemClock, &args.file, args.overwrite).await?;

    match outcome {
        ImportOutcome::Created(id) => println!("created article {id}"),
        ImportOutcome::Updated(id) => println!("updated article {id}"),
        ImportOutcome::Skipped(id) => println!(
            "article {id} already has this title; nothing changed (pass --overwrite to replace it)"
        ),
    }

    Ok(())
}

async fn init_store(settings: &config::Settings) -> Result<PostgresStore, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    PostgresStore::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(PostgresStore::new(pool))
}

async fn serve_http(
    settings: &config::Settings,
    public_router: axum::Router,
    admin_router: axum::Router,
) -> Result<(), AppError> {
    let public_addr = settings.server.public_addr;
    let admin_addr = settings.server.admin_addr;

    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: public_addr,
            source,
        })?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: admin_addr,
            source,
        })?;
    info!(
        target: "lectern::startup",
        public = %public_addr,
        admin = %admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "lectern::startup", error = %err, "failed to listen for shutdown signal");
            return;
        }
        info!(target: "lectern::startup", "shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(
        public_listener,
        public_router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()))
    .into_future();
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()))
        .into_future();

    let servers = async { try_join!(public_server, admin_server).map(|_| ()) };
    let mut servers = std::pin::pin!(servers);
    let mut shutdown = std::pin::pin!(shutdown_requested(shutdown_rx));

    let finished = tokio::select! {
        result = &mut servers => Some(result),
        () = &mut shutdown => None,
    };
    let result = match finished {
        Some(result) => result,
        None => drain(&mut servers, settings.server.graceful_shutdown).await,
    };

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn drain<F>(servers: &mut F, deadline: Duration) -> std::io::Result<()>
where
    F: std::future::Future<Output = std::io::Result<()>> + Unpin,
{
    match tokio::time::timeout(deadline, servers).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                target: "lectern::startup",
                deadline_secs = deadline.as_secs(),
                "connections still open at the shutdown deadline; closing"
            );
            Ok(())
        }
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // A closed channel means the signal task is gone; keep serving.
    if rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
