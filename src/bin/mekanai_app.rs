use axum::extract::{Path, State};
use axum::http::header::{HOST, REFERER};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use clap::Parser;
use log::{error, info};
use mekanai::modules::backend::HttpBackend;
use mekanai::modules::chrome::NavState;
use mekanai::modules::console::{CrudConsole, GENERAL_TAB};
use mekanai::modules::errors::ConsoleError;
use mekanai::modules::registry::{self, registry};
use mekanai::modules::render::render_html;
use mekanai::modules::serialize::load_console_config;
use mekanai::modules::theme::{FileThemeStore, Theme, ThemeController, ThemeView};
use mekanai::modules::web::{
    self, ConfirmDeletePage, DeleteReply, FormPage, GeneralPage, PageChrome, SaveReply, TablePage,
};
use simplelog::*;
use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type Console = CrudConsole<HttpBackend>;

#[derive(Clone)]
struct AppState {
    console: Arc<Mutex<Console>>,
    theme: Arc<Mutex<ThemeController<FileThemeStore>>>,
    nav: NavState,
}

#[derive(Parser)]
#[command(
    name = "mekanai_app",
    version,
    about = "MekanAI settings console, served over HTTP",
    long_about = None
)]
struct Cli {
    #[arg(short = 'l', long = "log-file", default_value = "mekanai_app.log")]
    log_file: String,

    #[arg(short = 'c', long = "config", default_value = "./console.toml")]
    config: String,
}

fn init_logger(log_path: &str, level: LevelFilter) -> Result<(), Box<dyn Error>> {
    WriteLogger::init(
        level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .build(),
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?,
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_console_config(&cli.config)?;
    init_logger(&cli.log_file, config.level_filter())?;
    registry::validate(registry())?;

    let state = AppState {
        console: Arc::new(Mutex::new(CrudConsole::new(HttpBackend::new(&config.backend)?))),
        theme: Arc::new(Mutex::new(ThemeController::new(FileThemeStore::new(
            config.theme_file.clone(),
        )))),
        nav: NavState::new(config.nav_breakpoint),
    };

    let app = Router::new()
        .route("/", get(|| async { Redirect::to("/settings") }))
        .route("/settings", get(general_page))
        .route("/settings/:entity", get(table_page))
        .route("/settings/:entity/new", get(new_form))
        .route("/settings/:entity/save", post(save_form))
        .route("/settings/:entity/:id/edit", get(edit_form))
        .route(
            "/settings/:entity/:id/delete",
            get(confirm_delete).post(delete_item),
        )
        .route("/theme", post(select_theme))
        .route("/theme/toggle", post(toggle_theme))
        .with_state(state);

    let port = env::var("MEKANAI_APP_PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(config.app_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("MekanAI console running on http://{addr}");
    info!("Listening on {addr}, backend {}", config.backend.base_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs a console operation on the blocking pool; the backend client blocks.
async fn with_console<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Console) -> Result<T, ConsoleError> + Send + 'static,
    T: Send + 'static,
{
    let console = state.console.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = console
            .lock()
            .map_err(|_| ApiError::internal("console state poisoned".to_string()))?;
        op(&mut guard).map_err(ApiError::from)
    })
    .await
    .map_err(|err| ApiError::internal(err.to_string()))?
}

fn theme_view(state: &AppState) -> ThemeView {
    match state.theme.lock() {
        Ok(theme) => theme.view(),
        Err(poisoned) => poisoned.into_inner().view(),
    }
}

fn chrome(state: &AppState, active: &str) -> PageChrome {
    PageChrome::new(active, theme_view(state), state.nav)
}

async fn general_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let (counters, status) = with_console(&state, |console| {
        console.switch_tab(GENERAL_TAB)?;
        Ok((console.load_general_stats(), console.check_sd_status()))
    })
    .await?;

    Ok(Html(render_html(GeneralPage {
        chrome: chrome(&state, GENERAL_TAB),
        counters,
        status,
    })))
}

async fn table_page(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Html<String>, ApiError> {
    let name = entity.clone();
    let table = with_console(&state, move |console| {
        console.switch_tab(&name)?;
        console.render_table()
    })
    .await?;

    Ok(Html(render_html(TablePage {
        chrome: chrome(&state, &entity),
        table,
    })))
}

async fn form_page(
    state: &AppState,
    entity: String,
    id: Option<i64>,
) -> Result<Html<String>, ApiError> {
    let name = entity.clone();
    let (table, form) = with_console(state, move |console| {
        if console.current_table().map(|c| c.name) != Some(name.as_str()) {
            console.switch_tab(&name)?;
        }
        let form = console.open_form(id)?.clone();
        Ok((console.render_table()?, form))
    })
    .await?;

    Ok(Html(render_html(FormPage {
        chrome: chrome(state, &entity),
        table,
        form,
    })))
}

async fn new_form(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Html<String>, ApiError> {
    form_page(&state, entity, None).await
}

async fn edit_form(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, i64)>,
) -> Result<Html<String>, ApiError> {
    form_page(&state, entity, Some(id)).await
}

async fn save_form(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Form(pairs): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let name = entity.clone();
    let reply = with_console(&state, move |console| web::submit_form(console, &name, &pairs)).await?;

    match reply {
        SaveReply::Saved => Ok(Redirect::to(&format!("/settings/{entity}")).into_response()),
        SaveReply::Retry { table, form, alerts } => Ok(Html(render_html(FormPage {
            chrome: chrome(&state, &entity).with_alerts(alerts),
            table,
            form,
        }))
        .into_response()),
    }
}

async fn confirm_delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, i64)>,
) -> Result<Html<String>, ApiError> {
    let config = registry::lookup(&entity)?;
    Ok(Html(render_html(ConfirmDeletePage {
        chrome: chrome(&state, config.name),
        entity: config.name,
        label: config.label,
        id,
    })))
}

async fn delete_item(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, i64)>,
    Form(pairs): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let name = entity.clone();
    let reply = with_console(&state, move |console| web::submit_delete(console, &name, id, &pairs)).await?;

    match reply {
        DeleteReply::Done(outcome) => {
            info!("Delete of {entity} #{id}: {outcome}");
            Ok(Redirect::to(&format!("/settings/{entity}")).into_response())
        }
        DeleteReply::Failed { table, alerts } => Ok(Html(render_html(TablePage {
            chrome: chrome(&state, &entity).with_alerts(alerts),
            table,
        }))
        .into_response()),
    }
}

#[derive(serde::Deserialize)]
struct ThemeForm {
    theme: String,
}

async fn select_theme(
    State(state): State<AppState>,
    Form(form): Form<ThemeForm>,
) -> Result<Redirect, ApiError> {
    let theme = Theme::parse(&form.theme)
        .ok_or_else(|| ApiError::bad_request(format!("unknown theme {:?}", form.theme)))?;
    let mut controller = state
        .theme
        .lock()
        .map_err(|_| ApiError::internal("theme state poisoned".to_string()))?;
    controller.select(theme);
    Ok(Redirect::to(web::FALLBACK_PAGE))
}

async fn toggle_theme(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    let mut controller = state
        .theme
        .lock()
        .map_err(|_| ApiError::internal("theme state poisoned".to_string()))?;
    controller.toggle();
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    Ok(Redirect::to(&web::back_target(header(REFERER), header(HOST))))
}

#[derive(Debug)]
struct ApiError {
    code: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn internal(message: String) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<ConsoleError> for ApiError {
    fn from(err: ConsoleError) -> Self {
        let code = match &err {
            ConsoleError::UnknownEntity { .. } | ConsoleError::RecordGone { .. } => StatusCode::NOT_FOUND,
            ConsoleError::InvalidNumber { .. } => StatusCode::BAD_REQUEST,
            ConsoleError::Transport(_) | ConsoleError::Payload(_) | ConsoleError::Rejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if err.is_configuration() {
            error!("Console configuration error: {err}");
        }
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code, self.message).into_response()
    }
}
