use clap::{Parser, Subcommand};
use log::{error, info};
use mekanai::modules::backend::HttpBackend;
use mekanai::modules::chrome::{call_api, Notifier};
use mekanai::modules::console::{CrudConsole, InputValue, Interaction};
use mekanai::modules::registry::{self, registry};
use mekanai::modules::render::{ControlKind, TableView};
use mekanai::modules::serialize::load_console_config;
use mekanai::modules::theme::{FileThemeStore, Theme, ThemeController};
use mekanai::modules::types::MutationOutcome;
use serde_json::Value;
use simplelog::*;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(
    name = "mekanai",
    version,
    about = "MekanAI settings console",
    long_about = "Manage MekanAI styles, scenes, perspectives, lighting presets, aspect ratios, \
                  AI providers, AI models and generation modes from the terminal."
)]
struct Cli {
    #[arg(short = 'l', long = "log-file", default_value = "mekanai.log")]
    log_file: String,

    #[arg(short = 'c', long = "config", default_value = "./console.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the entity types the console manages
    Tables,
    /// Show the rows of one entity
    List { entity: String },
    /// Show the form an entity would render, with its current values
    Form {
        entity: String,
        #[arg(long)]
        id: Option<i64>,
    },
    /// Create a record; fields not given keep their defaults
    Create {
        entity: String,
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Update a record; fields not given keep their stored values
    Update {
        entity: String,
        id: i64,
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Delete a record
    Delete {
        entity: String,
        id: i64,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Record counts for every entity
    Stats,
    /// Whether the image-generation backend is reachable
    SdStatus,
    /// Show, toggle or set the display theme
    Theme { value: Option<String> },
    /// POST a JSON body to any backend endpoint and print the reply
    Call { endpoint: String, body: String },
}

struct Terminal {
    assume_yes: bool,
}

impl Interaction for Terminal {
    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{message} [y/N] ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
            Err(_) => false,
        }
    }

    fn alert(&mut self, message: &str) {
        eprintln!("{message}");
    }
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

fn print_table(view: &TableView) {
    println!("{}", view.title);
    if let Some(err) = &view.error {
        println!("(could not refresh: {err})");
    }
    let headers: Vec<&str> = view.headers.iter().map(|h| h.label).collect();
    println!("{}", headers.join(" | "));
    if view.is_empty() {
        println!("(no records)");
    }
    for row in &view.rows {
        let cells: Vec<&str> = row.cells.iter().map(|c| c.text.as_str()).collect();
        println!("{}", cells.join(" | "));
    }
}

fn parse_assignments(set: &[String]) -> Result<Vec<(String, String)>, Box<dyn Error>> {
    set.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| format!("expected KEY=VALUE, got {pair:?}").into())
        })
        .collect()
}

fn submit(
    console: &mut CrudConsole<HttpBackend>,
    entity: &str,
    id: Option<i64>,
    set: &[String],
    ui: &mut Terminal,
) -> Result<MutationOutcome, Box<dyn Error>> {
    console.load_table(entity)?;
    let mut input = console.open_form(id)?.to_input();
    let config = registry::lookup(entity)?;
    for (key, value) in parse_assignments(set)? {
        if config.field(&key).is_none() {
            return Err(format!("{entity} has no field {key}").into());
        }
        input.set(key, InputValue::Text(value));
    }
    Ok(console.save_form(&input, ui)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_console_config(&cli.config)?;
    init_logger(&cli.log_file, config.level_filter())?;
    registry::validate(registry())?;

    let mut ui = Terminal { assume_yes: false };
    let mut console = CrudConsole::new(HttpBackend::new(&config.backend)?);

    match cli.command {
        Command::Tables => {
            for entry in registry() {
                println!("{:<14}{}", entry.name, entry.label);
            }
        }
        Command::List { entity } => {
            if let Err(err) = console.load_table(&entity) {
                error!("Listing {entity} failed: {err}");
                return Err(err.into());
            }
            print_table(&console.render_table()?);
        }
        Command::Form { entity, id } => {
            console.load_table(&entity)?;
            let form = console.open_form(id)?;
            println!("{}", form.title);
            for control in &form.controls {
                let value = match &control.kind {
                    ControlKind::Input { value, .. } | ControlKind::TextArea { value } => value.clone(),
                    ControlKind::Select { options } | ControlKind::ForeignKey { options } => options
                        .iter()
                        .map(|o| {
                            let mark = if o.selected { "*" } else { "" };
                            format!("{mark}{}={}", o.value, o.label)
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                    ControlKind::Toggle { checked } => checked.to_string(),
                };
                let required = if control.required { " (required)" } else { "" };
                println!("{:<20}{value}{required}", control.key);
            }
        }
        Command::Create { entity, set } => {
            let outcome = submit(&mut console, &entity, None, &set, &mut ui)?;
            info!("create {entity}: {outcome}");
            println!("{outcome}");
        }
        Command::Update { entity, id, set } => {
            let outcome = submit(&mut console, &entity, Some(id), &set, &mut ui)?;
            info!("update {entity} #{id}: {outcome}");
            println!("{outcome}");
        }
        Command::Delete { entity, id, yes } => {
            ui.assume_yes = yes;
            console.load_table(&entity)?;
            let outcome = console.delete_item(id, &mut ui)?;
            info!("delete {entity} #{id}: {outcome}");
            println!("{outcome}");
        }
        Command::Stats => {
            for counter in console.load_general_stats() {
                println!("{:<16}{}", counter.label, counter.value);
            }
        }
        Command::SdStatus => {
            let status = console.check_sd_status();
            println!("{}", status.badge);
            if let Some(models) = status.models {
                println!("{models}");
            }
        }
        Command::Theme { value } => {
            let mut theme = ThemeController::new(FileThemeStore::new(&config.theme_file));
            let view = match value.as_deref() {
                None => theme.view(),
                Some("toggle") => theme.toggle(),
                Some(other) => {
                    let chosen = Theme::parse(other)
                        .ok_or_else(|| format!("unknown theme {other:?}, use dark, light or toggle"))?;
                    theme.select(chosen)
                }
            };
            println!("{}", view.label);
        }
        Command::Call { endpoint, body } => {
            let data: Value = serde_json::from_str(&body)?;
            let mut notifier = Notifier::default();
            match call_api(console.backend(), &mut notifier, &endpoint, &data) {
                Some(reply) => println!("{}", serde_json::to_string_pretty(&reply)?),
                None => {
                    let message = notifier.last().map(|(_, m)| m.to_string()).unwrap_or_default();
                    return Err(message.into());
                }
            }
        }
    }

    Ok(())
}
