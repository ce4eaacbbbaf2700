//! Command-line front end: argument parsing, output rendering and the
//! command runner. `main.rs` only wires configuration and adapters.

use std::sync::Arc;

use anyhow::{Context, bail};
use thiserror::Error;
use tracing::info;

use precinct_auth::{Menu, Notification, Notifier, Role, SessionController, Severity};
use precinct_records::{PoliceStation, RecordRepository, RecordService};

pub const USAGE: &str = "usage:
  precinct-console login <email> <password>
  precinct-console register <email> <password> <police|civilian> [display name]
  precinct-console stations [query]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        role: Role,
        display_name: Option<String>,
    },
    Stations {
        query: Option<String>,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("no command given")]
    MissingCommand,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("role must be \"police\" or \"civilian\", got {0:?}")]
    InvalidRole(String),
}

impl Command {
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let name = args.next().ok_or(UsageError::MissingCommand)?;
        let mut next = |what: &'static str| args.next().ok_or(UsageError::MissingArgument(what));

        match name.as_str() {
            "login" => Ok(Command::Login {
                email: next("email")?,
                password: next("password")?,
            }),
            "register" => {
                let email = next("email")?;
                let password = next("password")?;
                let raw_role = next("role")?;
                let role = Role::parse(&raw_role).ok_or(UsageError::InvalidRole(raw_role))?;
                let rest: Vec<String> = args.collect();
                let display_name = Some(rest.join(" ")).filter(|n| !n.trim().is_empty());
                Ok(Command::Register {
                    email,
                    password,
                    role,
                    display_name,
                })
            }
            "stations" => {
                let query = Some(args.collect::<Vec<_>>().join(" ")).filter(|q| !q.trim().is_empty());
                Ok(Command::Stations { query })
            }
            other => Err(UsageError::UnknownCommand(other.to_string())),
        }
    }
}

/// Prints each notification as one line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, notification: Notification) {
        println!("{}", render_notification(&notification));
    }
}

pub fn render_notification(notification: &Notification) -> String {
    let marker = match notification.severity {
        Severity::Info => "*",
        Severity::Destructive => "!",
    };
    format!("{marker} {}: {}", notification.title, notification.description)
}

pub fn render_menu(menu: &Menu) -> String {
    let mut out = String::new();
    if let Some(label) = menu.user_label() {
        out.push_str(&format!("Signed in as {label}\n"));
    }
    for item in menu.items() {
        out.push_str(&format!("  {:<20} {}\n", item.title, item.href));
    }
    out
}

pub fn render_stations(stations: &[PoliceStation]) -> String {
    if stations.is_empty() {
        return "No police stations found\n".to_string();
    }
    let mut out = String::new();
    for station in stations {
        out.push_str(&format!("{} ({}, {})\n", station.name, station.city, station.state));
        if let Some(phone) = &station.phone {
            out.push_str(&format!("  phone: {phone}\n"));
        }
        for officer in &station.officers {
            out.push_str(&format!("  {} - {}\n", officer.rank, officer.name));
        }
    }
    out
}

/// Run one command against a started session.
pub async fn run(
    command: Command,
    controller: &SessionController,
    records: Arc<dyn RecordRepository>,
) -> anyhow::Result<()> {
    controller.settled().await;
    let menu = Menu::new(controller.subscribe());

    match command {
        Command::Login { email, password } => {
            if !controller.login(&email, &password).await {
                bail!("login failed");
            }
            let session = controller.settled().await;
            info!(role = ?session.role(), "session ready");
            print!("{}", render_menu(&menu));
        }
        Command::Register {
            email,
            password,
            role,
            display_name,
        } => {
            if !controller
                .register(&email, &password, role, display_name.as_deref())
                .await
            {
                bail!("registration failed");
            }
            controller.settled().await;
            print!("{}", render_menu(&menu));
        }
        Command::Stations { query } => {
            let service = RecordService::new(records, controller.subscribe());
            let stations = service
                .search_stations(query.as_deref().unwrap_or_default())
                .await
                .context("loading police stations")?;
            print!("{}", render_stations(&stations));
        }
    }
    Ok(())
}
