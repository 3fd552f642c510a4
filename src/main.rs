use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use secret_santa::application::dispatcher::{
    CancelToken, DispatchRequest, LanguageSelection, NotificationDispatcher,
};
use secret_santa::application::service::SecretSantaService;
use secret_santa::config::Settings;
use secret_santa::domain::dispatch::DispatchReport;
use secret_santa::domain::participant::LanguageCode;
use secret_santa::domain::ports::TransportRef;
use secret_santa::error::SantaError;
use secret_santa::infrastructure::json_file::JsonFileStore;
use secret_santa::infrastructure::smtp::SmtpTransport;
use secret_santa::infrastructure::templates::BuiltinCatalog;
use secret_santa::infrastructure::transport::{LogTransport, OutboxTransport};
use secret_santa::interfaces::csv::report_writer::ReportWriter;
use secret_santa::interfaces::csv::roster_reader::RosterReader;
use secret_santa::logging;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the roster, assignment and delivery report
    #[arg(long, global = true, default_value = ".secret-santa")]
    data_dir: PathBuf,

    /// JSON settings file (optional). Defaults apply to missing fields.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a participant
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Preferred language code (ro, en, de, ...)
        #[arg(long)]
        language: Option<String>,
    },
    /// Print the roster as CSV
    List,
    /// Print the number of participants
    Count,
    /// Remove every participant and the current draw
    Clear,
    /// Register participants from a `name,email[,language]` CSV file
    Import { input: PathBuf },
    /// Draw a new assignment and notify every giver
    Draw(DeliveryArgs),
    /// Notify the givers the last draw did not reach
    Resend(DeliveryArgs),
}

#[derive(Args)]
struct DeliveryArgs {
    /// Render every message in this language
    #[arg(long, conflicts_with = "per_participant")]
    language: Option<String>,

    /// Render each message in the giver's preferred language
    #[arg(long)]
    per_participant: bool,

    /// Note from the organizer appended to every message
    #[arg(long)]
    note: Option<String>,

    /// Directory messages are written to (default: <data-dir>/outbox)
    #[arg(long, conflicts_with_all = ["dry_run", "smtp"])]
    outbox: Option<PathBuf>,

    /// Send email through the configured SMTP server (smtp settings or SMTP_* variables)
    #[arg(long, conflicts_with = "dry_run")]
    smtp: bool,

    /// Log messages instead of delivering them
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    max_in_flight: Option<usize>,

    #[arg(long)]
    max_attempts: Option<u32>,

    /// Smallest group a draw is allowed for
    #[arg(long)]
    min_participants: Option<usize>,
}

impl DeliveryArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.max_in_flight {
            settings.max_in_flight = n;
        }
        if let Some(n) = self.max_attempts {
            settings.retry.max_attempts = n;
        }
        if let Some(n) = self.min_participants {
            settings.min_participants = n;
        }
    }

    fn request(&self, settings: &Settings) -> DispatchRequest {
        let language = if self.per_participant {
            LanguageSelection::PerParticipant
        } else {
            let code = self
                .language
                .as_deref()
                .map(LanguageCode::new)
                .unwrap_or_else(|| settings.default_language.clone());
            LanguageSelection::Fixed(code)
        };
        DispatchRequest {
            language,
            custom_note: self.note.clone(),
        }
    }

    fn transport(&self, data_dir: &Path, settings: &Settings) -> Result<TransportRef, SantaError> {
        if self.dry_run {
            return Ok(Arc::new(LogTransport));
        }
        if self.smtp {
            return Ok(Arc::new(SmtpTransport::from_settings(&settings.smtp)?));
        }
        let dir = self.outbox.clone().unwrap_or_else(|| data_dir.join("outbox"));
        Ok(Arc::new(OutboxTransport::open(dir)?))
    }
}

fn build_service(
    store: &JsonFileStore,
    settings: &Settings,
    transport: TransportRef,
) -> SecretSantaService {
    let catalog = Arc::new(BuiltinCatalog::new(settings.default_language.clone()));
    let dispatcher = NotificationDispatcher::new(
        transport,
        catalog,
        settings.retry.clone(),
        settings.max_in_flight,
    );
    SecretSantaService::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        dispatcher,
        settings,
    )
}

async fn print_report(service: &SecretSantaService, report: &DispatchReport) -> Result<()> {
    let roster = service.list_participants().await.into_diagnostic()?;
    ReportWriter::new(io::stdout().lock())
        .write_report(report, &roster)
        .into_diagnostic()?;
    eprintln!(
        "delivered={} failed={} cancelled={}",
        report.delivered(),
        report.failed(),
        report.cancelled()
    );
    Ok(())
}

fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining notifications");
            signal.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level).into_diagnostic()?;

    let mut settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    let store = JsonFileStore::open(&cli.data_dir).into_diagnostic()?;

    match cli.command {
        Command::Add {
            name,
            email,
            language,
        } => {
            let service = build_service(&store, &settings, Arc::new(LogTransport));
            let participant = service
                .add_participant(&name, &email, language.as_deref())
                .await
                .into_diagnostic()?;
            println!("{}", participant.id);
        }
        Command::List => {
            let service = build_service(&store, &settings, Arc::new(LogTransport));
            let roster = service.list_participants().await.into_diagnostic()?;
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            for participant in roster.participants() {
                writer.serialize(participant).into_diagnostic()?;
            }
            writer.flush().into_diagnostic()?;
        }
        Command::Count => {
            let service = build_service(&store, &settings, Arc::new(LogTransport));
            println!("{}", service.count().await.into_diagnostic()?);
        }
        Command::Clear => {
            let service = build_service(&store, &settings, Arc::new(LogTransport));
            let removed = service.clear().await.into_diagnostic()?;
            if removed == 0 {
                eprintln!("No participants to delete.");
            } else {
                eprintln!("Deleted {removed} participant(s).");
            }
        }
        Command::Import { input } => {
            let service = build_service(&store, &settings, Arc::new(LogTransport));
            let file = File::open(input).into_diagnostic()?;
            let (mut added, mut rejected) = (0usize, 0usize);
            for row in RosterReader::new(file).rows() {
                let result = match row {
                    Ok(row) => {
                        service
                            .add_participant(&row.name, &row.email, row.language.as_deref())
                            .await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(_) => added += 1,
                    Err(e) => {
                        rejected += 1;
                        eprintln!("Error importing participant: {}", e);
                    }
                }
            }
            eprintln!("Imported {added} participant(s), rejected {rejected}.");
        }
        Command::Draw(args) => {
            args.apply(&mut settings);
            settings.validate().into_diagnostic()?;
            let transport = args.transport(&cli.data_dir, &settings).into_diagnostic()?;
            let service = build_service(&store, &settings, transport);
            let request = args.request(&settings);

            let cancel = cancel_on_ctrl_c();
            let (_, report) = service.draw(&request, &cancel).await.into_diagnostic()?;
            print_report(&service, &report).await?;
        }
        Command::Resend(args) => {
            args.apply(&mut settings);
            settings.validate().into_diagnostic()?;
            let transport = args.transport(&cli.data_dir, &settings).into_diagnostic()?;
            let service = build_service(&store, &settings, transport);
            let request = args.request(&settings);

            let cancel = cancel_on_ctrl_c();
            let report = service.resend(&request, &cancel).await.into_diagnostic()?;
            print_report(&service, &report).await?;
        }
    }

    Ok(())
}
