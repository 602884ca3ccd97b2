use anyhow::Result;
use clap::Parser;
use image_format_converter::app::App;
use image_format_converter::models::{Config, ConversionBackend, Format, Platform};
use image_format_converter::persist::{DownloadRequest, DEFAULT_FILENAME_HINT};
use image_format_converter::session::{ConversionSession, ConvertOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-format-converter")]
#[command(about = "Convert images to PNG, JPG or WebP")]
struct CliArgs {
    /// Runtime environment; overrides PLATFORM.
    #[arg(long, value_enum)]
    platform: Option<Platform>,

    /// Conversion backend; overrides CONVERSION_BACKEND.
    #[arg(long, value_enum)]
    backend: Option<ConversionBackend>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Select(String),
    Format(Format),
    Convert,
    Download(Option<String>),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "select" if !arg.is_empty() => Ok(Command::Select(arg.to_string())),
        "select" => Err("Usage: select <image path or URL>".to_string()),
        "format" => arg
            .parse()
            .map(Command::Format)
            .map_err(|e: image_format_converter::Error| e.to_string()),
        "convert" => Ok(Command::Convert),
        "download" if arg.is_empty() => Ok(Command::Download(None)),
        "download" => Ok(Command::Download(Some(arg.to_string()))),
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command '{}'. Type 'help'.", other)),
    }
}

const HELP: &str = "\
Commands:
  select <path|url>        pick the image to convert
  format <png|jpg|webp>    choose the target format
  convert                  convert the selected image
  download [name]          save the converted image
  status                   show the session
  quit";

fn print_status(session: &ConversionSession) {
    let snapshot = session.snapshot();
    println!("Status: {}", snapshot.status);
    if let Some(source) = &snapshot.source_image {
        println!("Original: {}", source);
    }
    println!("{}", snapshot.preview_label());
    if let Some(result) = &snapshot.result {
        println!("Result: {}", result.image);
    }
    if let Some(last_error) = &snapshot.last_error {
        println!("Last error: {}", last_error);
    }
}

fn drain_downloads(downloads: &mut Option<mpsc::UnboundedReceiver<DownloadRequest>>) {
    if let Some(rx) = downloads {
        while let Ok(request) = rx.try_recv() {
            println!(
                "Browser download: {} -> {} ({})",
                request.href, request.filename, request.mime_type
            );
        }
    }
}

async fn run(mut app: App) -> Result<()> {
    let mut downloads = app.take_downloads();
    let session = app.new_session();

    println!("Image Format Converter");
    println!("Convert your images to PNG, JPG, or WebP format");
    match app.platform() {
        Platform::Web => println!("Downloads are handed to the browser"),
        Platform::Native => println!("Downloads are saved to the device cache"),
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match command {
            Command::Select(uri) => {
                session.select_image(uri);
                print_status(&session);
            }
            Command::Format(format) => {
                session.set_target_format(format);
                println!("Target format: {}", format);
            }
            Command::Convert => {
                println!("Converting...");
                match session.convert().await {
                    Ok(ConvertOutcome::Converted(image)) => {
                        println!("Conversion complete: {}", image)
                    }
                    Ok(ConvertOutcome::Superseded) => println!("Conversion result discarded"),
                    Err(e) => {
                        println!("Conversion Failed: {}. Type 'convert' to try again.", e)
                    }
                }
            }
            Command::Download(hint) => {
                let hint = hint.as_deref().unwrap_or(DEFAULT_FILENAME_HINT);
                match session.download(hint).await {
                    Ok(saved) => println!("Download Successful: {}", saved),
                    Err(e) => println!("Download Failed: {}", e),
                }
                drain_downloads(&mut downloads);
            }
            Command::Status => print_status(&session),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_format_converter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting image-format-converter");

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(platform) = args.platform {
        config.platform = platform;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    match App::new(&config) {
        Ok(app) => run(app).await,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    }
}
