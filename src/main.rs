use gesture_player::app::{GestureMode, SessionOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    simulate: bool,
    classifier: Option<String>,
    frames: Option<PathBuf>,
    csrf_cookie: Option<String>,
    script: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gesture_player=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1).collect())?;
    let mut settings = gesture_player::config::load_settings()?;
    if let Some(url) = args.classifier {
        settings.classifier_url = Some(url);
    }
    if let Some(dir) = args.frames {
        settings.frames_dir = Some(dir);
    }
    if let Some(cookie) = args.csrf_cookie {
        settings.csrf_cookie = Some(cookie);
    }

    let gestures = if let Some(labels) = args.script {
        Some(GestureMode::Scripted(labels))
    } else if args.simulate {
        Some(GestureMode::Simulated)
    } else if settings.classifier_url.is_some() && settings.frames_dir.is_some() {
        Some(GestureMode::Remote)
    } else {
        None
    };

    gesture_player::app::run(SessionOptions { settings, gestures })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--simulate" => out.simulate = true,
            flag @ ("--classifier" | "--frames" | "--csrf" | "--script") => {
                index += 1;
                let Some(value) = args.get(index).map(|value| value.trim()) else {
                    anyhow::bail!("{flag} requires a value");
                };
                if value.is_empty() {
                    anyhow::bail!("{flag} cannot be empty");
                }
                match flag {
                    "--classifier" => out.classifier = Some(value.to_string()),
                    "--frames" => out.frames = Some(PathBuf::from(value)),
                    "--csrf" => out.csrf_cookie = Some(value.to_string()),
                    _ => out.script = Some(value.to_string()),
                }
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("gesture-player");
    println!("  --simulate            Drive the player with randomly simulated gestures");
    println!("  --classifier URL      Gesture classification endpoint");
    println!("  --frames DIR          Directory of still frames used as the camera");
    println!("  --csrf COOKIE         Cookie header holding the csrftoken value");
    println!("  --script LABELS       Comma-separated gesture labels to replay");
}
