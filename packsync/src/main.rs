use std::path::PathBuf;

use packsync::config::EngineConfig;
use packsync::issues::Severity;
use packsync::sync::engine::SyncEngine;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run(PathBuf),
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut game_dir = None;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other if game_dir.is_none() => game_dir = Some(PathBuf::from(other)),
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }
    Ok(CliMode::Run(game_dir.unwrap_or_else(|| PathBuf::from("."))))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let game_dir = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: packsync [GAME_DIR]");
            println!("  GAME_DIR   Installation to sync (default: current directory)");
            return Ok(());
        }
        CliMode::Run(game_dir) => game_dir,
    };
    init_logging();

    let mut engine = SyncEngine::new(EngineConfig::from_env(game_dir));
    let outcome = engine.run_cycle().await?;
    engine.shutdown().await;

    for path in &outcome.load {
        println!("{}", path.display());
    }
    let errors = outcome
        .issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("pack sync finished with {errors} error(s)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parse_cli_mode_defaults_to_current_dir() {
        let mode = parse_cli_mode(args(&["packsync"])).unwrap();
        assert_eq!(mode, CliMode::Run(PathBuf::from(".")));
    }

    #[test]
    fn parse_cli_mode_takes_game_dir() {
        let mode = parse_cli_mode(args(&["packsync", "/srv/game"])).unwrap();
        assert_eq!(mode, CliMode::Run(PathBuf::from("/srv/game")));
    }

    #[test]
    fn parse_cli_mode_supports_help() {
        let mode = parse_cli_mode(args(&["packsync", "/srv/game", "--help"])).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_flags() {
        assert!(parse_cli_mode(args(&["packsync", "--logout"])).is_err());
        assert!(parse_cli_mode(args(&["packsync", "a", "b"])).is_err());
    }
}
