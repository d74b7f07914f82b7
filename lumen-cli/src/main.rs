//! LUMEN CLI entry point.

use lumen_cli::config::CliConfig;
use lumen_cli::error::CliError;
use lumen_cli::session::HELP;
use lumen_cli::{logging, providers, App, Reply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PROMPT: &str = "lumen> ";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let config = CliConfig::load()?;
    logging::init(&config.logging)?;

    let collaborators = providers::collaborators(&config)?;
    let mut app = App::new(&config.lumen, config.output.clone(), collaborators)?;
    tracing::info!(
        relational = %config.storage.relational_path.display(),
        vector = %config.storage.vector_path.display(),
        images = %config.output.image_dir.display(),
        "Lumen ready"
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(format!("{HELP}\n\n").as_bytes()).await?;

    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match app.handle_line(&line).await {
            Ok(Reply::Quit) => break,
            Ok(Reply::Text(text)) if text.is_empty() => {}
            Ok(Reply::Text(text)) => {
                stdout.write_all(format!("{text}\n").as_bytes()).await?;
            }
            Err(e) => {
                tracing::error!(error = %e, "Command failed");
                stdout.write_all(format!("Erreur : {e}\n").as_bytes()).await?;
            }
        }
    }

    stdout.flush().await?;
    Ok(())
}
