//! Answers credential prompts on the terminal.

use std::collections::HashMap;

use log::warn;
use nmctl::{CredentialPrompt, Manager};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;

/// Reads an answer for every prompt the manager issues. End of input
/// declines the prompt.
pub(crate) fn spawn_responder(manager: &Manager) -> JoinHandle<()> {
    let mut prompts = manager.subscribe_prompts();
    let manager = manager.clone();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(prompt) = prompts.recv().await {
            let outcome = match read_answer(&prompt, &mut lines).await {
                Ok(Some(secrets)) => manager.submit_credentials(&prompt.token, secrets, false),
                Ok(None) => manager.cancel_credentials(&prompt.token),
                Err(e) => {
                    warn!("Failed to read credentials: {e}");
                    manager.cancel_credentials(&prompt.token)
                }
            };
            if let Err(e) = outcome {
                warn!("Prompt {} was not answered: {e}", prompt.token);
            }
        }
    })
}

/// `(key, label)` for every requested field.
fn fields(prompt: &CredentialPrompt) -> Vec<(String, String)> {
    let req = &prompt.request;
    if req.fields_info.is_empty() {
        req.fields.iter().map(|f| (f.clone(), f.clone())).collect()
    } else {
        req.fields_info
            .iter()
            .map(|f| (f.name.clone(), f.label.clone()))
            .collect()
    }
}

async fn read_answer(
    prompt: &CredentialPrompt,
    lines: &mut Lines<BufReader<Stdin>>,
) -> std::io::Result<Option<HashMap<String, String>>> {
    let mut out = tokio::io::stdout();
    let req = &prompt.request;
    out.write_all(format!("{} needs credentials ({})\n", req.name, req.reason).as_bytes())
        .await?;

    let mut secrets = HashMap::new();
    for (key, label) in fields(prompt) {
        out.write_all(format!("{label}: ").as_bytes()).await?;
        out.flush().await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        secrets.insert(key, line.trim_end().to_string());
    }
    Ok(Some(secrets))
}
