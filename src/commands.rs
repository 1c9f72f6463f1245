use std::io::{self, Write};

use anyhow::{bail, Context, Result};

use crate::generation::Model;
use crate::session::Startup;

pub async fn list_models(current: Model) -> Result<()> {
    println!("🤖 Supported models:");
    println!("{}", "=".repeat(30));

    for model in Model::all() {
        let marker = if model == current { "•" } else { " " };
        println!(" {} {}", marker, model.id());
    }

    Ok(())
}

/// Send one prompt and print the reply as it streams in.
pub async fn run_prompt(startup: Startup, prompt: &str) -> Result<()> {
    let (mut session, client) = match startup {
        Startup::Ready { session, client } => (session, client),
        Startup::Stopped(err) => return Err(err.into()),
    };

    let mut stdout = io::stdout();
    let mut write_error: Option<io::Error> = None;
    let mut sink = |fragment: &str, _buffer: &str| {
        if write_error.is_some() {
            return;
        }
        if let Err(err) = stdout.write_all(fragment.as_bytes()).and_then(|_| stdout.flush()) {
            write_error = Some(err);
        }
    };

    let outcome = session.submit(&client, prompt, &mut sink).await?;
    println!();

    if let Some(err) = write_error {
        return Err(err).context("Failed to write reply to stdout");
    }
    if let Some(err) = outcome.error {
        bail!("{err}");
    }

    Ok(())
}
