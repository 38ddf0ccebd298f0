//! Interactive prompt loop offering the same operations as the subcommands.

use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::app::{App, GenerateOverrides};
use crate::listing::{ActivityFilter, ListingQuery};
use crate::shutdown::Shutdown;

const DEFAULT_TOTAL: usize = 750;

struct Prompter {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompter {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` on end of input.
    async fn ask(&mut self, question: &str, shutdown: &mut Shutdown) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(question.as_bytes())
            .await
            .context("Failed to write prompt")?;
        stdout.flush().await.context("Failed to flush prompt")?;

        let line = shutdown
            .guard(self.lines.next_line())
            .await?
            .context("Failed to read from stdin")?;
        Ok(line.map(|line| line.trim().to_string()))
    }

    async fn ask_parsed<T>(
        &mut self,
        question: &str,
        default: T,
        shutdown: &mut Shutdown,
    ) -> Result<Option<T>>
    where
        T: FromStr + ToString,
    {
        loop {
            let prompt = format!("{question} [{}]: ", default.to_string());
            let Some(answer) = self.ask(&prompt, shutdown).await? else {
                return Ok(None);
            };
            if answer.is_empty() {
                return Ok(Some(default));
            }
            match answer.parse() {
                Ok(value) => return Ok(Some(value)),
                Err(_) => println!("Could not understand {answer:?}, try again."),
            }
        }
    }

    async fn confirm(
        &mut self,
        question: &str,
        default: bool,
        shutdown: &mut Shutdown,
    ) -> Result<Option<bool>> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let Some(answer) = self.ask(&format!("{question} [{hint}]: "), shutdown).await? else {
                return Ok(None);
            };
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(Some(default)),
                "y" | "yes" => return Ok(Some(true)),
                "n" | "no" => return Ok(Some(false)),
                _ => println!("Please answer y or n."),
            }
        }
    }
}

enum Choice {
    Generate,
    List,
    Exit,
}

impl FromStr for Choice {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "1" => Ok(Self::Generate),
            "2" => Ok(Self::List),
            "3" => Ok(Self::Exit),
            other => Err(anyhow!("unknown menu entry {other:?}")),
        }
    }
}

pub async fn run(app: &App, shutdown: &mut Shutdown) -> Result<()> {
    let mut prompter = Prompter::new();
    loop {
        println!();
        println!("Main menu:");
        println!("1. Generate new aliases");
        println!("2. List existing aliases");
        println!("3. Exit");

        let Some(answer) = prompter.ask("Choice [3]: ", shutdown).await? else {
            return Ok(());
        };
        let choice = if answer.is_empty() {
            Choice::Exit
        } else {
            match answer.parse::<Choice>() {
                Ok(choice) => choice,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            }
        };

        match choice {
            Choice::Generate => {
                if !generate(app, &mut prompter, shutdown).await? {
                    return Ok(());
                }
            }
            Choice::List => {
                if !list(app, &mut prompter, shutdown).await? {
                    return Ok(());
                }
            }
            Choice::Exit => {
                println!("Goodbye!");
                return Ok(());
            }
        }

        if shutdown.is_triggered() {
            return Ok(());
        }
    }
}

/// Returns `false` when input ended and the menu should close.
async fn generate(app: &App, prompter: &mut Prompter, shutdown: &mut Shutdown) -> Result<bool> {
    let config = app.config();
    let Some(total) = prompter
        .ask_parsed("How many aliases to generate?", DEFAULT_TOTAL, shutdown)
        .await?
    else {
        return Ok(false);
    };
    let Some(batch_size) = prompter
        .ask_parsed("Aliases per batch?", config.max_concurrent_tasks, shutdown)
        .await?
    else {
        return Ok(false);
    };
    let Some(delay_hours) = prompter
        .ask_parsed("Hours between batches?", config.delay_hours, shutdown)
        .await?
    else {
        return Ok(false);
    };

    let overrides = GenerateOverrides {
        batch_size: Some(batch_size),
        delay_hours: Some(delay_hours),
        max_retries: None,
    };
    match app.request(total, overrides) {
        Ok(request) => {
            let run = app.generate(&request, shutdown).await;
            println!("{}/{} aliases reserved.", run.completed(), run.total);
        }
        Err(err) => println!("Invalid parameters: {err}"),
    }
    Ok(true)
}

async fn list(app: &App, prompter: &mut Prompter, shutdown: &mut Shutdown) -> Result<bool> {
    let Some(active) = prompter
        .confirm("Show active aliases?", true, shutdown)
        .await?
    else {
        return Ok(false);
    };
    let Some(search) = prompter
        .ask("Label search (leave empty for all): ", shutdown)
        .await?
    else {
        return Ok(false);
    };
    let Some(save) = prompter.confirm("Export to CSV?", false, shutdown).await? else {
        return Ok(false);
    };

    let activity = if active {
        ActivityFilter::Active
    } else {
        ActivityFilter::Inactive
    };
    let query = match ListingQuery::new(activity, Some(search.as_str())) {
        Ok(query) => query,
        Err(err) => {
            println!("{err}");
            return Ok(true);
        }
    };
    if let Err(err) = app.list(&query, save, shutdown).await {
        println!("{err:#}");
    }
    Ok(true)
}
