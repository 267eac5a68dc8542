//! Terminal front end for a single interview session.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use intervo_config::AppConfig;
use intervo_llm::{GatewayOptions, LlmGateway};
use intervo_session::InterviewSession;
use intervo_trace::Tracker;

pub async fn run_interview(config: AppConfig) -> Result<()> {
    let tracker = Arc::new(Tracker::new(config.trace.enabled));
    let session_id = InterviewSession::generate_session_id();

    let gateway = LlmGateway::new(
        GatewayOptions {
            base_url: config.llm.base_url.clone(),
            api_key: config.llm.api_key.clone(),
            model: config.llm.model.clone(),
            timeout: Duration::from_secs(config.llm.timeout_secs),
            max_retries: config.llm.max_retries,
        },
        tracker.clone(),
        session_id.clone(),
    )
    .context("failed to construct the LM gateway")?;

    let mut session = InterviewSession::new(Arc::new(gateway), &config, tracker, session_id)
        .context("failed to create the interview session")?;

    println!("(model: {}; type your answers, Ctrl-D to quit)\n", config.llm.model);

    let greeting = session.start().await.context("failed to start the interview")?;
    println!("{greeting}\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = stdin.read_line(&mut line)?;
        if read == 0 {
            // EOF: leave without feedback, the transcript was never closed.
            println!("\n(interview aborted)");
            session.close();
            return Ok(());
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let (reply, done) = session.process(message).await?;
        println!("\n{reply}\n");
        if done {
            break;
        }
    }

    println!("Generating feedback, this may take a moment...\n");
    match session.finish().await {
        Ok((feedback, summary_path, detailed_path)) => {
            println!("{}", feedback.to_report_string());
            println!();
            println!("summary log : {}", summary_path.display());
            println!("detailed log: {}", detailed_path.display());
        }
        Err(err) => {
            warn!(error = %err, "feedback generation failed");
            eprintln!("Feedback generation failed: {err}");
        }
    }
    session.close();

    Ok(())
}
