use std::io::Write as _;

use anyhow::Context as _;
use args::Args;
use clap::Parser;
use config::Config;
use context::RequestContext;
use fastrace::{
    collector::{ConsoleReporter, SpanContext},
    future::FutureExt as _,
    prelude::Span,
};
use futures::StreamExt;
use llm::{ChatRequest, Engine, Message, messages::flags};
use tokio::io::AsyncReadExt;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log);

    if args.trace {
        fastrace::set_reporter(ConsoleReporter, fastrace::collector::Config::default());
    }

    let root = Span::root("switchboard", SpanContext::random());
    let result = run(args).in_span(root).await;

    fastrace::flush();

    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let engine = Engine::from_config(config);
    let request = build_request(&args).await?;

    let context = RequestContext::new()
        .prefer_backup(args.prefer_backup)
        .allow_restricted(args.allow_restricted)
        .with_seed(args.seed);

    let cancellation = context.cancellation.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling the request");
            cancellation.cancel();
        }
    });

    if args.stream {
        stream(&engine, request, &context).await
    } else {
        let response = engine.chat(request, &context).await?;

        if !response.reasoning_text.is_empty() {
            eprintln!("{}\n", response.reasoning_text);
        }

        println!("{}", response.text);

        log::info!(
            "Finished ({}): {} input tokens, {} output tokens",
            response.finish_reason,
            response.input_tokens,
            response.output_tokens
        );

        Ok(())
    }
}

async fn build_request(args: &Args) -> anyhow::Result<ChatRequest> {
    let prompt = match &args.prompt {
        Some(prompt) => prompt.clone(),
        None => {
            let mut prompt = String::new();

            tokio::io::stdin()
                .read_to_string(&mut prompt)
                .await
                .context("Failed to read the prompt from stdin")?;

            prompt
        }
    };

    let mut messages = Vec::with_capacity(2);

    if let Some(system) = &args.system {
        messages.push(Message::system(system.clone()));
    }

    messages.push(Message::user(prompt.trim_end()));

    let mut request = ChatRequest::new(args.model.clone(), messages);
    request.max_tokens = args.max_tokens.unwrap_or_default();
    request.temperature = args.temperature.unwrap_or_default();

    if args.reasoning {
        request = request.with_flag(flags::REASONING);
    }

    if args.search {
        request = request.with_flag(flags::SEARCH);
    }

    Ok(request)
}

async fn stream(engine: &Engine, request: ChatRequest, context: &RequestContext) -> anyhow::Result<()> {
    let mut stream = engine.chat_stream(request, context).await?;
    let mut stdout = std::io::stdout();

    let mut input_tokens = None;
    let mut output_tokens = None;

    while let Some(item) = stream.next().await {
        let fragment = item?;

        if !fragment.reasoning_delta.is_empty() {
            eprint!("{}", fragment.reasoning_delta);
        }

        if !fragment.text_delta.is_empty() {
            write!(stdout, "{}", fragment.text_delta)?;
            stdout.flush()?;
        }

        input_tokens = fragment.input_tokens.or(input_tokens);
        output_tokens = fragment.output_tokens.or(output_tokens);
    }

    writeln!(stdout)?;

    if context.is_cancelled() {
        log::warn!("Stream cancelled");
    }

    log::info!(
        "Finished: {} input tokens, {} output tokens",
        input_tokens.unwrap_or_default(),
        output_tokens.unwrap_or_default()
    );

    Ok(())
}
