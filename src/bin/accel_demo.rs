//! accel-demo — 在模拟后端上运行加速管线并输出统计信息
//!
//! Usage:
//!   accel-demo run [--requests <n>] [--config <path>]   Drive the pipeline with a mock backend
//!   accel-demo config [--config <path>]                 Print the effective configuration

use ai_lib_accel::config::PipelineConfig;
use ai_lib_accel::pipeline::Pipeline;
use ai_lib_accel::provider::ProviderConfig;
use ai_lib_accel::telemetry::{init_tracing, log_stats};
use ai_lib_accel::testing::MockFactory;
use ai_lib_accel::types::{Message, RequestOptions};
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_REQUESTS: usize = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("accel-demo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"accel-demo — 加速管线演示工具

USAGE:
    accel-demo <COMMAND> [OPTIONS]

COMMANDS:
    run [--requests <n>] [--config <path>]   Send concurrent requests through the pipeline
    config [--config <path>]                 Print the effective configuration as YAML
    version                                  Show version information
    help                                     Show this help message

ENVIRONMENT:
    RUST_LOG                                 Log filter (default: ai_lib_accel=info)
    AI_LIB_CACHE_*, AI_LIB_POOL_*, AI_LIB_BATCH_*   Engine overrides"#
    );
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> anyhow::Result<PipelineConfig> {
    let config = match flag_value(args, "--config") {
        Some(path) => PipelineConfig::from_file(path).with_context(|| format!("loading {path}"))?,
        None => PipelineConfig::default(),
    };
    Ok(config.apply_env().normalized())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

async fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    init_tracing();
    let requests = match flag_value(args, "--requests") {
        Some(n) => n.parse::<usize>().with_context(|| format!("invalid --requests value: {n}"))?,
        None => DEFAULT_REQUESTS,
    };
    if requests == 0 {
        bail!("--requests must be positive");
    }

    let factory = Arc::new(MockFactory::new("mock").with_latency(Duration::from_millis(20)));
    let pipeline = Pipeline::new(load_config(args)?, factory);
    let provider = pipeline.provider_for(ProviderConfig::new("mock", "demo-model"));
    let options = RequestOptions::new("demo-model").with_temperature(0.0);

    let started = Instant::now();
    let calls = (0..requests).map(|i| {
        let provider = Arc::clone(&provider);
        let options = options.clone();
        // Every fifth prompt repeats so the cache has something to serve.
        let prompt = format!("question {}", i % 5);
        tokio::spawn(async move { provider.generate(&[Message::user(prompt)], &options).await })
    });
    let mut failed = 0;
    for handle in futures::future::join_all(calls).await {
        if handle.context("request task panicked")?.is_err() {
            failed += 1;
        }
    }
    println!("{requests} requests, {failed} failed, {:?} elapsed", started.elapsed());

    let again = provider
        .generate(&[Message::user("question 0")], &options)
        .await
        .context("repeat request")?;
    println!("repeat request: {}", again.text);

    let stats = pipeline.stats();
    log_stats(&stats);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    pipeline.close().await;
    Ok(())
}
