use anyhow::{Context, Result};
use adaptive_binarization::cli::{self, CliCommand};
use adaptive_binarization::config::AppConfig;
use adaptive_binarization::observability;
use adaptive_binarization::pipeline;
use adaptive_binarization::preprocessing::CancellationToken;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(CliCommand::Run(args)) => args,
        Ok(CliCommand::Help) => {
            println!("{}", cli::USAGE);
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    args.apply_to(&mut config);

    // Initialize logging and optional metrics recorder
    let metrics_handle = observability::init_observability_with_config(&config.observability)
        .context("Failed to initialize observability")?;

    config
        .validate()
        .context("Configuration validation failed. Please check your settings")?;
    info!("{}", config.summary());

    let token = CancellationToken::new();
    spawn_ctrl_c_handler(token.clone());

    let outputs = pipeline::run(&config, &args.input, args.output.as_deref(), &token)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    for output in &outputs {
        match output.white_ratio {
            Some(ratio) => println!(
                "{}: {} ({:.1}% white, {}ms)",
                output.method,
                output.path.display(),
                ratio * 100.0,
                output.processing_time_ms
            ),
            None => println!(
                "{}: {} ({}ms)",
                output.method,
                output.path.display(),
                output.processing_time_ms
            ),
        }
    }

    if let Some(handle) = metrics_handle {
        println!("{}", handle.render());
    }

    Ok(())
}

/// Cancels `token` on Ctrl-C; processing stops at the next row boundary
fn spawn_ctrl_c_handler(token: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Ctrl-C handler unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling processing");
                token.cancel();
            }
        });
    });
}
