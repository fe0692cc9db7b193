use clap::Parser;
use hookfan::config::{Args, Command};
use hookfan::{Config, commands, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    let Some(command) = args.command.clone() else {
        anyhow::bail!("No command given. Run `hookfan --help` for usage.");
    };

    telemetry::init_telemetry(config.enable_otel_export)?;

    let outcome = run(&config, command).await;
    telemetry::shutdown_telemetry();
    outcome
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Dispatch {
            trigger,
            data,
            destinations,
        } => {
            let results = commands::run_dispatch(config, trigger, &data, &destinations).await?;
            for result in &results {
                println!("{}", serde_json::to_string(result)?);
            }
            Ok(())
        }
        Command::Verify { secret, signature, body } => {
            if commands::run_verify(&secret, &signature, &body).await? {
                println!("Signature is valid.");
                Ok(())
            } else {
                anyhow::bail!("Signature does not match payload")
            }
        }
    }
}
