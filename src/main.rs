use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lifeline::config::{LifelineConfig, LogFormat};
use lifeline::detect::{Severity, UserRiskContext};
use lifeline::engine::Engine;

#[derive(Parser)]
#[command(
    name = "lifeline",
    about = "Crisis risk detection and escalation engine for journaling apps",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults: $LIFELINE_CONFIG, /etc/lifeline/lifeline.toml)
    #[arg(long, global = true, env = "LIFELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API + escalation engine)
    Serve {
        /// Bind address (overrides [server].bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Score a piece of text and show the plan it would trigger, without
    /// contacting anyone
    Assess {
        /// Text to score; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,

        /// BCP-47 language tag
        #[arg(long)]
        language: Option<String>,

        /// Number of previous crises on record
        #[arg(long, default_value = "0")]
        previous_crises: u32,

        /// Days since the most recent crisis
        #[arg(long)]
        days_since_last_crisis: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the escalation plan for a severity
    Plan {
        /// none, low, medium, high or critical
        #[arg(long)]
        severity: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List configured responders
    Responders {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

fn init_tracing(config: &LifelineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = LifelineConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting lifeline daemon");
            lifeline::serve(config).await?;
        }
        Commands::Assess {
            text,
            language,
            previous_crises,
            days_since_last_crisis,
            json,
        } => {
            let text = match text {
                Some(t) => t,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read text from stdin")?;
                    buf
                }
            };
            let context = UserRiskContext {
                previous_crises,
                days_since_last_crisis,
                ..Default::default()
            };
            let engine = Engine::builder(config).build()?;
            let (assessment, plan) = engine.assess_only(&text, language.as_deref(), &context);

            if json {
                let out = serde_json::json!({ "assessment": assessment, "plan": plan });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("\n=== Lifeline Risk Assessment ===");
                println!("Severity:     {}", assessment.severity);
                println!("Confidence:   {:.2}", assessment.confidence);
                let concerns: Vec<String> = assessment
                    .matched_concerns
                    .iter()
                    .map(|c| format!("{:?}", c))
                    .collect();
                let concerns = if concerns.is_empty() {
                    "-".to_string()
                } else {
                    concerns.join(", ")
                };
                println!("Concerns:     {}", concerns);
                let fallback = if assessment.language_fallback {
                    " (fallback)"
                } else {
                    ""
                };
                println!("Language:     {}{}", assessment.language, fallback);
                println!("Immediate:    {}", assessment.requires_immediate_intervention);
                println!("Human:        {}", assessment.requires_human_contact);
                println!("Emergency:    {}", assessment.emergency_services_required);
                print_plan(&plan);
            }
        }
        Commands::Plan { severity, json } => {
            let severity: Severity = severity.parse().map_err(anyhow::Error::msg)?;
            let engine = Engine::builder(config).build()?;
            let plan = engine.planner().plan_for(severity);
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("\nEscalation plan for severity '{}'", severity);
                print_plan(&plan);
            }
        }
        Commands::Responders { json } => {
            let engine = Engine::builder(config).build()?;
            let responders = engine.directory().list().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&responders)?);
            } else if responders.is_empty() {
                println!("No responders configured.");
            } else {
                println!("{:<24} | {:<18} | {:>8} | Languages", "Id", "Kind", "Priority");
                println!("{:-<24}-|-{:-<18}-|-{:-<8}-|-{:-<12}", "", "", "", "");
                for r in responders {
                    let langs: Vec<&str> = r.languages.iter().map(String::as_str).collect();
                    println!(
                        "{:<24} | {:<18} | {:>8} | {}",
                        r.id,
                        format!("{:?}", r.kind),
                        r.priority,
                        langs.join(",")
                    );
                }
            }
        }
        Commands::CheckConfig => {
            let policy = config.validate()?;
            println!(
                "Configuration OK: {} phases, {} responders, {} channels",
                policy.windows().len(),
                config.responders.len(),
                config.channels.len()
            );
        }
    }

    Ok(())
}

fn print_plan(plan: &lifeline::escalation::EscalationPlan) {
    if plan.is_empty() {
        println!("\nPlan:         (no escalation)");
        return;
    }
    println!("\n{:<12} | {:>8} | Actions", "Phase", "Delay");
    println!("{:-<12}-|-{:-<8}-|-{:-<40}", "", "", "");
    for phase in &plan.phases {
        let actions: Vec<String> = phase.actions.iter().map(|a| a.to_string()).collect();
        println!(
            "{:<12} | {:>7}s | {}",
            phase.name,
            phase.delay_secs,
            actions.join(", ")
        );
    }
    println!();
}
