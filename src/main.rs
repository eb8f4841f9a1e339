use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use classcache::config::{ENV_COOLDOWN_SECS, ENV_ENDPOINT, ENV_TIMEOUT_MS, ENV_TOKEN};
use classcache::{telemetry, Invalidator, KeyValueStore, RemoteStore, StoreConfig};

#[derive(Parser)]
#[command(name = "classcache")]
#[command(about = "Diagnostics for the remote cache store", long_about = None)]
struct Cli {
    /// Cache endpoint URL
    #[arg(long, env = ENV_ENDPOINT)]
    endpoint: String,

    /// Bearer credential
    #[arg(long, env = ENV_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = ENV_TIMEOUT_MS, default_value_t = 5000)]
    timeout_ms: u64,

    /// Seconds before a tripped breaker lets a probe through
    #[arg(long, env = ENV_COOLDOWN_SECS)]
    cooldown_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the store answers
    Ping,

    /// Print the value stored under a key
    Get {
        key: String,
    },

    /// Store a value (parsed as JSON, or taken as a plain string)
    Set {
        key: String,
        value: String,

        /// Expiry in seconds
        #[arg(long, default_value_t = 300)]
        ttl: u64,
    },

    /// Remove keys
    Del {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List keys matching a glob pattern
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Clear cached entries
    Invalidate {
        #[command(subcommand)]
        target: InvalidateTarget,
    },
}

#[derive(Subcommand)]
enum InvalidateTarget {
    /// Every key matching a glob pattern
    Pattern { pattern: String },

    /// After grading a submission
    SubmissionGraded {
        class_id: String,
        student_id: String,
        teacher_id: String,
    },

    /// After archiving a class
    ClassArchived { class_id: String, teacher_id: String },

    /// After editing a class
    ClassUpdated { class_id: String },

    /// After creating or editing an activity
    ActivityChanged { class_id: String, teacher_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing(telemetry::DEFAULT_FILTER);

    let cli = Cli::parse();

    let mut builder = StoreConfig::builder()
        .endpoint(cli.endpoint)
        .timeout(Duration::from_millis(cli.timeout_ms));
    if let Some(token) = cli.token {
        builder = builder.token(token);
    }
    if let Some(secs) = cli.cooldown_secs {
        builder = builder.breaker_cooldown(Duration::from_secs(secs));
    }
    let store = Arc::new(RemoteStore::new(builder.build())?);

    match cli.command {
        Commands::Ping => {
            if store.ping().await {
                println!("PONG");
            } else {
                bail!("store did not answer ping");
            }
        }

        Commands::Get { ref key } => match store.get(key).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("(nil)"),
        },

        Commands::Set { ref key, ref value, ttl } => {
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            if !store.set(key, &value, ttl).await {
                bail!("store did not acknowledge set of {}", key);
            }
            println!("OK");
        }

        Commands::Del { ref keys } => {
            let mut failed = 0;
            for key in keys {
                if !store.delete(key).await {
                    eprintln!("Failed to delete {}", key);
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} of {} deletions failed", failed, keys.len());
            }
            println!("Deleted {} keys", keys.len());
        }

        Commands::Keys { ref pattern } => match store.keys(pattern).await {
            Some(keys) if keys.is_empty() => println!("(empty)"),
            Some(keys) => {
                for key in keys {
                    println!("{}", key);
                }
            }
            None => bail!("store did not answer keys {}", pattern),
        },

        Commands::Invalidate { target } => {
            let invalidator = Invalidator::new(store.clone());
            let event = match target {
                InvalidateTarget::Pattern { pattern } => invalidator.invalidate_pattern(&pattern).await,
                InvalidateTarget::SubmissionGraded {
                    class_id,
                    student_id,
                    teacher_id,
                } => {
                    invalidator
                        .on_submission_graded(&class_id, &student_id, &teacher_id)
                        .await
                }
                InvalidateTarget::ClassArchived { class_id, teacher_id } => {
                    invalidator.on_class_archived(&class_id, &teacher_id).await
                }
                InvalidateTarget::ClassUpdated { class_id } => {
                    invalidator.on_class_updated(&class_id).await
                }
                InvalidateTarget::ActivityChanged { class_id, teacher_id } => {
                    invalidator.on_activity_changed(&class_id, &teacher_id).await
                }
            };

            println!("Invalidation: {}", event.reason);
            for key in &event.keys {
                println!("  key      {}", key);
            }
            for pattern in &event.patterns {
                println!("  pattern  {}", pattern);
            }
            if !event.succeeded {
                bail!("invalidation was only partially applied");
            }
        }
    }

    Ok(())
}
