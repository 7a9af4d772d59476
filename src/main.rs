use clap::{Parser, Subcommand};
use crycascade::training::Trainer;
use crycascade::{validate_input, Config, CryClassifier, PredictionResult, Sensitivity};
use std::path::PathBuf;

/// Infant Cry Cause Classifier
#[derive(Parser)]
#[command(name = "crycascade")]
#[command(about = "Classify infant cries with a sensitivity-tunable cascade of stage models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Custom configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an audio file
    Predict {
        /// Input audio file (WAV, FLAC, MP3 or Ogg Vorbis)
        input: PathBuf,

        /// Model bundle prefix (or any artifact path under it)
        #[arg(short, long)]
        models: PathBuf,

        /// Sensitivity mode: high, balanced or precise
        #[arg(short, long, default_value = "balanced")]
        sensitivity: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the feature vector of an audio file
    Extract {
        /// Input audio file (WAV, FLAC, MP3 or Ogg Vorbis)
        input: PathBuf,
    },
    /// Train all stages from a labeled dataset directory
    Train {
        /// Dataset root holding cry/<cause>/ and the not-cry directories
        dataset: PathBuf,

        /// Output prefix for model artifacts
        #[arg(short, long, default_value = "./models/crycascade")]
        output: PathBuf,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Show the effective configuration, optionally writing it to a file
    ShowConfig {
        /// Write the configuration as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => crycascade::config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Predict {
            input,
            models,
            sensitivity,
            json,
        } => {
            let sensitivity: Sensitivity = sensitivity.parse()?;
            validate_input(&input, &config)?;

            let classifier = CryClassifier::load(config, &models)?;
            let result = classifier
                .classify_file(&input, sensitivity)
                .unwrap_or_else(|e| PredictionResult::from_error(&e, sensitivity));

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Extract { input } => {
            let features = crycascade::features::extract_features_from_file(
                &input,
                &config.audio,
                &config.features,
            )?;
            println!("{}", serde_json::to_string(features.as_slice())?);
        }
        Commands::Train { dataset, output } => {
            let trainer = Trainer::new(config)?;
            let (stages, report) = trainer.train_from_dir(&dataset)?;
            stages.save(&output)?;
            if !cli.quiet {
                println!("{}", serde_json::to_string_pretty(&report)?);
                println!("Models saved under {}*", output.display());
            }
        }
        Commands::ValidateConfig { file } => {
            let config = crycascade::config::load_config(file)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig { output } => match output {
            Some(path) => {
                crycascade::config::save_config(&config, &path)?;
                println!("Configuration written to {}", path.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

fn print_result(result: &PredictionResult) {
    println!("Label:       {}", result.label);
    println!("Confidence:  {:.1}%", result.confidence * 100.0);
    println!("Severity:    {}", result.severity);
    println!("Stage:       {}", result.stage);
    println!("Sensitivity: {}", result.sensitivity);
    if let Some(p) = result.pain_probability {
        println!("Pain (primary): {:.3}", p);
    }
    if let (Some(p), Some(cut)) = (result.cascade_probability, result.cascade_cut) {
        println!("Pain (cascade): {:.3} (cut {:.3})", p, cut);
    }
    if let Some(message) = &result.message {
        println!("Error: {}", message);
    }
}
