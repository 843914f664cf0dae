use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use office_translator::config::{init_default_config, Settings};
use office_translator::pipeline::{
    default_output_path, extract_file, reintegrate_file, BatchOptions, TranslationEnv,
    TranslationRequest,
};
use office_translator::progress::ConsoleProgress;
use office_translator::transfer::Granularity;
use office_translator::translate::gemini::GeminiBackend;
use office_translator::translate::ThreadSleeper;

#[derive(Parser, Debug)]
#[command(name = "office-translator", version)]
#[command(about = "Translate .pptx/.docx documents with Gemini while keeping their formatting", long_about = None)]
struct Cli {
    /// Config file (default: $OFFICE_TRANSLATOR_CONFIG, or office-translator.toml searched upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text runs into transfer JSON (no translation)
    Extract {
        #[arg(value_name = "DOCUMENT")]
        input: PathBuf,
        /// Output JSON (default: <stem>.json next to the input)
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
        /// run | aggregate (default: from config)
        #[arg(long)]
        granularity: Option<Granularity>,
    },

    /// Translate a transfer JSON file
    TranslateJson {
        #[arg(value_name = "JSON")]
        input: PathBuf,
        #[arg(value_name = "JSON")]
        output: PathBuf,
        #[command(flatten)]
        lang: LangArgs,
    },

    /// Write translated JSON back into the original document
    Reintegrate {
        #[arg(value_name = "DOCUMENT")]
        original: PathBuf,
        #[arg(value_name = "JSON")]
        translated: PathBuf,
        #[arg(value_name = "DOCUMENT")]
        output: PathBuf,
        /// Must match the granularity used for extraction
        #[arg(long)]
        granularity: Option<Granularity>,
    },

    /// Extract, translate and reintegrate one document
    Translate {
        #[arg(value_name = "DOCUMENT")]
        input: PathBuf,
        /// Output document (default: <stem>_<target>.<ext>)
        #[arg(short, long, value_name = "DOCUMENT")]
        output: Option<PathBuf>,
        #[command(flatten)]
        lang: LangArgs,
        #[arg(long)]
        granularity: Option<Granularity>,
    },

    /// Translate every .pptx/.docx in a directory
    TranslateDir {
        #[arg(value_name = "DIR")]
        input_dir: PathBuf,
        #[arg(value_name = "DIR")]
        output_dir: PathBuf,
        #[command(flatten)]
        lang: LangArgs,
        #[arg(long)]
        granularity: Option<Granularity>,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Re-translate documents whose output already exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Write a default office-translator.toml
    InitConfig {
        /// Directory to write into (default: current directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },

    /// List translation styles and topics
    Styles,
}

#[derive(Args, Debug)]
struct LangArgs {
    /// Target language (e.g. es, fr, de)
    #[arg(short, long = "target-lang", value_name = "LANG")]
    target_lang: String,
    /// Source language (default: detected by the model)
    #[arg(short, long = "source-lang", value_name = "LANG")]
    source_lang: Option<String>,
    /// direct | formal | casual | technical | configured style
    #[arg(long)]
    style: Option<String>,
    /// diving | medical | technical | business | education | general | configured topic
    #[arg(long)]
    topic: Option<String>,
}

impl LangArgs {
    fn request(self, granularity: Option<Granularity>) -> TranslationRequest {
        TranslationRequest {
            target_lang: self.target_lang,
            source_lang: self.source_lang,
            style: self.style,
            topic: self.topic,
            granularity,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let progress = ConsoleProgress::new(true);
    match cli.command {
        Command::InitConfig { dir, force } => {
            let dir = match dir {
                Some(d) => d,
                None => std::env::current_dir().context("current dir")?,
            };
            let path = init_default_config(&dir, force).context("init default config")?;
            progress.info(format!("Wrote config: {}", path.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Styles => {
            let settings = Settings::load(cli.config.as_deref())?;
            println!("Styles:");
            for name in settings.style_names() {
                println!("  {name}");
            }
            println!("Topics:");
            for name in settings.topic_names() {
                println!("  {name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Extract {
            input,
            output,
            granularity,
        } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let output = output.unwrap_or_else(|| input.with_extension("json"));
            let granularity = granularity.unwrap_or_else(|| settings.default_granularity());
            extract_file(&input, &output, granularity, &progress)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Reintegrate {
            original,
            translated,
            output,
            granularity,
        } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let granularity = granularity.unwrap_or_else(|| settings.default_granularity());
            reintegrate_file(&original, &translated, &output, granularity, &progress)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::TranslateJson {
            input,
            output,
            lang,
        } => {
            with_env(cli.config.as_deref(), &progress, |env| {
                env.translate_json_file(&input, &output, &lang.request(None))?;
                Ok(ExitCode::SUCCESS)
            })
        }
        Command::Translate {
            input,
            output,
            lang,
            granularity,
        } => {
            let req = lang.request(granularity);
            let output = output.unwrap_or_else(|| default_output_path(&input, &req.target_lang));
            with_env(cli.config.as_deref(), &progress, |env| {
                env.translate_file(&input, &output, &req)?;
                progress.info("Translation complete");
                Ok(ExitCode::SUCCESS)
            })
        }
        Command::TranslateDir {
            input_dir,
            output_dir,
            lang,
            granularity,
            recursive,
            overwrite,
        } => {
            let req = lang.request(granularity);
            let opts = BatchOptions {
                recursive,
                overwrite,
            };
            with_env(cli.config.as_deref(), &progress, |env| {
                let summary = env.translate_directory(&input_dir, &output_dir, &req, opts)?;
                Ok(if summary.has_failures() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                })
            })
        }
    }
}

fn with_env<T>(
    config: Option<&Path>,
    progress: &ConsoleProgress,
    f: impl FnOnce(&TranslationEnv<'_>) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let settings = Settings::load(config)?;
    let backend = GeminiBackend::new(
        settings.api_key()?,
        settings.model(),
        settings.endpoint(),
        settings.timeout(),
    )?;
    let env = TranslationEnv {
        settings: &settings,
        backend: &backend,
        sleeper: &ThreadSleeper,
        progress,
    };
    f(&env)
}
