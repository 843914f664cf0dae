use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::transfer::Granularity;
use crate::translate::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::translate::prompts::{
    builtin_style, builtin_topic, BUILTIN_STYLES, BUILTIN_TOPICS, DEFAULT_STYLE, DEFAULT_TOPIC,
};
use crate::translate::RetryPolicy;

pub const CONFIG_FILENAME: &str = "office-translator.toml";
pub const CONFIG_ENV: &str = "OFFICE_TRANSLATOR_CONFIG";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const PLACEHOLDER_API_KEY: &str = "your_api_key_here";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub trace: TraceSection,
    /// `[styles.<name>]`; overrides or extends the built-in styles.
    #[serde(default)]
    pub styles: BTreeMap<String, InstructionSection>,
    #[serde(default)]
    pub topics: BTreeMap<String, InstructionSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DefaultsSection {
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub granularity: Option<Granularity>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RetrySection {
    /// Upper bound on backend calls per request, transient failures included.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub initial_delay_secs: Option<u64>,
    #[serde(default)]
    pub max_structure_retries: Option<u32>,
    #[serde(default)]
    pub retry_pause_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TraceSection {
    /// Prompt/response dump directory; relative paths start at the config file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct InstructionSection {
    #[serde(default)]
    pub instructions: String,
}

/// Loaded configuration plus where it came from. Resolved once and passed down.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub app: AppConfig,
    pub source: Option<PathBuf>,
}

impl Settings {
    /// `--config`, then `$OFFICE_TRANSLATOR_CONFIG`, then `office-translator.toml` searched
    /// upwards. Without any file, built-in defaults apply.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .filter(|p| !p.as_os_str().is_empty())
                .or_else(|| find_default_config(CONFIG_FILENAME)),
        };
        let Some(path) = path else {
            log::debug!("no {CONFIG_FILENAME} found; using built-in defaults");
            return Ok(Self::default());
        };
        let app = load_config(&path)?;
        log::debug!("config: {}", path.display());
        Ok(Self {
            app,
            source: Some(path),
        })
    }

    pub fn api_key(&self) -> anyhow::Result<String> {
        let usable = |k: &str| {
            let k = k.trim();
            (!k.is_empty() && k != PLACEHOLDER_API_KEY).then(|| k.to_string())
        };
        if let Some(key) = self.app.backend.api_key.as_deref().and_then(usable) {
            return Ok(key);
        }
        if let Some(key) = std::env::var(API_KEY_ENV).ok().as_deref().and_then(usable) {
            return Ok(key);
        }
        Err(anyhow!(
            "Gemini API key not set: add [backend] api_key to {CONFIG_FILENAME} \
             (see `init-config`) or set {API_KEY_ENV}"
        ))
    }

    pub fn model(&self) -> &str {
        non_empty(self.app.backend.model.as_deref()).unwrap_or(DEFAULT_MODEL)
    }

    pub fn endpoint(&self) -> &str {
        non_empty(self.app.backend.endpoint.as_deref()).unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.app.backend.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let d = RetryPolicy::default();
        let r = &self.app.retry;
        RetryPolicy {
            max_retries: r.max_retries.unwrap_or(d.max_retries),
            initial_delay: r
                .initial_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(d.initial_delay),
            max_structure_retries: r.max_structure_retries.unwrap_or(d.max_structure_retries),
            retry_pause: r
                .retry_pause_secs
                .map(Duration::from_secs)
                .unwrap_or(d.retry_pause),
        }
    }

    pub fn default_style(&self) -> &str {
        non_empty(self.app.defaults.style.as_deref()).unwrap_or(DEFAULT_STYLE)
    }

    pub fn default_topic(&self) -> &str {
        non_empty(self.app.defaults.topic.as_deref()).unwrap_or(DEFAULT_TOPIC)
    }

    pub fn default_granularity(&self) -> Granularity {
        self.app.defaults.granularity.unwrap_or_default()
    }

    /// Configured text first, then the built-in one; unknown styles fall back to `direct`.
    pub fn style_instructions(&self, name: &str) -> String {
        if let Some(s) = lookup_section(&self.app.styles, name) {
            return s;
        }
        if let Some(s) = builtin_style(name) {
            return s.to_string();
        }
        log::warn!("unknown style {name:?}; using {DEFAULT_STYLE:?}");
        lookup_section(&self.app.styles, DEFAULT_STYLE)
            .or_else(|| builtin_style(DEFAULT_STYLE).map(str::to_string))
            .unwrap_or_default()
    }

    /// Unknown topics (including `general`) add no instructions.
    pub fn topic_instructions(&self, name: &str) -> String {
        lookup_section(&self.app.topics, name)
            .or_else(|| builtin_topic(name).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn style_names(&self) -> Vec<String> {
        merged_names(BUILTIN_STYLES, &self.app.styles)
    }

    pub fn topic_names(&self) -> Vec<String> {
        merged_names(BUILTIN_TOPICS, &self.app.topics)
    }

    pub fn trace_dir(&self) -> Option<PathBuf> {
        let dir = self.app.trace.dir.as_ref()?;
        if dir.as_os_str().is_empty() {
            return None;
        }
        if dir.is_relative() {
            if let Some(base) = self.source.as_deref().and_then(Path::parent) {
                return Some(base.join(dir));
            }
        }
        Some(dir.clone())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn lookup_section(map: &BTreeMap<String, InstructionSection>, name: &str) -> Option<String> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.instructions.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn merged_names(builtin: &[(&str, &str)], configured: &BTreeMap<String, InstructionSection>) -> Vec<String> {
    let mut names: Vec<String> = builtin.iter().map(|(k, _)| k.to_string()).collect();
    for k in configured.keys() {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(k)) {
            names.push(k.clone());
        }
    }
    names
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[backend]
# Or leave unset and export GEMINI_API_KEY.
api_key = "your_api_key_here"
model = "gemini-2.5-flash"
# Try "gemini-2.5-pro" if translations keep merging or splitting text elements.
endpoint = "https://generativelanguage.googleapis.com"
timeout_secs = 120

[defaults]
style = "direct"        # direct | formal | casual | technical | any [styles.<name>]
topic = "general"       # diving | medical | technical | business | education | any [topics.<name>]
granularity = "run"     # run | aggregate

[retry]
max_retries = 5
initial_delay_secs = 1
max_structure_retries = 2
retry_pause_secs = 2

[trace]
# dir = "_trace"

# [styles.legal]
# instructions = """Translation Style: Use precise legal language.
# - Keep defined terms consistent"""

# [topics.aviation]
# instructions = """Topic Context: This content is about aviation.
# - Use ICAO phraseology"""
"#;
