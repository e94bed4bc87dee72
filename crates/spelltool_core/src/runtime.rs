use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cache::DEFAULT_CACHE_FILE;
use crate::config::{ToolConfig, render_default_config};
use crate::keybinds::DEFAULT_KEYBINDS_FILE;

pub const STATE_DIR_NAME: &str = ".spelltool";
pub const TOKEN_FILENAME: &str = "blizzard_token.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub keybinds_path: PathBuf,
    pub cache_path: PathBuf,
    pub token_path: PathBuf,
    pub env_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub documents_source: ValueSource,
}

impl ResolvedPaths {
    /// Apply `[paths]` overrides from the loaded tool config.
    pub fn with_config(mut self, config: &ToolConfig) -> Self {
        let root = self.project_root.clone();
        let mut touched = false;
        let mut apply = |target: &mut PathBuf, value: &Option<String>| {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = absolutize(Path::new(value), &root);
                touched = true;
            }
        };
        apply(&mut self.keybinds_path, &config.paths.keybinds);
        apply(&mut self.cache_path, &config.paths.cache);
        apply(&mut self.token_path, &config.paths.token);
        apply(&mut self.env_path, &config.paths.env_file);
        if touched {
            self.documents_source = ValueSource::Config;
        }
        self
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})\nkeybinds_path={} ({})\ncache_path={}\ntoken_path={}\nenv_path={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.keybinds_path),
            self.documents_source.as_str(),
            normalize_for_display(&self.cache_path),
            normalize_for_display(&self.token_path),
            normalize_for_display(&self.env_path),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SPELLTOOL_CONFIG").filter(|v| !v.trim().is_empty()) {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        keybinds_path: project_root.join(DEFAULT_KEYBINDS_FILE),
        cache_path: project_root.join(DEFAULT_CACHE_FILE),
        token_path: state_dir.join(TOKEN_FILENAME),
        env_path: project_root.join(".env"),
        project_root,
        state_dir,
        config_path,
        root_source,
        config_source,
        documents_source: ValueSource::Default,
    })
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn init_layout(paths: &ResolvedPaths, force: bool) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    if !paths.state_dir.exists() {
        fs::create_dir_all(&paths.state_dir)
            .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
        created_dirs.push(paths.state_dir.clone());
    }
    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env("SPELLTOOL_PROJECT_ROOT").filter(|v| !v.trim().is_empty()) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    match detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref()) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    for candidate in candidate_roots(cwd, executable_dir) {
        let key = normalize_for_display(&candidate);
        if !seen.insert(key) {
            continue;
        }
        if candidate.join(DEFAULT_KEYBINDS_FILE).exists() {
            return Some(candidate);
        }
    }
    None
}

fn candidate_roots(cwd: &Path, executable_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out = cwd.ancestors().map(Path::to_path_buf).collect::<Vec<_>>();
    if let Some(exe_dir) = executable_dir {
        out.extend(exe_dir.ancestors().map(Path::to_path_buf));
    }
    out
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
