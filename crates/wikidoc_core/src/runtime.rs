use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::render_default_config;

pub const SIDEBAR_FILENAME: &str = "_Sidebar.md";
pub const FOOTER_FILENAME: &str = "_Footer.md";

const STATE_DIRNAME: &str = ".wikidoc";
const DEFAULT_WIKI_DIRNAME: &str = "wiki";
const DEFAULT_OUTPUT_DIRNAME: &str = "build";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub wiki_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
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
    pub wiki_dir: PathBuf,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub wiki_source: ValueSource,
    pub output_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn sidebar_path(&self) -> PathBuf {
        self.wiki_dir.join(SIDEBAR_FILENAME)
    }

    pub fn footer_path(&self) -> PathBuf {
        self.wiki_dir.join(FOOTER_FILENAME)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nwiki_dir={} ({})\noutput_dir={} ({})\nstate_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.wiki_dir),
            self.wiki_source.as_str(),
            normalize_for_display(&self.output_dir),
            self.output_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub project_root_exists: bool,
    pub wiki_dir_exists: bool,
    pub output_dir_exists: bool,
    pub config_exists: bool,
    pub sidebar_exists: bool,
    pub footer_exists: bool,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    let project_root_exists = paths.project_root.exists();
    let wiki_dir_exists = paths.wiki_dir.is_dir();
    let output_dir_exists = paths.output_dir.is_dir();
    let config_exists = paths.config_path.exists();
    let sidebar_exists = paths.sidebar_path().exists();
    let footer_exists = paths.footer_path().exists();

    let mut warnings = Vec::new();
    if !wiki_dir_exists {
        warnings.push(format!(
            "{} is missing; point --wiki-dir at a wiki checkout",
            normalize_for_display(&paths.wiki_dir)
        ));
    } else if !sidebar_exists {
        warnings.push(format!(
            "{SIDEBAR_FILENAME} is missing; page order falls back to Home plus unlisted pages"
        ));
    }
    if !config_exists {
        warnings.push("config file is missing; built-in defaults apply (run `wikidoc init`)".to_string());
    }

    RuntimeStatus {
        project_root_exists,
        wiki_dir_exists,
        output_dir_exists,
        config_exists,
        sidebar_exists,
        footer_exists,
        warnings,
    }
}

pub fn ensure_wiki_ready(paths: &ResolvedPaths, status: &RuntimeStatus) -> Result<()> {
    if !status.wiki_dir_exists {
        bail!(
            "Wiki directory not found.\nMissing required path:\n  - {}\nRun with: wikidoc --wiki-dir <path-to-wiki-checkout> <command>",
            normalize_for_display(&paths.wiki_dir)
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
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
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env)
        .context("failed to resolve project root")?;
    let state_dir = project_root.join(STATE_DIRNAME);

    let (wiki_dir, wiki_source) = resolve_project_path(
        overrides.wiki_dir.as_deref(),
        &lookup_env,
        "WIKIDOC_WIKI_DIR",
        &project_root,
        project_root.join(DEFAULT_WIKI_DIRNAME),
    );
    let (output_dir, output_source) = resolve_project_path(
        overrides.output_dir.as_deref(),
        &lookup_env,
        "WIKIDOC_OUTPUT_DIR",
        &project_root,
        project_root.join(DEFAULT_OUTPUT_DIRNAME),
    );
    let (config_path, config_source) = resolve_project_path(
        overrides.config.as_deref(),
        &lookup_env,
        "WIKIDOC_CONFIG",
        &project_root,
        state_dir.join("config.toml"),
    );

    Ok(ResolvedPaths {
        project_root,
        wiki_dir,
        output_dir,
        state_dir,
        config_path,
        root_source,
        wiki_source,
        output_source,
        config_source,
    })
}

fn resolve_project_path<F>(
    flag: Option<&Path>,
    lookup_env: &F,
    env_key: &str,
    project_root: &Path,
    default: PathBuf,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = flag {
        return (absolutize(path, project_root), ValueSource::Flag);
    }
    if let Some(value) = lookup_env(env_key).filter(|value| !value.trim().is_empty()) {
        return (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Env,
        );
    }
    (default, ValueSource::Default)
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.wiki_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), options.force)?;

    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> Result<(PathBuf, ValueSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return Ok((absolutize(path, &context.cwd), ValueSource::Flag));
    }

    if let Some(value) = lookup_env("WIKIDOC_PROJECT_ROOT").filter(|value| !value.trim().is_empty())
    {
        return Ok((
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        ));
    }

    let root = detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref());
    Ok((root, ValueSource::Heuristic))
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> PathBuf {
    let mut seen = HashSet::new();
    for candidate in candidate_roots(cwd, executable_dir) {
        let key = normalize_for_display(&candidate);
        if !seen.insert(key) {
            continue;
        }
        if candidate.join(STATE_DIRNAME).is_dir()
            || candidate.join(DEFAULT_WIKI_DIRNAME).join(SIDEBAR_FILENAME).exists()
        {
            return candidate;
        }
    }
    cwd.to_path_buf()
}

fn candidate_roots(cwd: &Path, executable_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = cwd.ancestors().map(Path::to_path_buf).collect();
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

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
