use std::env;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};

use crate::config::DocsConfig;

const RENDERER_SEARCH_DIRS: &[&str] = &["tools", "build-release", "build"];
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Produce a complete HTML document rather than a fragment.
    pub standalone: bool,
    pub pretty: bool,
}

impl RenderOptions {
    pub fn page() -> Self {
        Self {
            standalone: true,
            pretty: true,
        }
    }

    pub fn fragment() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(String),
    Failed { reason: String },
}

impl RenderOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Markdown to HTML conversion, one page at a time.
pub trait Renderer {
    fn render(&mut self, source: &str, options: RenderOptions) -> RenderOutcome;
}

/// Runs an external renderer binary: markdown on stdin, HTML on stdout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl CommandRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            timeout: Duration::from_millis(crate::config::DEFAULT_RENDER_TIMEOUT_MS),
            working_dir: None,
        }
    }

    /// Locate the configured renderer and apply its arguments and timeout.
    pub fn from_config(config: &DocsConfig, project_root: &Path) -> Result<Self> {
        let Some(binary) = find_renderer(config, project_root) else {
            bail!(
                "renderer `{}` not found\nSearched WIKIDOC_RENDERER, [renderer] command, {}/{{tools,build-release,build}}, and PATH.\nInstall it or set [renderer] command in the config file.",
                config.renderer_command(),
                project_root.display()
            );
        };
        Ok(Self {
            binary,
            args: config.renderer.args.clone(),
            timeout: config.render_timeout(),
            working_dir: Some(project_root.to_path_buf()),
        })
    }

    fn command(&self, options: RenderOptions) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.args);
        if options.standalone {
            command.arg("--standalone");
        }
        if options.pretty {
            command.arg("--pretty");
        }
        if let Some(working_dir) = &self.working_dir {
            command.current_dir(working_dir);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        command
    }
}

impl Renderer for CommandRenderer {
    fn render(&mut self, source: &str, options: RenderOptions) -> RenderOutcome {
        let mut child = match self.command(options).spawn() {
            Ok(child) => child,
            Err(error) => {
                return RenderOutcome::failed(format!(
                    "failed to execute {}: {error}",
                    self.binary.display()
                ));
            }
        };

        let writer = child.stdin.take().map(|mut stdin| {
            let input = source.to_string();
            thread::spawn(move || {
                // The renderer may exit without draining stdin; its status decides the outcome.
                let _ = stdin.write_all(input.as_bytes());
            })
        });
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                stdout.read_to_end(&mut buffer).map(|_| buffer)
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return RenderOutcome::failed(format!(
                        "timed out after {} ms",
                        self.timeout.as_millis()
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(error) => {
                    let _ = child.kill();
                    return RenderOutcome::failed(format!("failed to wait for renderer: {error}"));
                }
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let output = match reader.map(|reader| reader.join()) {
            Some(Ok(Ok(buffer))) => buffer,
            Some(Ok(Err(error))) => {
                return RenderOutcome::failed(format!("failed to read renderer output: {error}"));
            }
            Some(Err(_)) => return RenderOutcome::failed("renderer output reader panicked"),
            None => Vec::new(),
        };

        if !status.success() {
            return RenderOutcome::failed(format!("renderer exited with {status}"));
        }
        let html = String::from_utf8_lossy(&output).into_owned();
        if html.trim().is_empty() {
            return RenderOutcome::failed("renderer produced no output");
        }
        RenderOutcome::Rendered(html)
    }
}

/// Resolve the renderer executable. Order: WIKIDOC_RENDERER or the configured
/// command when it names an existing path, then `<root>/tools`,
/// `<root>/build-release`, `<root>/build`, then PATH.
pub fn find_renderer(config: &DocsConfig, project_root: &Path) -> Option<PathBuf> {
    let command = config.renderer_command();
    let configured = PathBuf::from(&command);
    if configured.components().count() > 1 || configured.is_absolute() {
        let candidate = if configured.is_absolute() {
            configured.clone()
        } else {
            project_root.join(&configured)
        };
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let base_name = configured.file_name()?.to_string_lossy().into_owned();
    let names = if cfg!(windows) {
        vec![format!("{base_name}.exe"), format!("{base_name}.cmd"), base_name]
    } else {
        vec![base_name]
    };

    for dir in RENDERER_SEARCH_DIRS {
        for name in &names {
            let candidate = project_root.join(dir).join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let path_var = env::var("PATH").ok()?;
    for part in env::split_paths(&path_var) {
        let candidate_dir = PathBuf::from(strip_wrapping_quotes(&part.to_string_lossy()));
        if candidate_dir.as_os_str().is_empty() {
            continue;
        }
        for name in &names {
            let candidate = candidate_dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn strip_wrapping_quotes(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
