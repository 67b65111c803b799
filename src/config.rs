use std::env;
use std::path::PathBuf;

use crate::cli::{Cli, OutputFormat};
use crate::error::PatchResult;
use crate::tokenize::split_paths;
use crate::version::release_to_major;

pub const ALLOW_DIRECTORIES_ENV: &str = "CLASS_VERSION_PATCHER_ALLOW_DIRECTORIES";

/// Everything one batch run needs, resolved from the command line and the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    pub from_major: u16,
    pub to_major: u16,
    pub minor: Option<u16>,
    pub allow_directories: bool,
    pub paths: Vec<PathBuf>,
    pub format: OutputFormat,
}

impl PatchConfig {
    pub fn resolve(cli: &Cli) -> PatchResult<Self> {
        Self::resolve_with(cli, env::var(ALLOW_DIRECTORIES_ENV).ok().as_deref())
    }

    pub fn resolve_with(cli: &Cli, allow_directories_env: Option<&str>) -> PatchResult<Self> {
        let (from_major, to_major) = if cli.raw {
            (cli.from, cli.to)
        } else {
            (release_to_major(cli.from)?, release_to_major(cli.to)?)
        };

        Ok(Self {
            from_major,
            to_major,
            minor: cli.minor,
            allow_directories: cli.allow_directories
                || allow_directories_env.is_some_and(is_truthy),
            paths: split_paths(&cli.paths.join(" "))?,
            format: cli.format,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
