use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(name = "class-version-patcher")]
#[command(version, about = "Rewrite the class-file major version of classes, directories and jar/zip archives")]
pub struct Cli {
    /// Java release to rewrite from (8, 11, 17, ...), or a class-file major with --raw
    pub from: u16,

    /// Java release to rewrite to, or a class-file major with --raw
    pub to: u16,

    /// Class files, jar/zip archives or directories; quotes and backslash escapes are honored.
    /// Paths starting with `-` go after `--`
    #[arg(required = true, num_args = 1.., value_name = "PATH")]
    pub paths: Vec<String>,

    /// Interpret FROM and TO as class-file major versions instead of Java releases
    #[arg(long)]
    pub raw: bool,

    /// Force this minor version on every rewritten class
    #[arg(long, value_name = "N")]
    pub minor: Option<u16>,

    /// Allow directories in the path list and patch everything below them
    #[arg(long)]
    pub allow_directories: bool,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
