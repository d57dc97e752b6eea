use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    name = "vodfetch",
    version,
    about = "Download, decrypt and merge HLS (m3u8) videos",
    long_about = "Downloads every transport-stream segment listed in an m3u8 playlist,\n\
                  decrypts AES-128 protected segments and concatenates them into a\n\
                  single output file. Segments are staged in a workspace directory\n\
                  that can be inspected with `status` and emptied with `clean`."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding downloaded segments until assembly
    #[arg(
        long,
        global = true,
        env = "VODFETCH_WORKSPACE_DIR",
        default_value = "ts_files"
    )]
    pub workspace_dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub connect_timeout: u64,

    /// Retry attempts per HTTP request
    #[arg(long, global = true, default_value = "3")]
    pub retries: u32,

    /// Custom HTTP headers for requests
    #[arg(
        long = "header",
        short = 'H',
        global = true,
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Override the User-Agent header
    #[arg(long, global = true)]
    pub user_agent: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect a playlist without downloading segments
    Analyze {
        /// URL of the m3u8 playlist
        url: String,
    },

    /// Download, decrypt and merge a playlist into one file
    Download {
        /// URL of the m3u8 playlist
        url: String,

        /// Output file path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Maximum number of concurrent segment downloads
        #[arg(short, long, default_value = "4")]
        concurrency: usize,

        /// Retry passes over failed segments
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Free space required before starting, in MB
        #[arg(long, env = "VODFETCH_REQUIRED_SPACE_MB", default_value = "1000")]
        required_space_mb: u64,

        /// Show a progress bar
        #[arg(short = 'P', long = "progress")]
        show_progress: bool,
    },

    /// Show what the segment workspace currently holds
    Status,

    /// Delete every segment file from the workspace
    Clean,

    /// List prompt templates, or render one
    Prompts {
        /// Template id
        id: Option<String>,

        /// Playlist URL substituted into the template
        #[arg(long, requires = "id")]
        url: Option<String>,

        /// Output path substituted into the template
        #[arg(short, long, default_value = "output.mp4")]
        output: String,
    },

    /// List documentation resources, or print one
    Resources {
        /// Resource URI
        uri: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn download_defaults() {
        let args = Args::try_parse_from([
            "vodfetch",
            "download",
            "https://cdn.example.com/index.m3u8",
        ])
        .unwrap();
        match args.command {
            Commands::Download {
                output,
                concurrency,
                max_retries,
                ..
            } => {
                assert_eq!(output, PathBuf::from("output.mp4"));
                assert_eq!(concurrency, 4);
                assert_eq!(max_retries, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::try_parse_from([
            "vodfetch",
            "status",
            "--json",
            "--workspace-dir",
            "/tmp/segments",
            "-H",
            "Referer: https://example.com",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.workspace_dir, PathBuf::from("/tmp/segments"));
        assert_eq!(args.headers.len(), 1);
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["vodfetch", "-v", "-q", "clean"]).is_err());
    }
}
