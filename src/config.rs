//! Configuration types for content-relay
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - The shared text context built from that configuration

use crate::error::ConfigError;
use crate::fields::{Field, FieldCatalog, SizeUnit};
use crate::text::{Collation, TextContext, TextEncoding};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Idle timeout limits (milliseconds)
const MIN_IDLE_MS: u64 = 10;
const MAX_IDLE_MS: u64 = 10_000;

/// Upper bound for the response, chunk and join timeouts (milliseconds)
const MAX_WAIT_MS: u64 = 600_000;

/// Buffer size limits (UTF-16 units)
const MIN_BUFFER_UNITS: usize = 64;
const MAX_BUFFER_UNITS: usize = 16 * 1024 * 1024;

/// Library defaults
const DEFAULT_IDLE_MS: u64 = 100;
const DEFAULT_RESPONSE_MS: u64 = 5_000;
const DEFAULT_JOIN_MS: u64 = 1_000;
const DEFAULT_PROGRESS_MS: u64 = 100;
const DEFAULT_BUFFER_UNITS: usize = 8_192;

/// Extract document fields through a cancelable background relay
#[derive(Parser, Debug, Clone)]
#[command(
    name = "content-relay",
    version,
    about = "Extract and compare document fields through a cancelable background relay",
    long_about = "Drives a blocking document backend from a dedicated worker thread and hands \
                  its output back in bounded chunks.\n\n\
                  Documents are plain text files; pages are separated by form feed.",
    after_help = "EXAMPLES:\n    \
        content-relay fields\n    \
        content-relay extract report.txt --field title\n    \
        content-relay extract report.txt --field text --find invoice\n    \
        content-relay extract report.txt --field page-width --unit cm\n    \
        content-relay compare a.txt b.txt --field text -p"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Close an open document after this much inactivity
    #[arg(long, default_value_t = DEFAULT_IDLE_MS, value_name = "MS", global = true)]
    pub idle_timeout_ms: u64,

    /// How long the worker waits for the next chunk request (defaults to the idle timeout)
    #[arg(long, value_name = "MS", global = true)]
    pub chunk_timeout_ms: Option<u64>,

    /// How long a request waits for the worker
    #[arg(long, default_value_t = DEFAULT_RESPONSE_MS, value_name = "MS", global = true)]
    pub response_timeout_ms: u64,

    /// How long shutdown waits for the worker thread
    #[arg(long, default_value_t = DEFAULT_JOIN_MS, value_name = "MS", global = true)]
    pub join_timeout_ms: u64,

    /// Output buffer size in UTF-16 units
    #[arg(short = 'b', long, default_value_t = DEFAULT_BUFFER_UNITS, value_name = "UNITS", global = true)]
    pub buffer_units: usize,

    /// Encoding of the text pushed by the backend
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf16be, global = true)]
    pub encoding: EncodingArg,

    /// Compare text case-sensitively
    #[arg(long, global = true)]
    pub exact_case: bool,

    /// Host interface version, e.g. "2.10"; older versions hide date and compare fields
    #[arg(long, value_name = "HI.LOW", global = true)]
    pub interface_version: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// List the field catalog
    Fields,

    /// Extract one field from a document
    Extract {
        /// Document to read
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Field name (e.g. "title", "first-row", "text")
        #[arg(short, long, value_name = "FIELD")]
        field: String,

        /// Unit for page sizes
        #[arg(long, value_enum, default_value_t = UnitArg::Mm)]
        unit: UnitArg,

        /// Stop the text stream once this string is found
        #[arg(long, value_name = "TEXT")]
        find: Option<String>,

        /// Stop the text stream after this many chunks
        #[arg(long, value_name = "NUM")]
        max_chunks: Option<usize>,
    },

    /// Compare one field of two documents
    Compare {
        /// First document
        #[arg(value_name = "FILE_A")]
        source_a: PathBuf,

        /// Second document
        #[arg(value_name = "FILE_B")]
        source_b: PathBuf,

        /// Field name (e.g. "text", "title")
        #[arg(short, long, value_name = "FIELD", default_value = "text")]
        field: String,

        /// Show compare progress
        #[arg(short = 'p', long)]
        progress: bool,
    },
}

/// Text encoding on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    Utf16be,
    Utf8,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf16be => TextEncoding::Utf16Be,
            EncodingArg::Utf8 => TextEncoding::Utf8,
        }
    }
}

/// Page size unit on the command line, in unit-index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitArg {
    Mm,
    Cm,
    In,
    Pt,
}

impl UnitArg {
    /// Unit index passed with the request
    pub fn unit_index(self) -> i32 {
        match self {
            UnitArg::Mm => 0,
            UnitArg::Cm => 1,
            UnitArg::In => 2,
            UnitArg::Pt => 3,
        }
    }

    pub fn size_unit(self) -> Option<SizeUnit> {
        SizeUnit::from_unit_index(self.unit_index())
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Close the document after this long without a request
    pub idle_timeout: Duration,

    /// Producer wait for the caller to ask for the next chunk
    pub chunk_timeout: Duration,

    /// Caller wait for the worker (and comparison round timeout)
    pub response_timeout: Duration,

    /// Bounded wait when joining the worker on teardown
    pub join_timeout: Duration,

    /// Minimum time between compare progress reports
    pub progress_interval: Duration,

    /// Size of internally allocated buffers
    pub default_buffer_units: usize,

    /// Backend wire encoding
    pub encoding: TextEncoding,

    /// Text comparison collation
    pub collation: Collation,

    /// Host capabilities
    pub catalog: FieldCatalog,

    /// Show progress indicator
    pub show_progress: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let idle_timeout = Duration::from_millis(DEFAULT_IDLE_MS);
        Self {
            idle_timeout,
            chunk_timeout: idle_timeout,
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_MS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_MS),
            default_buffer_units: DEFAULT_BUFFER_UNITS,
            encoding: TextEncoding::default(),
            collation: Collation::default(),
            catalog: FieldCatalog::default(),
            show_progress: false,
        }
    }
}

impl RelayConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        check_timeout("idle timeout", args.idle_timeout_ms, MIN_IDLE_MS, MAX_IDLE_MS)?;

        // The caller must be willing to wait at least as long as the worker idles
        check_timeout(
            "response timeout",
            args.response_timeout_ms,
            args.idle_timeout_ms,
            MAX_WAIT_MS,
        )?;

        let chunk_timeout_ms = args.chunk_timeout_ms.unwrap_or(args.idle_timeout_ms);
        check_timeout("chunk timeout", chunk_timeout_ms, MIN_IDLE_MS, MAX_WAIT_MS)?;
        check_timeout("join timeout", args.join_timeout_ms, MIN_IDLE_MS, MAX_WAIT_MS)?;

        if !(MIN_BUFFER_UNITS..=MAX_BUFFER_UNITS).contains(&args.buffer_units) {
            return Err(ConfigError::InvalidBufferSize {
                units: args.buffer_units,
                min: MIN_BUFFER_UNITS,
                max: MAX_BUFFER_UNITS,
            });
        }

        let catalog = match &args.interface_version {
            Some(version) => parse_interface_version(version)?,
            None => FieldCatalog::default(),
        };

        for source in args.command.sources() {
            check_source(source)?;
        }

        Ok(Self {
            idle_timeout: Duration::from_millis(args.idle_timeout_ms),
            chunk_timeout: Duration::from_millis(chunk_timeout_ms),
            response_timeout: Duration::from_millis(args.response_timeout_ms),
            join_timeout: Duration::from_millis(args.join_timeout_ms),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_MS),
            default_buffer_units: args.buffer_units,
            encoding: args.encoding.into(),
            collation: if args.exact_case {
                Collation::Exact
            } else {
                Collation::CaseInsensitive
            },
            catalog,
            show_progress: !args.quiet,
        })
    }

    /// Text context shared by every pipeline built from this configuration
    pub fn text_context(&self) -> TextContext {
        TextContext {
            encoding: self.encoding,
            collation: self.collation,
            ..TextContext::default()
        }
    }
}

impl Command {
    /// Document paths named by the command
    pub fn sources(&self) -> Vec<&Path> {
        match self {
            Command::Fields => Vec::new(),
            Command::Extract { source, .. } => vec![source.as_path()],
            Command::Compare {
                source_a, source_b, ..
            } => vec![source_a.as_path(), source_b.as_path()],
        }
    }
}

/// Resolve a field name from the command line
pub fn resolve_field(name: &str) -> Result<Field, ConfigError> {
    Field::from_name(name).ok_or_else(|| ConfigError::UnknownField(name.to_string()))
}

fn check_timeout(name: &'static str, value_ms: u64, min_ms: u64, max_ms: u64) -> Result<(), ConfigError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigError::InvalidTimeout {
            name,
            value_ms,
            min_ms,
            max_ms,
        });
    }
    Ok(())
}

fn check_source(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::InvalidSource {
            path: path.to_path_buf(),
            reason: "does not exist".to_string(),
        });
    }
    if path.is_dir() {
        return Err(ConfigError::InvalidSource {
            path: path.to_path_buf(),
            reason: "is a directory".to_string(),
        });
    }
    Ok(())
}

fn parse_interface_version(version: &str) -> Result<FieldCatalog, ConfigError> {
    let parsed = version
        .split_once('.')
        .and_then(|(hi, low)| Some((hi.trim().parse().ok()?, low.trim().parse().ok()?)));

    match parsed {
        Some((hi, low)) => Ok(FieldCatalog::for_interface_version(hi, low)),
        None => Err(ConfigError::InvalidInterfaceVersion(version.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["content-relay"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_args(&parse(&["fields"])).unwrap();
        assert_eq!(config.idle_timeout, Duration::from_millis(100));
        assert_eq!(config.chunk_timeout, config.idle_timeout);
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.default_buffer_units, 8192);
        assert_eq!(config.encoding, TextEncoding::Utf16Be);
        assert!(config.catalog.enable_compare);
    }

    #[test]
    fn test_timeout_validation() {
        let err = RelayConfig::from_args(&parse(&["--idle-timeout-ms", "5", "fields"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { name: "idle timeout", .. }));

        let err = RelayConfig::from_args(&parse(&[
            "--idle-timeout-ms",
            "500",
            "--response-timeout-ms",
            "100",
            "fields",
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { name: "response timeout", .. }));
    }

    #[test]
    fn test_buffer_validation() {
        let err = RelayConfig::from_args(&parse(&["-b", "8", "fields"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBufferSize { units: 8, .. }));
    }

    #[test]
    fn test_source_validation() {
        let err = RelayConfig::from_args(&parse(&[
            "extract",
            "/no/such/file.txt",
            "--field",
            "title",
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSource { .. }));

        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(RelayConfig::from_args(&parse(&["extract", path, "--field", "title"])).is_ok());
    }

    #[test]
    fn test_interface_version() {
        let config =
            RelayConfig::from_args(&parse(&["--interface-version", "1.1", "fields"])).unwrap();
        assert!(!config.catalog.enable_datetime);
        assert!(!config.catalog.enable_compare);

        let err = RelayConfig::from_args(&parse(&["--interface-version", "two", "fields"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterfaceVersion(_)));
    }

    #[test]
    fn test_resolve_field_and_units() {
        assert_eq!(resolve_field("page-width").unwrap(), Field::PageWidth);
        assert!(matches!(resolve_field("bogus"), Err(ConfigError::UnknownField(_))));
        assert_eq!(UnitArg::In.unit_index(), 2);
        assert_eq!(UnitArg::Pt.size_unit(), Some(SizeUnit::Points));
    }

    #[test]
    fn test_text_context_follows_config() {
        let config = RelayConfig {
            encoding: TextEncoding::Utf8,
            collation: Collation::Exact,
            ..RelayConfig::default()
        };
        let context = config.text_context();
        assert_eq!(context.encoding, TextEncoding::Utf8);
        assert_eq!(context.collation, Collation::Exact);
        assert!(!context.compare_delimiters.is_empty());
    }
}
