use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable holding the API key for mutating routes
pub const API_KEY_ENV: &str = "API_KEY";

#[derive(Parser, Debug)]
#[command(name = "molecule")]
#[command(about = "Discover service URLs and port mappings from a Nomad cluster")]
#[command(version)]
pub struct Args {
    /// Path to the YAML config file
    #[arg(short, long, env = "CONFIG_FILE", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Read live state from the configured Nomad agent instead of sample data
    #[arg(long, env = "PROD")]
    pub prod: bool,

    /// API key required by the allocation restart route
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the configured bind address
    #[arg(long, value_name = "ADDR")]
    pub bind_addr: Option<String>,

    /// Override the configured port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to a .env file loaded before the config
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Print the endpoint directory once and exit
    #[arg(long)]
    pub list: bool,
}

/// Errors raised before the arguments are parsed
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Find the `--env-file` value in raw arguments
pub fn find_env_file<I, T>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut iter = args.into_iter().map(Into::into);
    while let Some(arg) = iter.next() {
        if arg == "--env-file" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(value) = arg.to_str().and_then(|a| a.strip_prefix("--env-file=")) {
            return Some(PathBuf::from(value));
        }
    }
    None
}

impl Args {
    /// Parse the process arguments after loading any `--env-file`
    pub fn load() -> Result<Self, CliError> {
        Self::load_from(std::env::args_os())
    }

    /// Load the env file named in `args` first, so variables it sets
    /// (`PROD`, `CONFIG_FILE`, `API_KEY`, `RUST_LOG`) are visible to clap
    /// and everything after it.
    pub fn load_from<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        if let Some(path) = find_env_file(&args) {
            dotenvy::from_path(&path).map_err(|source| CliError::EnvFile { path, source })?;
        }

        Ok(Self::parse_from(args))
    }

    /// Log filter for the verbosity count
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// The API key from the flag, or from the environment once any
    /// `--env-file` has been loaded
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_clap_defaults() {
        let args = Args::parse_from(["molecule", "--config", "molecule.yaml"]);
        assert_eq!(args.config, Some(PathBuf::from("molecule.yaml")));
        assert!(!args.list);
        assert_eq!(args.verbose, 0);
        assert_eq!(args.log_filter(), "warn");
    }

    #[test]
    fn test_clap_verbose() {
        let args = Args::parse_from(["molecule", "-vvv"]);
        assert_eq!(args.verbose, 3);
        assert_eq!(args.log_filter(), "trace");
    }

    #[test]
    fn test_clap_overrides() {
        let args = Args::parse_from([
            "molecule",
            "--prod",
            "--bind-addr",
            "127.0.0.1",
            "--port",
            "9000",
            "--api-key",
            "s3cret",
            "--list",
        ]);
        assert!(args.prod);
        assert!(args.list);
        assert_eq!(args.bind_addr, Some("127.0.0.1".to_string()));
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.resolve_api_key(), Some("s3cret".to_string()));
    }

    #[test]
    fn test_find_env_file() {
        assert_eq!(
            find_env_file(["molecule", "-v", "--env-file", "prod.env"]),
            Some(PathBuf::from("prod.env"))
        );
        assert_eq!(
            find_env_file(["molecule", "--env-file=prod.env"]),
            Some(PathBuf::from("prod.env"))
        );
        assert_eq!(find_env_file(["molecule", "--env-file"]), None);
        assert_eq!(find_env_file(["molecule", "--list"]), None);
    }

    #[test]
    fn test_env_file_can_enable_prod() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "PROD=true").unwrap();
        writeln!(file, "MOLECULE_TEST_ENV_FILE_MARKER=loaded").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::load_from(["molecule", "--env-file", path.as_str()]).unwrap();

        assert_eq!(
            std::env::var("MOLECULE_TEST_ENV_FILE_MARKER").as_deref(),
            Ok("loaded")
        );
        assert!(args.prod);
        assert_eq!(args.env_file, Some(PathBuf::from(path)));
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let result = Args::load_from(["molecule", "--env-file", "/nonexistent/molecule.env"]);
        assert!(matches!(result, Err(CliError::EnvFile { .. })));
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let args = Args::parse_from(["molecule", "--api-key", ""]);
        assert_eq!(args.api_key, Some(String::new()));
        if std::env::var(API_KEY_ENV).is_err() {
            assert_eq!(args.resolve_api_key(), None);
        }
    }
}
