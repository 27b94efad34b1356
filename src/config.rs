//! Runtime configuration: command-line flags first, then environment variables
//! (optionally seeded from a `.env` file), then defaults.

use crate::client::DEFAULT_BASE_URL;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POLL_SECS: u64 = 20;
pub const DEFAULT_ENERGY_SECS: u64 = 3600;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

struct Flag {
    name: &'static str,
    env: &'static str,
    /// Switches may appear without a value.
    switch: bool,
}

const FLAGS: &[Flag] = &[
    Flag { name: "client_key", env: "CARRIER_CLIENT_KEY", switch: false },
    Flag { name: "client_secret", env: "CARRIER_CLIENT_SECRET", switch: false },
    Flag { name: "base_url", env: "CARRIER_BASE_URL", switch: false },
    Flag { name: "user_email", env: "CARRIER_USER_EMAIL", switch: false },
    Flag { name: "user_email_password", env: "CARRIER_USER_PASSWORD", switch: false },
    Flag { name: "db-path", env: "CARRIER_DB_PATH", switch: false },
    Flag { name: "poll_interval", env: "POLL_INTERVAL_SECS", switch: false },
    Flag { name: "energy_interval", env: "ENERGY_INTERVAL_SECS", switch: false },
    Flag { name: "max_retries", env: "MAX_REQUEST_RETRIES", switch: false },
    Flag { name: "once", env: "POLL_ONCE", switch: true },
];

const ENV_FILE_FLAG: &str = "env-file";

#[derive(Clone)]
pub struct Config {
    pub client_key: String,
    pub client_secret: String,
    pub base_url: String,
    pub user_email: String,
    pub user_password: String,
    /// Persistence is off when unset.
    pub db_path: Option<PathBuf>,
    pub poll_interval: Duration,
    pub energy_interval: Duration,
    pub max_request_retries: NonZeroU32,
    pub once: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_key", &self.client_key)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user_email", &self.user_email)
            .field("user_password", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("poll_interval", &self.poll_interval)
            .field("energy_interval", &self.energy_interval)
            .field("max_request_retries", &self.max_request_retries)
            .field("once", &self.once)
            .finish()
    }
}

/// Flags as given on the command line, not yet merged with the environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    values: BTreeMap<&'static str, String>,
    pub env_file: Option<PathBuf>,
}

impl CliArgs {
    /// Parse `args` (program name already skipped). Flags take one or two
    /// dashes and either `-flag value` or `-flag=value`.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter().peekable();

        while let Some(arg) = args.next() {
            if arg == "--" {
                break;
            }
            let Some(stripped) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
                return Err(format!("unrecognised argument: {}", arg));
            };
            let (name, inline) = match stripped.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (stripped, None),
            };

            if name == ENV_FILE_FLAG {
                if parsed.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = inline
                    .or_else(|| args.next())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                parsed.env_file = Some(PathBuf::from(value));
                continue;
            }

            let flag = FLAGS
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| format!("unrecognised argument: {}", arg))?;
            if parsed.values.contains_key(flag.name) {
                return Err(format!("`-{}` provided more than once", flag.name));
            }
            let value = match inline {
                Some(v) => v,
                // A bare switch is "true"; it never swallows the next flag.
                None if flag.switch => match args.peek() {
                    Some(next) if parse_bool(next).is_ok() => args.next().unwrap_or_default(),
                    _ => "true".to_string(),
                },
                None => args
                    .next()
                    .ok_or_else(|| format!("`-{}` requires a value", flag.name))?,
            };
            parsed.values.insert(flag.name, value);
        }

        Ok(parsed)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl Config {
    /// Merge `cli` with the environment as seen through `env`.
    pub fn resolve(cli: &CliArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        // Credentials and paths are taken verbatim.
        let verbatim = |name: &str| -> Option<String> {
            let flag = FLAGS.iter().find(|f| f.name == name)?;
            cli.get(flag.name)
                .map(str::to_string)
                .or_else(|| env(flag.env))
                .filter(|v| !v.is_empty())
        };
        let lookup = |name: &str| -> Option<String> {
            verbatim(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| -> Result<String, String> {
            verbatim(name).ok_or_else(|| {
                let env = FLAGS.iter().find(|f| f.name == name).map(|f| f.env).unwrap_or_default();
                format!("Missing -{} (or {})", name, env)
            })
        };
        let seconds = |name: &str, default: u64| -> Result<Duration, String> {
            match lookup(name) {
                None => Ok(Duration::from_secs(default)),
                Some(v) => match v.parse::<u64>() {
                    Ok(0) | Err(_) => Err(format!("-{} must be a positive number of seconds, got {:?}", name, v)),
                    Ok(secs) => Ok(Duration::from_secs(secs)),
                },
            }
        };

        let max_request_retries = match lookup("max_retries") {
            None => NonZeroU32::new(DEFAULT_MAX_RETRIES).unwrap_or(NonZeroU32::MIN),
            Some(v) => v
                .parse::<NonZeroU32>()
                .map_err(|_| format!("-max_retries must be a positive integer, got {:?}", v))?,
        };
        let once = match lookup("once") {
            None => false,
            Some(v) => parse_bool(&v).map_err(|e| format!("-once: {}", e))?,
        };

        Ok(Config {
            client_key: required("client_key")?,
            client_secret: required("client_secret")?,
            base_url: lookup("base_url").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_email: required("user_email")?,
            user_password: required("user_email_password")?,
            db_path: verbatim("db-path").map(PathBuf::from),
            poll_interval: seconds("poll_interval", DEFAULT_POLL_SECS)?,
            energy_interval: seconds("energy_interval", DEFAULT_ENERGY_SECS)?,
            max_request_retries,
            once,
        })
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got {:?}", other)),
    }
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Parse the process arguments and seed the environment from `--env-file`
/// (or `./.env` when present). Variables already set are left alone.
pub fn configure_env_from_cli() -> Result<(CliArgs, Option<LoadedEnvFile>), String> {
    let args = std::env::args_os()
        .skip(1)
        .map(|a| a.into_string().map_err(|_| "argument contains invalid UTF-8".to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let cli = CliArgs::parse(args)?;

    let loaded = match &cli.env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            Some(LoadedEnvFile {
                path: path.clone(),
                explicit: true,
            })
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            path.is_file().then_some(LoadedEnvFile { path, explicit: false })
        }
    };
    if let Some(file) = &loaded {
        load_env_file(&file.path)?;
    }
    Ok((cli, loaded))
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let assignments = parse_env_file(&contents).map_err(|e| format!("{}:{}", path.display(), e))?;
    for (key, value) in assignments {
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// `KEY=value` lines; blank lines, `#` comments and an `export ` prefix are
/// allowed. Values may be single- or double-quoted; double quotes understand
/// `\n`, `\r`, `\t`, `\\` and `\"`.
pub fn parse_env_file(contents: &str) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let err = |msg: &str| format!("{}: {}", index + 1, msg);

        let (key, raw) = line.split_once('=').ok_or_else(|| err("missing '=' in assignment"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(err("environment variable name cannot be empty"));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(err(&format!("environment variable name contains whitespace: {}", key)));
        }
        let value = unquote(raw.trim()).map_err(|e| err(&e))?;
        out.push((key.to_string(), value));
    }
    Ok(out)
}

fn unquote(raw: &str) -> Result<String, String> {
    let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        // Unquoted: an inline comment ends the value.
        let value = raw.split('#').next().unwrap_or_default();
        return Ok(value.trim_end().to_string());
    };

    let mut value = String::new();
    let mut chars = raw[1..].char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch == quote {
            let rest = raw[1 + i + 1..].trim();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(value);
            }
            return Err("unexpected characters after closing quote".to_string());
        }
        if ch == '\\' && quote == '"' {
            let (_, escaped) = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
            value.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
        } else {
            value.push(ch);
        }
    }
    Err("unterminated quoted value".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("CARRIER_CLIENT_KEY", "ck"),
        ("CARRIER_CLIENT_SECRET", "cs"),
        ("CARRIER_USER_EMAIL", "me@example.com"),
        ("CARRIER_USER_PASSWORD", "hunter2"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let cfg = Config::resolve(&CliArgs::default(), env(REQUIRED)).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.db_path, None);
        assert_eq!(cfg.poll_interval, Duration::from_secs(20));
        assert_eq!(cfg.energy_interval, Duration::from_secs(3600));
        assert_eq!(cfg.max_request_retries.get(), 5);
        assert!(!cfg.once);
    }

    #[test]
    fn flags_override_environment() {
        let cli = CliArgs::parse(args(&[
            "-client_key",
            "flag-key",
            "--poll_interval=45",
            "-db-path",
            "/tmp/carrier.db",
            "-once",
            "-max_retries=2",
        ]))
        .unwrap();
        let cfg = Config::resolve(&cli, env(REQUIRED)).unwrap();
        assert_eq!(cfg.client_key, "flag-key");
        assert_eq!(cfg.client_secret, "cs");
        assert_eq!(cfg.poll_interval, Duration::from_secs(45));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/carrier.db")));
        assert_eq!(cfg.max_request_retries.get(), 2);
        assert!(cfg.once);
    }

    #[test]
    fn bare_switch_does_not_consume_next_flag() {
        let cli = CliArgs::parse(args(&["-once", "-poll_interval", "5"])).unwrap();
        assert_eq!(cli.get("once"), Some("true"));
        assert_eq!(cli.get("poll_interval"), Some("5"));

        let cli = CliArgs::parse(args(&["-once", "false"])).unwrap();
        let cfg = Config::resolve(&cli, env(REQUIRED)).unwrap();
        assert!(!cfg.once);
    }

    #[test]
    fn missing_required_value_names_flag_and_variable() {
        let err = Config::resolve(&CliArgs::default(), env(&REQUIRED[..3])).unwrap_err();
        assert_eq!(err, "Missing -user_email_password (or CARRIER_USER_PASSWORD)");
    }

    #[test]
    fn credentials_keep_surrounding_whitespace() {
        let mut pairs = REQUIRED.to_vec();
        pairs.retain(|(k, _)| *k != "CARRIER_USER_PASSWORD" && *k != "CARRIER_CLIENT_SECRET");
        pairs.push(("CARRIER_USER_PASSWORD", " pass phrase "));
        pairs.push(("CARRIER_CLIENT_SECRET", "cs\t"));
        pairs.push(("POLL_INTERVAL_SECS", " 30 "));
        pairs.push(("CARRIER_BASE_URL", " https://api.example.com "));
        let cfg = Config::resolve(&CliArgs::default(), env(&pairs)).unwrap();
        assert_eq!(cfg.user_password, " pass phrase ");
        assert_eq!(cfg.client_secret, "cs\t");
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.base_url, "https://api.example.com");
    }

    #[test]
    fn rejects_bad_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_REQUEST_RETRIES", "0"));
        assert!(Config::resolve(&CliArgs::default(), env(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_INTERVAL_SECS", "soon"));
        assert!(Config::resolve(&CliArgs::default(), env(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_ONCE", "maybe"));
        assert!(Config::resolve(&CliArgs::default(), env(&pairs)).is_err());
    }

    #[test]
    fn rejects_unknown_and_repeated_flags() {
        assert!(CliArgs::parse(args(&["-verbose"])).is_err());
        assert!(CliArgs::parse(args(&["positional"])).is_err());
        assert!(CliArgs::parse(args(&["-client_key"])).is_err());
        assert!(CliArgs::parse(args(&["-client_key=a", "--client_key", "b"])).is_err());
        assert!(CliArgs::parse(args(&["--env-file"])).is_err());
    }

    #[test]
    fn env_file_flag_is_parsed() {
        let cli = CliArgs::parse(args(&["--env-file", "prod.env", "--", "ignored"])).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        let cli = CliArgs::parse(args(&["--env-file=dev.env"])).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("dev.env")));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = Config::resolve(&CliArgs::default(), env(REQUIRED)).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("\"cs\""));
        assert!(shown.contains("me@example.com"));
    }

    #[test]
    fn env_file_syntax() {
        let parsed = parse_env_file(
            r#"
# comment
export CARRIER_CLIENT_KEY=abc # trailing
CARRIER_CLIENT_SECRET="s3c\"ret\n"
CARRIER_USER_PASSWORD='p#ss'
EMPTY=
"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                ("CARRIER_CLIENT_KEY".to_string(), "abc".to_string()),
                ("CARRIER_CLIENT_SECRET".to_string(), "s3c\"ret\n".to_string()),
                ("CARRIER_USER_PASSWORD".to_string(), "p#ss".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn env_file_errors_carry_line_numbers() {
        assert_eq!(parse_env_file("A=1\nNOPE").unwrap_err(), "2: missing '=' in assignment");
        assert!(parse_env_file("A=\"open").is_err());
        assert!(parse_env_file("A='x' y").is_err());
        assert!(parse_env_file("BAD KEY=1").is_err());
    }
}
