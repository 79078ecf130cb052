use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirbust",
    version,
    about = "directory and file brute forcing with wildcard detection",
    long_about = "dirbust enumerates directories and files on web servers from a wordlist.\n\nBefore scanning it probes the target for wildcard responses and either aborts, excludes the wildcard length (--autocalibrate) or continues anyway (--force).\n\nExamples:\n  dirbust -u https://target.tld/ -w words.txt\n  dirbust -u https://target.tld/ -w words.txt -x php,txt -t 50\n  dirbust -l targets.txt -w words.txt --autocalibrate -o out.json\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        visible_alias = "nc",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help_heading = "Output",
        help = "Don't print the banner and other noise."
    )]
    pub quiet: bool,

    #[arg(
        short = 'z',
        long = "no-progress",
        help_heading = "Output",
        help = "Don't display the progress bar."
    )]
    pub no_progress: bool,

    #[arg(
        long = "no-error",
        visible_alias = "ne",
        help_heading = "Output",
        help = "Don't display per-request errors."
    )]
    pub no_error: bool,

    #[arg(
        short = 'n',
        long = "no-status",
        help_heading = "Output",
        help = "Don't print status codes."
    )]
    pub no_status: bool,

    #[arg(
        long = "hide-length",
        visible_alias = "hl",
        help_heading = "Output",
        help = "Hide the length of the body in the output."
    )]
    pub hide_length: bool,

    #[arg(
        short = 'e',
        long = "expanded",
        help_heading = "Output",
        help = "Print full URLs instead of paths."
    )]
    pub expanded: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write results to a file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "output-format",
        visible_alias = "of",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output file format: text or json (defaults to the file extension, else text)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "append",
        help_heading = "Output",
        help = "Append to the output file instead of truncating it."
    )]
    pub append: bool,

    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        action = ArgAction::Append,
        conflicts_with = "list",
        help_heading = "Input",
        help = "Target URL (repeatable)."
    )]
    pub url: Vec<String>,

    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load target URLs from a file (one per line)."
    )]
    pub list: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to the wordlist."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        visible_alias = "cfg",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.dirbust/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent workers (default 10)."
    )]
    pub threads: Option<usize>,

    #[arg(
        long = "delay",
        value_name = "DURATION",
        help_heading = "Performance",
        help = "Time each worker waits between requests (e.g. 250ms, 1s)."
    )]
    pub delay: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "DURATION",
        help_heading = "Performance",
        help = "HTTP timeout per request (default 10s)."
    )]
    pub timeout: Option<String>,

    #[arg(
        long = "retry-attempts",
        visible_alias = "ra",
        value_name = "N",
        help_heading = "Performance",
        help = "Times a timed out request is retried (default 3)."
    )]
    pub retry_attempts: Option<usize>,

    #[arg(
        short = 'a',
        long = "useragent",
        visible_alias = "user-agent",
        value_name = "UA",
        help_heading = "HTTP",
        help = "Set the User-Agent string."
    )]
    pub useragent: Option<String>,

    #[arg(
        long = "random-agent",
        visible_alias = "rua",
        help_heading = "HTTP",
        help = "Use a random User-Agent string."
    )]
    pub random_agent: bool,

    #[arg(
        short = 'H',
        long = "headers",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "HTTP",
        help = "Extra header as 'Key: Value' (repeatable)."
    )]
    pub headers: Vec<String>,

    #[arg(
        short = 'c',
        long = "cookies",
        value_name = "COOKIES",
        help_heading = "HTTP",
        help = "Cookies to use for the requests."
    )]
    pub cookies: Option<String>,

    #[arg(
        short = 'U',
        long = "username",
        value_name = "USER",
        help_heading = "HTTP",
        help = "Username for basic auth."
    )]
    pub username: Option<String>,

    #[arg(
        short = 'P',
        long = "password",
        value_name = "PASS",
        help_heading = "HTTP",
        help = "Password for basic auth."
    )]
    pub password: Option<String>,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Proxy to use for requests [http(s)://host:port]."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'm',
        long = "method",
        value_name = "METHOD",
        help_heading = "HTTP",
        help = "HTTP method (default GET)."
    )]
    pub method: Option<String>,

    #[arg(
        short = 'k',
        long = "no-tls-validation",
        help_heading = "HTTP",
        help = "Skip TLS certificate verification."
    )]
    pub no_tls_validation: bool,

    #[arg(
        short = 'x',
        long = "extensions",
        value_name = "EXTS",
        help_heading = "Scan",
        help = "File extension(s) to search for (comma-separated)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 'X',
        long = "extensions-file",
        visible_alias = "xf",
        value_name = "FILE",
        help_heading = "Scan",
        help = "Read file extension(s) to search for from a file (one per line)."
    )]
    pub extensions_file: Option<String>,

    #[arg(
        short = 's',
        long = "status-codes",
        value_name = "SET",
        help_heading = "Filters",
        help = "Positive status codes, overrides --status-codes-blacklist (e.g. 200,300-399)."
    )]
    pub status_codes: Option<String>,

    #[arg(
        short = 'b',
        long = "status-codes-blacklist",
        value_name = "SET",
        help_heading = "Filters",
        help = "Negative status codes (default 404, pass \"\" to disable)."
    )]
    pub status_codes_blacklist: Option<String>,

    #[arg(
        long = "exclude-length",
        visible_alias = "xl",
        value_name = "SET",
        help_heading = "Filters",
        help = "Exclude responses with these content lengths (e.g. 0,100-110)."
    )]
    pub exclude_length: Option<String>,

    #[arg(
        short = 'f',
        long = "add-slash",
        help_heading = "Scan",
        help = "Also probe each word with a trailing slash."
    )]
    pub add_slash: bool,

    #[arg(
        short = 'd',
        long = "discover-backup",
        visible_alias = "db",
        help_heading = "Scan",
        help = "Upon finding a file search for backup files by appending backup suffixes."
    )]
    pub discover_backup: bool,

    #[arg(
        long = "autocalibrate",
        visible_alias = "ac",
        help_heading = "Wildcard",
        help = "Exclude the length of wildcard responses instead of aborting."
    )]
    pub autocalibrate: bool,

    #[arg(
        long = "force",
        help_heading = "Wildcard",
        help = "Continue even if the wildcard check or the liveness check fails."
    )]
    pub force: bool,
}
