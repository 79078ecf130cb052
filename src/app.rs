use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::detector::response::random_user_agent;
use crate::detector::DirOptions;
use crate::logging;
use crate::output::{self, OutputFormat, OutputWriter, RenderOptions};
use crate::progress::{MessageLevel, ProgressEvent};
use crate::runner::{Options, Runner, ScanError, WordlistSource, DEFAULT_USER_AGENT};
use crate::utils::{self, IntSet, ParseError};

fn print_banner() {
    const BANNER: &str = r#"
       ___      __               __
  ____/ (_)____/ /_  __  _______/ /_
 / __  / / ___/ __ \/ / / / ___/ __/
/ /_/ / / /  / /_/ / /_/ (__  ) /_
\__,_/_/_/  /_.___/\__,_/____/\__/
"#;
    print!("{}", BANNER);
    println!(
        "       v{} - directory and file enumeration",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<24}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    options: Options,
    dir: DirOptions,
    list: Option<String>,
    extensions_file: Option<String>,
    output: Option<String>,
    output_format: OutputFormat,
    render: RenderOptions,
    quiet: bool,
    no_progress: bool,
    no_error: bool,
    no_color: bool,
    verbose: u8,
}

fn parse_set(flag: &str, raw: &str) -> Result<IntSet, String> {
    IntSet::parse(raw).map_err(|e| format!("invalid value for {flag}: {e}"))
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let quiet = args.quiet || cfg.quiet.unwrap_or(false);
    let no_progress = args.no_progress || cfg.no_progress.unwrap_or(false);
    let no_error = args.no_error || cfg.no_error.unwrap_or(false);

    let (urls, list) = match (args.url.is_empty(), args.list) {
        (false, _) => (args.url, None),
        (true, Some(list)) => (Vec::new(), Some(list)),
        (true, None) => (cfg.urls.unwrap_or_default(), cfg.list),
    };
    if !urls.is_empty() && list.is_some() {
        return Err(ParseError::ConflictingTargets.to_string());
    }
    if urls.is_empty() && list.is_none() {
        return Err(ParseError::MissingTarget.to_string());
    }
    let list = list.map(|p| config::expand_tilde_string(&p));

    let wordlist = args
        .wordlist
        .or(cfg.wordlist)
        .map(|p| config::expand_tilde_string(&p))
        .ok_or_else(|| "wordlist is required (--wordlist)".to_string())?;

    let threads = args.threads.or(cfg.threads).unwrap_or(10);
    if threads == 0 {
        return Err(ParseError::InvalidThreads { value: threads }.to_string());
    }
    let timeout = match args.timeout.or(cfg.timeout) {
        Some(raw) => utils::parse_duration(&raw).map_err(|e| format!("invalid timeout: {e}"))?,
        None => Duration::from_secs(10),
    };
    let delay = args
        .delay
        .or(cfg.delay)
        .map(|raw| utils::parse_duration(&raw))
        .transpose()
        .map_err(|e| format!("invalid delay: {e}"))?;
    let retry_attempts = args.retry_attempts.or(cfg.retry_attempts).unwrap_or(3);

    let method_raw = args
        .method
        .or(cfg.method)
        .unwrap_or_else(|| "GET".to_string());
    let method = Method::from_bytes(method_raw.trim().to_uppercase().as_bytes())
        .map_err(|_| format!("invalid method '{method_raw}'"))?;

    let user_agent = if args.random_agent || cfg.random_agent.unwrap_or(false) {
        random_user_agent().to_string()
    } else {
        args.useragent
            .or(cfg.useragent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    };

    let raw_headers = if args.headers.is_empty() {
        cfg.headers.unwrap_or_default()
    } else {
        args.headers
    };
    let headers = raw_headers
        .iter()
        .map(|h| utils::parse_header(h))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let username = args.username.or(cfg.username);
    let password = args.password.or(cfg.password);
    if password.is_some() && username.is_none() {
        return Err("password requires a username".to_string());
    }

    let extensions = match args.extensions.or(cfg.extensions) {
        Some(raw) => utils::parse_extensions_csv(&raw)
            .map_err(|e| format!("invalid value for extensions: {e}"))?,
        None => Vec::new(),
    };
    let extensions_file = args
        .extensions_file
        .or(cfg.extensions_file)
        .map(|p| config::expand_tilde_string(&p));

    let status_codes = parse_set(
        "status-codes",
        &args.status_codes.or(cfg.status_codes).unwrap_or_default(),
    )?;
    let status_codes_blacklist = parse_set(
        "status-codes-blacklist",
        &args
            .status_codes_blacklist
            .or(cfg.status_codes_blacklist)
            .unwrap_or_else(|| "404".to_string()),
    )?;
    let exclude_length = parse_set(
        "exclude-length",
        &args.exclude_length.or(cfg.exclude_length).unwrap_or_default(),
    )?;

    let output = args
        .output
        .or(cfg.output)
        .map(|p| config::expand_tilde_string(&p));
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or_default(),
    };

    let options = Options {
        targets: urls,
        wordlist: WordlistSource::FilePath(wordlist),
        threads,
        timeout,
        no_tls_validation: args.no_tls_validation || cfg.no_tls_validation.unwrap_or(false),
        user_agent,
        headers,
        cookies: args.cookies.or(cfg.cookies),
        username,
        password,
        proxy: args.proxy.or(cfg.proxy),
        delay,
        retry_attempts,
        method,
        output_append: args.append || cfg.append.unwrap_or(false),
    };

    let dir = DirOptions {
        extensions,
        status_codes,
        status_codes_blacklist,
        exclude_length,
        add_slash: args.add_slash || cfg.add_slash.unwrap_or(false),
        expanded: args.expanded || cfg.expanded.unwrap_or(false),
        discover_backup: args.discover_backup || cfg.discover_backup.unwrap_or(false),
        autocalibrate: args.autocalibrate || cfg.autocalibrate.unwrap_or(false),
        force: args.force || cfg.force.unwrap_or(false),
    };

    let render = RenderOptions {
        no_status: args.no_status || cfg.no_status.unwrap_or(false),
        hide_length: args.hide_length || cfg.hide_length.unwrap_or(false),
        color: !no_color,
    };

    Ok(RunConfig {
        options,
        dir,
        list,
        extensions_file,
        output,
        output_format,
        render,
        quiet,
        no_progress,
        no_error,
        no_color,
        verbose: args.verbose,
    })
}

fn print_settings(run: &RunConfig, runner: &Runner) {
    let targets = runner
        .targets()
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>();
    if targets.len() == 1 {
        format_kv_line("Url", targets[0]);
    } else {
        format_kv_line("Targets", &targets.len().to_string());
    }
    format_kv_line("Method", runner.options().method.as_str());
    format_kv_line("Threads", &runner.options().threads.to_string());
    if let WordlistSource::FilePath(path) = &runner.options().wordlist {
        format_kv_line("Wordlist", path);
    }
    let dir = runner.dir_options();
    if dir.status_codes.is_empty() {
        format_kv_line(
            "Negative Status codes",
            &dir.status_codes_blacklist.to_compressed_string(),
        );
    } else {
        format_kv_line("Status codes", &dir.status_codes.to_compressed_string());
    }
    if !dir.exclude_length.is_empty() {
        format_kv_line("Exclude Length", &dir.exclude_length.to_compressed_string());
    }
    if let Some(proxy) = runner.options().proxy.as_deref() {
        format_kv_line("Proxy", proxy);
    }
    if runner.options().username.is_some() {
        format_kv_line("Auth User", runner.options().username.as_deref().unwrap_or_default());
    }
    format_kv_line("User Agent", &runner.options().user_agent);
    if !dir.extensions.is_empty() {
        format_kv_line("Extensions", &dir.extensions.join(","));
    }
    if dir.add_slash {
        format_kv_line("Add Slash", format_bool(dir.add_slash));
    }
    if dir.discover_backup {
        format_kv_line("Discover Backup", format_bool(dir.discover_backup));
    }
    if dir.expanded {
        format_kv_line("Expanded", format_bool(dir.expanded));
    }
    format_kv_line("Autocalibrate", format_bool(dir.autocalibrate));
    if dir.force {
        format_kv_line("Force", format_bool(dir.force));
    }
    if let Some(output) = run.output.as_deref() {
        format_kv_line("Output", output);
    }
    format_kv_line(
        "Timeout",
        &format!("{}s", runner.options().timeout.as_secs_f64()),
    );
    if let Some(delay) = runner.options().delay {
        format_kv_line("Delay", &format!("{}ms", delay.as_millis()));
    }
    println!();
}

fn describe_error(e: &ScanError) -> String {
    match e {
        ScanError::Wildcard(w) => {
            format!("{w}. To continue please exclude the status code or the length")
        }
        other => other.to_string(),
    }
}

fn progress_bar(hidden: bool) -> Result<ProgressBar, String> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );
    Ok(pb)
}

async fn run_async(mut run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }

    if let Some(list) = run.list.as_deref() {
        let targets = utils::read_clean_lines(list)
            .await
            .map_err(|e| format!("failed to open list file: {list}: {e}"))?;
        if targets.is_empty() {
            return Err(format!("list file {list} contains no targets"));
        }
        run.options.targets = targets;
    }
    if let Some(path) = run.extensions_file.as_deref() {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read extensions file: {path}: {e}"))?;
        let from_file = utils::parse_extension_lines(&contents)
            .map_err(|e| format!("invalid value for extensions file: {e}"))?;
        utils::merge_extensions(&mut run.dir.extensions, from_file.iter().map(String::as_str))
            .map_err(|e| format!("invalid value for extensions file: {e}"))?;
    }

    let runner = Runner::new(run.options.clone(), run.dir.clone()).map_err(|e| e.to_string())?;

    if !run.quiet {
        print_banner();
        print_settings(&run, &runner);
    }

    let writer = match run.output.as_deref() {
        Some(path) => Some(
            OutputWriter::open(
                path,
                runner.options().output_append,
                run.output_format,
                run.render,
            )
            .await
            .map_err(|e| format!("failed to open output file: {path}: {e}"))?,
        ),
        None => None,
    };

    let pb = progress_bar(run.no_progress)?;
    let cancel = CancellationToken::new();
    let ctrl_c = task::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(1024);
    let consumer = task::spawn({
        let pb = pb.clone();
        let render = run.render;
        let quiet = run.quiet;
        let no_error = run.no_error;
        let mut writer = writer;
        async move {
            let mut found: u64 = 0;
            let mut errors: u64 = 0;
            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::Started { target, words } => {
                        pb.set_length(words);
                        pb.set_position(0);
                        pb.set_message(target);
                    }
                    ProgressEvent::Tick => pb.inc(1),
                    ProgressEvent::Result(finding) => {
                        found += 1;
                        pb.println(output::render_text(&finding, &render));
                        if let Some(w) = writer.as_mut() {
                            if let Err(e) = w.write(&finding).await {
                                pb.println(format!("[!] failed to write output: {e}"));
                            }
                        }
                    }
                    ProgressEvent::Error(e) => {
                        errors += 1;
                        if !no_error {
                            pb.println(format!("[!] {e}").red().to_string());
                        }
                    }
                    ProgressEvent::Message(MessageLevel::Info, text) => {
                        if !quiet {
                            pb.println(format!("[+] {text}"));
                        }
                    }
                    ProgressEvent::Message(MessageLevel::Warn, text) => {
                        pb.println(format!("[!] {text}").yellow().to_string());
                    }
                }
            }
            pb.finish_and_clear();
            if let Some(w) = writer {
                if let Err(e) = w.finish().await {
                    eprintln!("[!] failed to flush output: {e}");
                }
            }
            (found, errors)
        }
    });

    let now = Instant::now();
    let result = runner.run(tx, &cancel).await;
    let (found, errors) = consumer
        .await
        .map_err(|e| format!("output task failed: {e}"))?;
    ctrl_c.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            let target = runner
                .targets()
                .first()
                .map(|t| t.to_string())
                .unwrap_or_default();
            return match e {
                ScanError::Wildcard(_) => Err(describe_error(&e)),
                _ => Err(format!("error on running dirbust on {target}: {e}")),
            };
        }
    };

    for report in summary.reports.iter() {
        if let Err(e) = &report.outcome {
            eprintln!("[-] Error on {}: {}", report.target, describe_error(e));
        }
    }
    if summary.cancelled() {
        eprintln!("[!] Keyboard interrupt detected, terminating.");
    }
    if !run.quiet {
        println!();
        println!(
            ":: Completed :: {found} found, {errors} errors, scan took {}s ::",
            now.elapsed().as_secs()
        );
    }
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    logging::init(run.verbose, run.no_color);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
