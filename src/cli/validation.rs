use crate::cli::args::CliArgs;
use crate::output::OutputFormat;
use crate::utils::{self, IntSet};

/// Syntax checks on raw flag values, done before the config file is merged.
pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid threads, expected at least 1".to_string());
        }
    }
    for (flag, value) in [
        ("--status-codes", args.status_codes.as_deref()),
        ("--status-codes-blacklist", args.status_codes_blacklist.as_deref()),
        ("--exclude-length", args.exclude_length.as_deref()),
    ] {
        if let Some(raw) = value {
            IntSet::parse(raw).map_err(|e| format!("invalid {flag} '{raw}': {e}"))?;
        }
    }
    if let Some(raw) = args.extensions.as_deref() {
        utils::parse_extensions_csv(raw).map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    for (flag, value) in [("--delay", args.delay.as_deref()), ("--timeout", args.timeout.as_deref())] {
        if let Some(raw) = value {
            utils::parse_duration(raw).map_err(|e| format!("invalid {flag}: {e}"))?;
        }
    }
    for raw in args.headers.iter() {
        utils::parse_header(raw).map_err(|e| format!("invalid --headers: {e}"))?;
    }
    if let Some(raw) = args.method.as_deref() {
        reqwest::Method::from_bytes(raw.trim().to_uppercase().as_bytes())
            .map_err(|_| format!("invalid --method '{raw}'"))?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        if OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}', expected text or json"));
        }
    }
    if args.password.is_some() && args.username.is_none() {
        return Err("--password requires --username".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        let mut full = vec!["dirbust"];
        full.extend_from_slice(argv);
        CliArgs::parse_from(full)
    }

    #[test]
    fn accepts_valid_flags() {
        let args = parse(&[
            "-u", "example.com", "-w", "w.txt", "-s", "200,300-399", "-b", "", "--delay", "250ms",
            "-H", "X-A: 1", "-m", "head", "--of", "json",
        ]);
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        for argv in [
            vec!["-t", "0"],
            vec!["-s", "500-400"],
            vec!["--exclude-length", "abc"],
            vec!["--timeout", "soon"],
            vec!["-H", "novalue"],
            vec!["--output-format", "xml"],
            vec!["-P", "secret"],
            vec!["-x", "a b"],
        ] {
            let args = parse(&argv);
            assert!(validate(&args).is_err(), "{argv:?} should be rejected");
        }
    }
}
