use std::process::exit;

use colored::Colorize;

fn main() {
    if let Err(e) = dirbust::app::run_cli() {
        eprintln!("{} {}", "[!]".red(), e);
        exit(1);
    }
}
