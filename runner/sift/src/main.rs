//! sift CLI.
//!
//! Discovery-based test harness: point it at a directory or a list of
//! test addresses and it finds, runs, and reports.

use std::path::PathBuf;
use std::sync::Arc;

use sift::commands::{parse_args, run_tests};
use sift::import::{MapSource, ModuleSource};

fn main() {
    sift::init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    for arg in &args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "-V" | "--version" => {
                println!("sift {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            _ => {}
        }
    }

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut spec = match sift::config::assemble(&workdir) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("sift: {e}");
            std::process::exit(2);
        }
    };
    let run_options = match parse_args(&mut spec, &args) {
        Ok(run_options) => run_options,
        Err(e) => {
            eprintln!("sift: {e}");
            eprintln!("Run `sift --help` for usage.");
            std::process::exit(2);
        }
    };

    // The binary ships with an empty module source; embedders register
    // their modules through the library entry points instead.
    let source: Arc<dyn ModuleSource> = Arc::new(MapSource::new());
    std::process::exit(run_tests(spec, &run_options, source));
}

fn print_usage() {
    println!("sift: discovery-based test harness");
    println!();
    println!("Usage: sift [options] [names...]");
    println!();
    println!("Names are test addresses: a directory, a file, a dotted module,");
    println!("or module:callable. A bare `:callable` reuses the module of the");
    println!("previous name.");
    println!();
    println!("Options:");
    println!("  -v, --verbose         More output (repeatable)");
    println!("  -q, --quiet           No per-test output");
    println!("  -x, --stop            Stop after the first failure or error");
    println!("  -s, --no-capture      Do not capture test output");
    println!("  --match=<regex>       Pattern a name must match to be a test");
    println!("  --include=<regex>     Also select names matching this pattern");
    println!("  --exclude=<regex>     Never select names matching this pattern");
    println!("  --where=<dir>         Root directory for discovery");
    println!("  --include-exe         Select executable files too");
    println!("  --collect-only        List what would run, without running");
    println!("  --processes=<n>       Run across n worker processes");
    println!("  --process-timeout=<s> Seconds before a hung worker is timed out");
    println!("  --restart-workers=1   Replace workers that time out");
    println!("  --with-<plugin>       Enable a plugin (e.g. --with-xunit)");
    println!("  --xunit-file=<path>   Where the xunit plugin writes its report");
    println!("  -h, --help            Show this help");
    println!("  -V, --version         Show version");
    println!();
    println!("Configuration is read from /etc/sift.toml, ~/.sift.toml, and");
    println!("./sift.toml ([sift] section), then SIFT_* environment variables,");
    println!("then the command line. Set SIFT_IGNORE_CONFIG_FILES to skip the");
    println!("files.");
    println!();
    println!("Examples:");
    println!("  sift                          # discover from the current directory");
    println!("  sift tests/test_auth.py");
    println!("  sift pack.test_mod:TestLogin.test_ok");
    println!("  sift --processes=4 --process-timeout=60");
}
