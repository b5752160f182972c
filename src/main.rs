use std::io::Read;

use clap::Parser;

use oxsh::shell::{print_result, Shell, ShellOptionsInit};

#[derive(Parser)]
#[command(name = "oxsh")]
#[command(about = "A POSIX shell command language interpreter")]
#[command(version)]
struct Cli {
    /// Execute COMMAND; remaining operands become $0 and the positional
    /// parameters
    #[arg(short = 'c')]
    command: Option<String>,

    /// Read commands from standard input
    #[arg(short = 's')]
    read_stdin: bool,

    /// Force an interactive shell
    #[arg(short = 'i')]
    interactive: bool,

    /// Exit immediately when a command fails
    #[arg(short = 'e')]
    errexit: bool,

    /// Treat unset variables as errors
    #[arg(short = 'u')]
    nounset: bool,

    /// Trace commands as they execute
    #[arg(short = 'x')]
    xtrace: bool,

    /// Disable pathname expansion
    #[arg(short = 'f')]
    noglob: bool,

    /// Read commands without executing them
    #[arg(short = 'n')]
    noexec: bool,

    /// Export all assigned variables
    #[arg(short = 'a')]
    allexport: bool,

    /// Print input lines as they are read
    #[arg(short = 'v')]
    verbose: bool,

    /// Do not overwrite files with >
    #[arg(short = 'C')]
    noclobber: bool,

    /// Enable job control
    #[arg(short = 'm')]
    monitor: bool,

    /// Set a named option (may repeat)
    #[arg(short = 'o', value_name = "NAME")]
    options: Vec<String>,

    /// Startup file for interactive shells
    #[arg(long = "rcfile", value_name = "FILE")]
    rcfile: Option<String>,

    /// Skip startup files
    #[arg(long = "norc")]
    norc: bool,

    /// POSIX mode
    #[arg(long = "posix")]
    posix: bool,

    /// Script file and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // clap has no syntax for `+o NAME` / `+x`; peel those off first.
    let mut raw_args: Vec<String> = Vec::new();
    let mut plus_long: Vec<(String, bool)> = Vec::new();
    let mut plus_short: Vec<(char, bool)> = Vec::new();
    let mut iter = std::env::args().peekable();
    while let Some(arg) = iter.next() {
        if arg == "+o" {
            if let Some(name) = iter.next() {
                plus_long.push((name, false));
            }
            continue;
        }
        if let Some(flags) = arg.strip_prefix('+') {
            if !flags.is_empty() && flags.chars().all(|c| c.is_ascii_alphabetic()) {
                for flag in flags.chars() {
                    plus_short.push((flag, false));
                }
                continue;
            }
        }
        raw_args.push(arg);
    }

    let cli = Cli::parse_from(raw_args);

    let mut short_flags: Vec<(char, bool)> = Vec::new();
    for (flag, on) in [
        ('e', cli.errexit),
        ('u', cli.nounset),
        ('x', cli.xtrace),
        ('f', cli.noglob),
        ('n', cli.noexec),
        ('a', cli.allexport),
        ('v', cli.verbose),
        ('C', cli.noclobber),
        ('m', cli.monitor),
    ] {
        if on {
            short_flags.push((flag, true));
        }
    }
    short_flags.extend(plus_short);

    let mut long_options: Vec<(String, bool)> = cli
        .options
        .iter()
        .map(|name| (name.clone(), true))
        .collect();
    long_options.extend(plus_long);

    // Decide the input source: -c string, a script file, or stdin.
    let (source, name, positional, interactive) = if let Some(command) = cli.command {
        let name = cli
            .args
            .first()
            .cloned()
            .unwrap_or_else(|| "oxsh".to_string());
        let positional = cli.args.iter().skip(1).cloned().collect();
        (Some(command), name, positional, false)
    } else if !cli.read_stdin && !cli.args.is_empty() {
        let file = cli.args[0].clone();
        let positional = cli.args[1..].to_vec();
        match std::fs::read_to_string(&file) {
            Ok(content) => (Some(content), file, positional, false),
            Err(err) => {
                eprintln!("oxsh: {}: {}", file, err);
                std::process::exit(127);
            }
        }
    } else {
        use std::io::IsTerminal;
        let interactive = cli.interactive || std::io::stdin().is_terminal();
        if interactive {
            (None, "oxsh".to_string(), cli.args.clone(), true)
        } else {
            let mut buffer = String::new();
            if std::io::stdin().read_to_string(&mut buffer).is_err() {
                std::process::exit(1);
            }
            (Some(buffer), "oxsh".to_string(), cli.args.clone(), false)
        }
    };

    let mut shell = Shell::new(ShellOptionsInit {
        name: Some(name),
        args: positional,
        interactive,
        posix: cli.posix,
        rcfile: cli.rcfile,
        norc: cli.norc,
        short_flags,
        long_options,
    });

    let status = match source {
        Some(source) => {
            let result = shell.exec(&source).await;
            print_result(&result);
            result.exit_code
        }
        None => shell.run_interactive().await,
    };

    let status = shell.finalize(status).await;
    std::process::exit(status & 0xff);
}
