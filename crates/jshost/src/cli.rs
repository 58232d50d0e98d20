use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};

use crate::config::logger::LogLevel;

pub const DEFAULT_PORT: u16 = 9229;

#[derive(Debug, Parser)]
#[command(name = "jshost")]
#[command(version)]
#[command(about = "Run a JavaScript file, optionally under a remote debugger")]
#[command(
    long_about = "jshost runs a JavaScript file in an embedded engine with a small `host` API \
(echo, throw, runScript, arguments). With --inspect or --inspect-brk it also serves a \
debugger endpoint at ws://127.0.0.1:<port>/<runtime name>.\n\n\
The script's completion value, converted to a number, is printed and used as the exit status."
)]
#[command(after_help = "EXAMPLES:\n  \
    jshost script.js\n  \
    jshost --inspect-brk -p 9230 script.js arg1 arg2\n\
")]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Enable debugging
    #[arg(long)]
    pub inspect: bool,

    /// Enable debugging and break on the first statement
    #[arg(long = "inspect-brk")]
    pub inspect_brk: bool,

    /// Port the debugger listens on
    #[arg(
        long,
        short = 'p',
        default_value_t = DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Optional JSON config file
    #[arg(long, short = 'c', env = "JSHOST_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// No logging except for errors
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Print help
    #[arg(short = 'h', long = "help", visible_short_alias = '?', action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Script to run, followed by the arguments it sees in `host.arguments`
    #[arg(
        value_name = "SCRIPT",
        required = true,
        num_args = 1..,
        trailing_var_arg = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    pub fn script(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    pub fn script_args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    pub fn debug_enabled(&self) -> bool {
        self.inspect || self.inspect_brk
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        LogLevel::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("jshost").chain(args.iter().copied()))
    }

    #[test]
    fn test_script_and_arguments() {
        let cli = parse(&["main.js", "a", "--inspect", "-p", "1"]).unwrap();
        assert_eq!(cli.script(), "main.js");
        assert_eq!(cli.script_args(), ["a", "--inspect", "-p", "1"]);
        assert!(!cli.debug_enabled());
        assert_eq!(cli.port, DEFAULT_PORT);
    }

    #[test]
    fn test_debug_flags() {
        let cli = parse(&["--inspect-brk", "--port", "9230", "main.js"]).unwrap();
        assert!(cli.inspect_brk);
        assert!(cli.debug_enabled());
        assert_eq!(cli.port, 9230);
        assert!(cli.script_args().is_empty());

        let cli = parse(&["--inspect", "-p", "65535", "main.js"]).unwrap();
        assert!(cli.inspect && !cli.inspect_brk);
        assert_eq!(cli.port, 65535);
    }

    #[test]
    fn test_invalid_ports() {
        for port in ["0", "65536", "-1", "port"] {
            assert!(parse(&["-p", port, "main.js"]).is_err(), "port {port}");
        }
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(
            parse(&[]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["--bogus", "main.js"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
        assert_eq!(parse(&["-?"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["main.js"]).unwrap().log_level(), None);
        assert_eq!(
            parse(&["-vv", "main.js"]).unwrap().log_level(),
            Some(LogLevel::Trace)
        );
        assert_eq!(
            parse(&["-q", "main.js"]).unwrap().log_level(),
            Some(LogLevel::Error)
        );
    }
}
